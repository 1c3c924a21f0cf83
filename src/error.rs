use std::{io, path::PathBuf};

use thiserror::Error;

/// Fatal errors raised while bringing the gateway up.
///
/// Per-operation serial failures are [`TransportError`] instead and are
/// handled locally by the gateway.
///
/// [`TransportError`]: crate::transport::TransportError
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file was missing a key, held a malformed value,
    /// or could not be read at all.
    #[error("Bad config: {0}")]
    BadConfig(String),

    /// A filter list file could not be read.
    #[error("Could not read filter list at {path:?}")]
    FilterIo {
        /// The path that failed to load.
        path: PathBuf,
        /// The underlying I/O problem.
        #[source]
        source: io::Error,
    },

    /// A constructor was handed arguments which violate its invariants.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Unwrap the bad config message, else return self.
    /// Eases asserting on configuration problems.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(msg) = self {
            Ok(msg)
        } else {
            Err(self)
        }
    }
}
