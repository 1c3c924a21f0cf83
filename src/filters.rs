use std::{collections::HashSet, io, path::Path};

use tracing::info;

use crate::error::Error;

/// The admission filter lists.
///
/// Both are loaded once at startup from newline-delimited files and are
/// immutable afterwards, so lookups need no locking.
#[derive(Debug, Default)]
pub struct Filters {
    /// Hardware IDs (`VVVV:PPPP`) allowed to be admitted.
    /// Empty means the check is not enforced.
    allowlist: HashSet<String>,

    /// Port paths which are never admitted.
    denylist: HashSet<String>,
}

impl Filters {
    /// Load both lists.
    ///
    /// A missing allowlist file is a fatal configuration error.
    /// A missing denylist file just means no ports are ignored.
    pub fn load<P: AsRef<Path>>(allowlist_path: P, denylist_path: P) -> Result<Self, Error> {
        let allowlist_path = allowlist_path.as_ref();
        let allowlist = entries(
            &std::fs::read_to_string(allowlist_path).map_err(|source| Error::FilterIo {
                path: allowlist_path.to_path_buf(),
                source,
            })?,
        );

        for hardware_id in &allowlist {
            info!(%hardware_id, "Allowlisted hardware ID");
        }

        if allowlist.is_empty() {
            info!("Hardware allowlist is empty, no allowlist checks will be performed");
        }

        let denylist_path = denylist_path.as_ref();
        let denylist = match std::fs::read_to_string(denylist_path) {
            Ok(text) => entries(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No serial port denylist given, no ports will be ignored while scanning");
                HashSet::new()
            }
            Err(source) => {
                return Err(Error::FilterIo {
                    path: denylist_path.to_path_buf(),
                    source,
                })
            }
        };

        for port in &denylist {
            info!(%port, "Denylisted serial port");
        }

        Ok(Self {
            allowlist,
            denylist,
        })
    }

    /// Build filter lists from in-memory entries.
    pub fn from_entries<S: AsRef<str>>(
        allowlist: impl IntoIterator<Item = S>,
        denylist: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            allowlist: allowlist.into_iter().map(|s| s.as_ref().into()).collect(),
            denylist: denylist.into_iter().map(|s| s.as_ref().into()).collect(),
        }
    }

    /// Whether the allowlist is empty, i.e. not enforced.
    pub fn allowlist_is_empty(&self) -> bool {
        self.allowlist.is_empty()
    }

    /// Whether the given hardware ID is allowlisted.
    pub fn is_allowed(&self, hardware_id: &str) -> bool {
        self.allowlist.contains(hardware_id)
    }

    /// Whether the given port path is denylisted.
    pub fn is_denied(&self, port: &str) -> bool {
        self.denylist.contains(port)
    }
}

fn entries(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Into::into)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("serial-gateway-filters-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn blank_lines_and_whitespace_are_skipped() {
        let set = entries("1a86:7523\n\n  2341:0042  \n");

        assert_eq!(set.len(), 2);
        assert!(set.contains("1a86:7523"));
        assert!(set.contains("2341:0042"));
    }

    #[test]
    fn missing_allowlist_is_fatal() {
        let allow = unique_path("no-such-allowlist");
        let deny = unique_path("no-such-denylist");

        let err = Filters::load(&allow, &deny).unwrap_err();

        assert!(matches!(err, Error::FilterIo { .. }));
    }

    #[test]
    fn missing_denylist_denies_none() {
        let allow = unique_path("allowlist");
        std::fs::write(&allow, "1a86:7523\n").unwrap();

        let deny = unique_path("missing-denylist");

        let filters = Filters::load(&allow, &deny).unwrap();
        std::fs::remove_file(&allow).unwrap();

        assert!(!filters.is_denied("/dev/ttyUSB0"));
        assert!(filters.is_allowed("1a86:7523"));
        assert!(!filters.allowlist_is_empty());
    }

    #[test]
    fn empty_allowlist_means_not_enforced() {
        let filters = Filters::from_entries::<&str>([], ["/dev/ttyUSB9"]);

        assert!(filters.allowlist_is_empty());
        assert!(filters.is_denied("/dev/ttyUSB9"));
        assert!(!filters.is_denied("/dev/ttyUSB0"));
    }
}
