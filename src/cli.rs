use std::path::PathBuf;

use clap::Parser;

/// The command line interface for the serial gateway.
///
/// All four paths are required; starting without them is a usage error.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the gateway configuration file (RON)
    pub config: PathBuf,

    /// Path to the hardware-ID allowlist file, one `VVVV:PPPP` per line.
    /// An empty file admits any hardware
    pub allowlist: PathBuf,

    /// Path to the serial-port denylist file, one port path per line
    pub denylist: PathBuf,

    /// Directory the log files are written to
    pub log_path: PathBuf,
}
