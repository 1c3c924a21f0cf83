#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// The interactive command surface driving a gateway.
pub mod console;

/// Device identity and the per-device record kept in the registry.
pub mod device;

/// Possible errors in this library.
pub mod error;

/// Events the gateway emits.
pub mod events;

/// Hardware-ID allowlist and serial-port denylist.
pub mod filters;

/// The device-lifecycle and I/O supervisor.
///
/// Scans for new serial ports, admits devices via the ID handshake,
/// runs one reader per device and offers the send/broadcast pathway.
pub mod gateway;

/// Logging/tracing setup.
pub mod logging;

/// The line-oriented message format.
pub mod message;

/// The concurrent mapping from device IDs to device records.
pub mod registry;

/// Serial transport: the only code which talks to the OS.
pub mod transport;
