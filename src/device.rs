use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::transport::SharedSession;

/// The read timeout used for the ID handshake and kept for the device's
/// lifetime. Hard-coded on purpose; a device which cannot answer within
/// this window is not admitted.
pub const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// The application-level identifier a device reports in response to the
/// ID-query command. The registry key.
///
/// Not to be confused with the hardware ID (`VID:PID`), which is only
/// used for allowlisting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID.
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(id.as_ref().into())
    }

    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The serial line parameters a device is opened with.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud: u32,

    /// How long a single read may block before yielding an empty line.
    pub read_timeout: Duration,

    /// Number of bits per character.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Flow control mode.
    pub flow_control: FlowControl,
}

impl SerialSettings {
    /// Settings for the given baud rate: 8N1, no flow control, and the
    /// fixed handshake read timeout.
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            read_timeout: HANDSHAKE_READ_TIMEOUT,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// A registered device: the port it lives on, how the port was opened,
/// the ID it reported, and the open transport session.
///
/// The session is shared with the device's reader task so an in-flight
/// read may complete even after the registry dropped the record.
#[derive(Debug)]
pub struct Device {
    /// The OS port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// The line parameters the session was opened with.
    pub settings: SerialSettings,

    /// The ID the device reported during admission. Never empty.
    pub id: DeviceId,

    /// The open transport session.
    pub session: SharedSession,
}
