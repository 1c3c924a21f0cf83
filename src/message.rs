use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// A message received from a device, ready for application consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialMessage {
    /// Which device sent the message.
    pub device_id: DeviceId,

    /// When the gateway dispatched the message.
    pub timestamp: DateTime<Utc>,

    /// The message type, i.e. everything before the delimiter.
    pub kind: String,

    /// The message content, i.e. everything after the delimiter
    /// up to the line terminator.
    pub content: String,
}

impl SerialMessage {
    /// Create a new message, timestamped now.
    pub fn new(device_id: DeviceId, kind: String, content: String) -> Self {
        Self {
            device_id,
            timestamp: Utc::now(),
            kind,
            content,
        }
    }
}

impl Display for SerialMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "message from {}: timestamp={}, type={:?}, content={:?}",
            self.device_id,
            self.timestamp.timestamp_millis(),
            self.kind,
            self.content
        )
    }
}

/// Split a raw line into `(type, content)` at the first occurrence of
/// `delimiter`.
///
/// A line only parses when it carries both the delimiter and a line
/// terminator (`\n` or `\r`); anything else yields `("", "")`. The type
/// may be empty as long as delimiter and terminator are present. Content
/// runs from just after the delimiter up to, but excluding, the first
/// terminator, which tolerates `\r\n` as well as lone `\n` or `\r`.
/// When the delimiter only shows up after the terminator, the content is
/// empty and the terminator ends up inside the type.
pub fn parse(line: &str, delimiter: &str) -> (String, String) {
    let empty = || (String::new(), String::new());

    let Some(delimiter_pos) = line.find(delimiter) else {
        return empty();
    };
    let Some(terminator_pos) = line.find(|c: char| c == '\n' || c == '\r') else {
        return empty();
    };

    let kind = line[..delimiter_pos].to_owned();

    let content_start = delimiter_pos + delimiter.len();
    let content = if content_start <= terminator_pos {
        line[content_start..terminator_pos].to_owned()
    } else {
        String::new()
    };

    (kind, content)
}
