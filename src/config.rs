use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The configuration snapshot used for running the gateway.
///
/// Read once at startup and immutable afterwards. The RON keys keep the
/// SCREAMING_SNAKE_CASE names of the wire-compatible gateway config
/// (`LOGGING_ACTIVE`, `SCAN_INTERVAL`, ...). Every key is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// Whether log output is additionally written to a file.
    pub logging_active: bool,

    /// Milliseconds between two port scans.
    /// Zero means a single scan pass, then the loop exits.
    pub scan_interval: u64,

    /// Milliseconds to wait between opening a port and the first
    /// communication attempt. Gives slow firmware time to settle.
    pub wait_before_communication: u64,

    /// Baud rate used for every device.
    pub baud_rate: u32,

    /// Separates the message type from the message content.
    /// Can be a single or multiple characters.
    pub message_delimiter: String,

    /// The command sent to a freshly opened port to ask for its ID.
    pub command_getid: String,

    /// The message type a device must answer the ID query with.
    pub message_type_id: String,
}

impl Config {
    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        ron::from_str::<Config>(input).map_err(|e| Error::BadConfig(e.to_string()))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(&p).map_err(|e| {
            Error::BadConfig(format!(
                "could not read config file {:?}: {e}",
                p.as_ref()
            ))
        })?;

        let config = Self::deserialize(&s)?;
        config.validate()?;

        Ok(config)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            logging_active: true,
            scan_interval: 5000,
            wait_before_communication: 2000,
            baud_rate: 9600,
            message_delimiter: ",".into(),
            command_getid: "?id".into(),
            message_type_id: "ID".into(),
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("Config serializes")
    }

    /// The scan interval as a [`Duration`].
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval)
    }

    /// The settle time as a [`Duration`].
    pub fn wait_before_communication(&self) -> Duration {
        Duration::from_millis(self.wait_before_communication)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.baud_rate == 0 {
            return Err(Error::BadConfig("BAUD_RATE must be > 0".into()));
        }

        if self.message_delimiter.is_empty() {
            return Err(Error::BadConfig(
                "MESSAGE_DELIMITER must not be empty".into(),
            ));
        }

        if self.command_getid.is_empty() {
            return Err(Error::BadConfig("COMMAND_GETID must not be empty".into()));
        }

        if self.message_type_id.is_empty() {
            return Err(Error::BadConfig(
                "MESSAGE_TYPE_ID must not be empty".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let c = Config::example();
        let text = c.serialize_pretty();

        let c2 = Config::deserialize(&text).unwrap();

        assert_eq!(c2.baud_rate, c.baud_rate);
        assert_eq!(c2.message_delimiter, c.message_delimiter);
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    LOGGING_ACTIVE: false,
    SCAN_INTERVAL: 1000,
    WAIT_BEFORE_COMMUNICATION: 0,
    BAUD_RATE: 115200,
    MESSAGE_DELIMITER: ",",
    COMMAND_GETID: "?id",
    MESSAGE_TYPE_ID: "ID",
)
"#;
        let config = Config::deserialize(input).unwrap();

        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.scan_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_key_is_bad_config() {
        // No MESSAGE_TYPE_ID.
        let input = r#"
(
    LOGGING_ACTIVE: false,
    SCAN_INTERVAL: 1000,
    WAIT_BEFORE_COMMUNICATION: 0,
    BAUD_RATE: 115200,
    MESSAGE_DELIMITER: ",",
    COMMAND_GETID: "?id",
)
"#;
        let err = Config::deserialize(input).unwrap_err();

        assert!(err.try_into_bad_config().is_ok());
    }

    #[test]
    fn bad_config_empty_delimiter() {
        let c = Config {
            message_delimiter: "".into(),
            ..Config::example()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("MESSAGE_DELIMITER"));
    }

    #[test]
    fn bad_config_zero_baud() {
        let c = Config {
            baud_rate: 0,
            ..Config::example()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("BAUD_RATE"));
    }
}
