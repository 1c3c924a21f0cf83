#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use serial_gateway::{
    config::Config,
    events::Event,
    filters::Filters,
    gateway::Gateway,
    transport::mock::MockTransport,
};
use tokio::sync::broadcast;

/// A config with handshake literals the scripted devices understand:
/// delimiter `,`, ID query `?id`, ID message type `ID`.
pub fn test_config() -> Config {
    Config {
        logging_active: false,
        scan_interval: 0,
        wait_before_communication: 0,
        baud_rate: 9600,
        message_delimiter: ",".into(),
        command_getid: "?id".into(),
        message_type_id: "ID".into(),
    }
}

pub fn test_gateway(transport: Arc<MockTransport>) -> Gateway {
    test_gateway_with_filters(transport, Filters::default())
}

pub fn test_gateway_with_filters(transport: Arc<MockTransport>, filters: Filters) -> Gateway {
    Gateway::new(test_config(), filters, transport).expect("Test config is valid")
}

/// The next gateway event, or a panic if none arrives in time.
pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("An event should arrive in time")
        .expect("Event channel should stay open")
}

/// Poll until `condition` holds, or panic after a few seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for: {what}");
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
