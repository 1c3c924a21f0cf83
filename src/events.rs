use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{device::DeviceId, message::SerialMessage};

/// Something observable happened inside the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A device passed admission and its reader is starting.
    DeviceAdded {
        /// The ID the device reported.
        id: DeviceId,
        /// The port it was admitted on.
        port: String,
    },

    /// A device was removed, either explicitly or after an I/O failure.
    DeviceRemoved {
        /// The ID the device was registered under.
        id: DeviceId,
        /// The port it lived on.
        port: String,
    },

    /// A device sent a line, parsed and timestamped.
    Message(SerialMessage),
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::DeviceAdded { id, port } => write!(f, "device added: {id} on {port}"),
            Event::DeviceRemoved { id, port } => write!(f, "device removed: {id} from {port}"),
            Event::Message(message) => write!(f, "{message}"),
        }
    }
}

/// The gateway's event bus.
///
/// Consumers subscribe and receive every event from then on; delivery is
/// decoupled from the producing task, so a slow consumer never
/// back-pressures a reader. A consumer that falls more than the channel
/// capacity behind loses the oldest events.
#[derive(Debug)]
pub struct Events {
    tx: broadcast::Sender<Event>,
    #[allow(dead_code)]
    rx: broadcast::Receiver<Event>,
}

impl Events {
    /// A new bus holding at most `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = broadcast::channel(capacity);
        Self { tx, rx }
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    pub fn send(&self, event: Event) {
        debug!(%event, "Publishing event");

        // Cannot fail: we keep one receiver alive ourselves.
        self.tx.send(event).expect("Broadcast should work");
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new(1024)
    }
}
