//! A mock transport, useful to test the gateway without actual serial
//! ports.
//!
//! Each scripted port gets a spawned task emulating the device end of
//! the wire: it answers the first line it receives (the ID handshake)
//! with a canned reply, records every line the gateway writes, and puts
//! test-injected lines on the wire towards the gateway.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, Notify},
};
use tracing::debug;

use crate::{
    device::SerialSettings,
    transport::{PortInfo, Session, Transport, TransportError},
};

/// How a scripted device behaves on the wire.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// The raw bytes written in response to the first received line,
    /// usually an ID handshake reply like `"ID,abc123\n"`.
    /// `None` keeps the device silent, which times the handshake out.
    pub id_reply: Option<String>,
}

impl MockDevice {
    /// A device answering the ID handshake with the given line.
    pub fn replying(line: &str) -> Self {
        Self {
            id_reply: Some(line.into()),
        }
    }

    /// A device which never answers anything.
    pub fn silent() -> Self {
        Self { id_reply: None }
    }
}

/// The test's side of a scripted port.
pub struct MockLink {
    to_host: mpsc::UnboundedSender<Vec<u8>>,
    from_host: mpsc::UnboundedReceiver<String>,
    disconnect: Arc<Notify>,
    opened: Arc<AtomicU32>,
}

impl MockLink {
    /// Put a line on the wire towards the gateway.
    /// The terminator is appended.
    pub fn send_line(&self, line: &str) {
        let _ = self.to_host.send(format!("{line}\n").into_bytes());
    }

    /// The next line the gateway wrote to this device, terminator
    /// stripped. `None` once the gateway hung up.
    pub async fn written_line(&mut self) -> Option<String> {
        self.from_host.recv().await
    }

    /// Yank the cable: the gateway-facing side sees end-of-stream.
    pub fn disconnect(&self) {
        self.disconnect.notify_one();
    }

    /// How often the port was opened. Lets tests assert that rejected
    /// ports saw no I/O at all.
    pub fn open_count(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

struct MockPort {
    hardware_descriptor: String,
    device: MockDevice,
    to_host: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    from_host: mpsc::UnboundedSender<String>,
    disconnect: Arc<Notify>,
    opened: Arc<AtomicU32>,
}

/// A transport whose ports are backed by in-memory pipes.
#[derive(Default)]
pub struct MockTransport {
    ports: Mutex<HashMap<String, MockPort>>,
}

impl MockTransport {
    /// An empty transport; no ports exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a port into existence, returning the test's end of it.
    pub fn add_port(&self, path: &str, hardware_descriptor: &str, device: MockDevice) -> MockLink {
        let (to_host_tx, to_host_rx) = mpsc::unbounded_channel();
        let (from_host_tx, from_host_rx) = mpsc::unbounded_channel();
        let disconnect = Arc::new(Notify::new());
        let opened = Arc::new(AtomicU32::new(0));

        let port = MockPort {
            hardware_descriptor: hardware_descriptor.into(),
            device,
            to_host: Some(to_host_rx),
            from_host: from_host_tx,
            disconnect: disconnect.clone(),
            opened: opened.clone(),
        };

        self.ports.lock().unwrap().insert(path.into(), port);

        MockLink {
            to_host: to_host_tx,
            from_host: from_host_rx,
            disconnect,
            opened,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn exists(&self, path: &str) -> bool {
        self.ports.lock().unwrap().contains_key(path)
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        Ok(self
            .ports
            .lock()
            .unwrap()
            .iter()
            .map(|(path, port)| PortInfo {
                path: path.clone(),
                hardware_descriptor: port.hardware_descriptor.clone(),
            })
            .collect())
    }

    async fn open(
        &self,
        path: &str,
        _settings: &SerialSettings,
    ) -> Result<Session, TransportError> {
        let (device, mut to_host, from_host, disconnect) = {
            let mut ports = self.ports.lock().unwrap();
            let port = ports.get_mut(path).ok_or(TransportError::NotOpen)?;

            port.opened.fetch_add(1, Ordering::SeqCst);

            let to_host = port
                .to_host
                .take()
                .ok_or_else(|| TransportError::Protocol("Port already open".into()))?;

            (
                port.device.clone(),
                to_host,
                port.from_host.clone(),
                port.disconnect.clone(),
            )
        };

        let (host_io, device_io) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let (device_read, mut device_write) = tokio::io::split(device_io);
            let mut lines = BufReader::new(device_read).lines();
            let mut handshaken = false;

            loop {
                tokio::select! {
                    _ = disconnect.notified() => break,

                    injected = to_host.recv() => match injected {
                        Some(bytes) => {
                            if device_write.write_all(&bytes).await.is_err() {
                                break;
                            }
                            let _ = device_write.flush().await;
                        }
                        None => break,
                    },

                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if !handshaken {
                                handshaken = true;

                                if let Some(reply) = &device.id_reply {
                                    if device_write.write_all(reply.as_bytes()).await.is_err() {
                                        break;
                                    }
                                    let _ = device_write.flush().await;
                                }
                            }

                            let _ = from_host.send(line);
                        }
                        // The gateway closed its end.
                        _ => break,
                    },
                }
            }

            debug!("Mock device hanging up");
            // Dropping both halves makes the gateway side see EOF.
        });

        let (read, write) = tokio::io::split(host_io);

        Ok(Session::new(Box::new(read), Box::new(write)))
    }
}
