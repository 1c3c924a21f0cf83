use std::{fmt::Debug, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    time::Instant,
};

use crate::device::SerialSettings;

/// The tokio-serial backed transport used in production.
pub mod serial;

/// An in-memory transport, useful to test the gateway without actual
/// serial ports.
pub mod mock;

/// Any error a transport operation might encounter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying IO problem.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),

    /// The peer broke the line protocol.
    #[error("Protocol problem: {0}")]
    Protocol(String),

    /// The session was used after it was closed, or never opened.
    #[error("Port is not open")]
    NotOpen,
}

/// A system serial port as reported by enumeration.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// The port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,

    /// An opaque descriptor carrying hardware information,
    /// e.g. `USB VID:PID=1a86:7523 SNR=85438`.
    pub hardware_descriptor: String,
}

/// The façade over the serial line.
///
/// Everything else in this crate stays OS-agnostic; implementations of
/// this trait are the only code allowed to touch ports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the given port path currently exists on the system.
    fn exists(&self, path: &str) -> bool;

    /// Enumerate the system's serial ports.
    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError>;

    /// Open the given port with the given line settings.
    async fn open(&self, path: &str, settings: &SerialSettings)
        -> Result<Session, TransportError>;
}

/// An open connection to one serial port.
///
/// Line assembly lives here: bytes read before a timeout fires are kept
/// and complete the line on a later call.
pub struct Session {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,

    /// Bytes received but not yet terminated by a newline.
    pending: Vec<u8>,

    open: bool,
}

/// The session handle shared between the registry entry and the reader
/// task. Whichever side drops last closes the port.
pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    /// Wrap the two halves of an open connection.
    pub fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
            open: true,
        }
    }

    /// Read one `\n`-terminated line.
    ///
    /// Returns the full line including the terminator, or an empty
    /// string if no full line arrived within `timeout`. Partial input is
    /// retained for the next call.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(position) = self.pending.iter().position(|&byte| byte == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=position).collect();

                return String::from_utf8(line)
                    .map_err(|_| TransportError::Protocol("Invalid UTF-8 on wire".into()));
            }

            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut buf)).await;

            let count = match read {
                // Timeout. Anything read so far stays in `pending`.
                Err(_) => return Ok(String::new()),
                Ok(result) => result?,
            };

            if count == 0 {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Serial port disconnected",
                )));
            }

            self.pending.extend_from_slice(&buf[..count]);
        }
    }

    /// Put bytes on the wire, returning how many were written.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        let count = self.writer.write(bytes).await?;

        Ok(count)
    }

    /// Flush buffered output and discard incomplete input.
    pub async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        self.pending.clear();
        self.writer.flush().await?;

        Ok(())
    }

    /// Shut the connection down. Any further operation fails with
    /// [`TransportError::NotOpen`].
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        self.open = false;
        self.writer.shutdown().await?;

        Ok(())
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.open)
            .field("pending_bytes", &self.pending.len())
            .finish()
    }
}
