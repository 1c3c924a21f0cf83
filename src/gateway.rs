use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use itertools::Itertools;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::Config,
    device::{Device, DeviceId, SerialSettings},
    error::Error,
    events::{Event, Events},
    filters::Filters,
    message::{self, SerialMessage},
    registry::Registry,
    transport::{Session, Transport, TransportError},
};

/// The key the hardware ID hides behind in a port's descriptor string.
const HARDWARE_ID_KEY: &str = "VID:PID=";

/// Separator for the console's list renderings.
const LIST_SEPARATOR: &str = ",";

/// The device-lifecycle and I/O supervisor.
///
/// Owns the registry, the admission pipeline, the periodic port scan,
/// one reader task per live device, and the send/broadcast pathway.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<Config>,
    filters: Arc<Filters>,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    events: Arc<Events>,
    started: Arc<AtomicBool>,
}

impl Gateway {
    /// Create a gateway over the given transport.
    ///
    /// The configuration is validated here so that an unusable delimiter
    /// or baud rate never makes it into a running gateway.
    pub fn new(
        config: Config,
        filters: Filters,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            filters: Arc::new(filters),
            transport,
            registry: Arc::new(Registry::new()),
            events: Arc::new(Events::default()),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Subscribe to device-added, device-removed and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Whether the gateway is started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the gateway: begin scanning for new serial ports.
    ///
    /// Idempotent; a second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Gateway already started, not starting again");
            return;
        }

        info!("Starting gateway");

        let gateway = self.clone();
        tokio::spawn(async move { gateway.scan_loop().await }.instrument(info_span!("scan")));
    }

    /// Stop the gateway: end the scan loop and delete every device.
    ///
    /// Idempotent. Callers tearing the process down should poll
    /// [`Gateway::all_readers_exited`] afterwards.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            info!("Gateway not started, nothing to stop");
            return;
        }

        info!("Stopping gateway");
        self.delete_all().await;
    }

    /// Whether every reader task has wound down.
    pub fn all_readers_exited(&self) -> bool {
        self.registry.all_exited()
    }

    /// One pass or periodic loop over the system's ports, depending on
    /// the configured scan interval. A zero interval means scan once.
    async fn scan_loop(&self) {
        let interval = self.config.scan_interval();

        while self.is_started() {
            self.add_new_ports(true).await;

            if interval.is_zero() {
                break;
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Try to admit every system port, returning how many devices were
    /// added. Admission rejections are expected here (most ports are
    /// already registered or filtered), hence the suppressed logs.
    pub async fn add_new_ports(&self, suppress_logs: bool) -> usize {
        if !suppress_logs {
            info!("Searching for new serial ports");
        }

        let ports = match self.transport.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(%e, "Could not enumerate serial ports");
                return 0;
            }
        };

        let mut added = 0;

        for port in ports {
            if self.add_device(&port.path, true).await {
                added += 1;
            }
        }

        if !suppress_logs {
            info!(added, "Finished searching for new serial ports");
        }

        added
    }

    /// Admit the device on `port`: filter checks, open, ID handshake,
    /// collision check, registry insertion, reader start.
    ///
    /// Returns whether the device was admitted. Failures never mutate
    /// the registry. `suppress_logs` quietens the rejections which are
    /// routine when called from the scan loop (denylisted port, port
    /// already registered).
    pub async fn add_device(&self, port: &str, suppress_logs: bool) -> bool {
        if !self.transport.exists(port) {
            warn!(%port, "Could not add device, port does not exist or cannot be accessed");
            return false;
        }

        if self.filters.is_denied(port) {
            if !suppress_logs {
                warn!(%port, "Did not add device, port is denylisted");
            }
            return false;
        }

        if let Some(existing) = self.registry.find_by_port(port) {
            if !suppress_logs {
                warn!(
                    %port,
                    id = %existing.id,
                    "Could not add device, port is already registered"
                );
            }
            return false;
        }

        if !self.filters.allowlist_is_empty() {
            let hardware_id = match self.hardware_id_of(port) {
                Some(hardware_id) => hardware_id,
                None => {
                    warn!(%port, "Could not add device, hardware ID could not be retrieved");
                    return false;
                }
            };

            if !self.filters.is_allowed(&hardware_id) {
                warn!(
                    %port,
                    %hardware_id,
                    "Did not add device, hardware ID is not allowlisted"
                );
                return false;
            }
        }

        let settings = SerialSettings::new(self.config.baud_rate);

        let session = match self.transport.open(port, &settings).await {
            Ok(session) => Arc::new(tokio::sync::Mutex::new(session)),
            Err(e) => {
                error!(%port, %e, "Could not add device, opening the port failed");
                return false;
            }
        };

        // Give slow firmware a moment before the first bytes fly.
        tokio::time::sleep(self.config.wait_before_communication()).await;

        let id = {
            let mut guard = session.lock().await;

            match self.retrieve_device_id(&mut guard).await {
                Ok(Some(id)) => {
                    // Discard whatever else the device may have sent
                    // alongside its ID.
                    if let Err(e) = guard.flush().await {
                        error!(%port, %e, "Could not add device, post-handshake flush failed");
                        return false;
                    }

                    id
                }
                Ok(None) => {
                    error!(
                        %port,
                        "Could not add device, it did not answer the ID query with a valid, non-empty ID"
                    );
                    return false;
                }
                Err(e) => {
                    error!(%port, %e, "Could not add device, ID handshake failed");
                    return false;
                }
            }
        };

        let device = Arc::new(Device {
            port: port.to_owned(),
            settings,
            id: id.clone(),
            session: session.clone(),
        });

        if !self.registry.insert_if_absent(device) {
            let existing_port = self
                .registry
                .get(&id)
                .map(|existing| existing.port.clone())
                .unwrap_or_default();

            error!(
                %id,
                %existing_port,
                new_port = %port,
                "Device with this ID already exists, cannot add a second one"
            );

            // The candidate session is ours alone; close it right away
            // rather than waiting for the drop.
            let _ = session.lock().await.close().await;

            return false;
        }

        info!(%id, %port, "Added serial device");

        self.events.send(Event::DeviceAdded {
            id: id.clone(),
            port: port.to_owned(),
        });

        self.start_reader(id);

        true
    }

    /// Ask the device on the other end of `session` for its ID.
    ///
    /// `Ok(None)` means the handshake completed without a transport
    /// error but the reply was missing, of the wrong type, or empty.
    async fn retrieve_device_id(
        &self,
        session: &mut Session,
    ) -> Result<Option<DeviceId>, TransportError> {
        session.flush().await?;

        let command = format!("{}\n", self.config.command_getid);
        session.write(command.as_bytes()).await?;

        let line = session
            .read_line(crate::device::HANDSHAKE_READ_TIMEOUT)
            .await?;

        let (kind, content) = message::parse(&line, &self.config.message_delimiter);

        if kind == self.config.message_type_id && !content.is_empty() {
            Ok(Some(DeviceId::new(content)))
        } else {
            Ok(None)
        }
    }

    /// The hardware ID (`VVVV:PPPP`) of the given port, dug out of the
    /// port's descriptor string.
    fn hardware_id_of(&self, port: &str) -> Option<String> {
        let ports = self.transport.list_ports().ok()?;
        let info = ports.into_iter().find(|info| info.path == port)?;

        extract_hardware_id(&info.hardware_descriptor).map(ToOwned::to_owned)
    }

    fn start_reader(&self, id: DeviceId) {
        self.registry.set_started(&id, true);

        let span = info_span!("reader", %id);
        let gateway = self.clone();

        tokio::spawn(async move { gateway.read_loop(id).await }.instrument(span));
    }

    /// Consume lines from one device until the device is deleted or the
    /// line dies.
    async fn read_loop(&self, id: DeviceId) {
        self.registry.set_exited(&id, false);
        info!("Read loop started");

        let Some(device) = self.registry.get(&id) else {
            // Deleted before we even began.
            info!("Read loop stopped, device is already gone");
            self.registry.set_exited(&id, true);
            self.registry.prune_reader_state(&id);
            return;
        };

        // Our own handle: an in-flight read may finish even after the
        // registry has dropped the record.
        let session = device.session.clone();
        let timeout = device.settings.read_timeout;

        while self.registry.is_started(&id) {
            let line = { session.lock().await.read_line(timeout).await };

            match line {
                // Timed out without a full line; just look again.
                Ok(line) if line.is_empty() => continue,
                Ok(line) => {
                    let gateway = self.clone();
                    let id = id.clone();

                    // Hand the line off so a slow consumer cannot stall
                    // this loop.
                    tokio::spawn(async move { gateway.process_message(id, line) });
                }
                Err(e) => {
                    error!(%e, "Serial port error while reading");
                    info!("Deleting device due to a read error");

                    self.delete_device(&id).await;
                }
            }
        }

        info!("Read loop stopped");
        self.registry.set_exited(&id, true);
        self.registry.prune_reader_state(&id);
    }

    /// Parse a raw line and publish it as a message event.
    fn process_message(&self, id: DeviceId, line: String) {
        let (kind, content) = message::parse(&line, &self.config.message_delimiter);

        self.events
            .send(Event::Message(SerialMessage::new(id, kind, content)));
    }

    /// Deliver `message` (newline appended) to the device registered
    /// under `id`. The write happens on its own task; this returns
    /// immediately.
    pub fn send_to_device(&self, id: &DeviceId, message: &str) {
        let gateway = self.clone();
        let id = id.clone();
        let message = message.to_owned();

        tokio::spawn(async move { gateway.deliver(id, message).await });
    }

    async fn deliver(&self, id: DeviceId, message: String) {
        let Some(device) = self.registry.get(&id) else {
            info!(%id, "Device not found, message cannot be delivered");
            return;
        };

        // Newline marks the end of the message.
        let payload = format!("{message}\n");

        let written = { device.session.lock().await.write(payload.as_bytes()).await };

        match written {
            Ok(count) if count == payload.len() => {
                info!(%id, bytes = count, "Delivered message");
            }
            Ok(count) => {
                error!(
                    %id,
                    written = count,
                    expected = payload.len(),
                    "Message was not delivered in full"
                );
            }
            Err(e) => {
                error!(%id, %e, "Serial port error while writing");
                info!(%id, "Deleting device due to a write error");

                self.delete_device(&id).await;
            }
        }
    }

    /// Deliver `message` to every registered device.
    pub fn broadcast_message(&self, message: &str) {
        for id in self.registry.ids() {
            self.send_to_device(&id, message);
        }
    }

    /// Remove the device registered under `id`: stop its reader, drop
    /// the registry entry and close the session.
    ///
    /// Returns whether a device was actually removed.
    pub async fn delete_device(&self, id: &DeviceId) -> bool {
        // Stop the reader first so it winds down while we close up.
        self.registry.set_started(id, false);

        let Some(device) = self.registry.remove(id) else {
            warn!(%id, "Device not found and could therefore not be deleted");
            return false;
        };

        {
            let mut session = device.session.lock().await;

            if let Err(e) = session.flush().await {
                debug!(%id, %e, "Flush while deleting failed");
            }

            if let Err(e) = session.close().await {
                error!(%id, port = %device.port, %e, "Could not properly close the session");
            }
        }

        info!(%id, port = %device.port, "Deleted serial device");

        self.events.send(Event::DeviceRemoved {
            id: id.clone(),
            port: device.port.clone(),
        });

        true
    }

    /// Delete every registered device, returning how many went away.
    pub async fn delete_all(&self) -> usize {
        info!("Deleting all serial devices");

        let mut deleted = 0;

        for id in self.registry.ids() {
            if self.delete_device(&id).await {
                deleted += 1;
            }
        }

        info!(deleted, "Finished deleting serial devices");

        deleted
    }

    /// A snapshot of all registered device IDs.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.registry.ids()
    }

    /// The registered device IDs as one comma-separated line.
    pub fn device_id_list(&self) -> String {
        self.device_ids().iter().join(LIST_SEPARATOR)
    }

    /// The system's serial port paths.
    pub fn system_ports(&self) -> Vec<String> {
        match self.transport.list_ports() {
            Ok(ports) => ports.into_iter().map(|info| info.path).collect(),
            Err(e) => {
                warn!(%e, "Could not enumerate serial ports");
                Vec::new()
            }
        }
    }

    /// The system's serial port paths as one comma-separated line.
    pub fn port_list(&self) -> String {
        self.system_ports().iter().join(LIST_SEPARATOR)
    }

    /// All `(id, port)` bindings currently registered.
    pub fn mappings(&self) -> Vec<(DeviceId, String)> {
        self.registry.mappings()
    }

    /// The bindings as one comma-separated line of `id -> port` entries.
    pub fn mapping_list(&self) -> String {
        self.mappings()
            .iter()
            .map(|(id, port)| format!("{id} -> {port}"))
            .join(LIST_SEPARATOR)
    }
}

/// Dig the `VVVV:PPPP` value out of a descriptor string: the run of
/// characters after `VID:PID=` up to the next space.
fn extract_hardware_id(descriptor: &str) -> Option<&str> {
    let key_position = descriptor.find(HARDWARE_ID_KEY)?;
    let value = &descriptor[key_position + HARDWARE_ID_KEY.len()..];

    let value = match value.find(' ') {
        Some(end) => &value[..end],
        None => value,
    };

    (!value.is_empty()).then_some(value)
}
