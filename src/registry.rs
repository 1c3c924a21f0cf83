use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use crate::device::{Device, DeviceId};

/// Lifecycle flags of one reader task. Written and read by different
/// tasks, hence the atomics.
#[derive(Debug, Default)]
struct ReaderState {
    started: AtomicBool,
    exited: AtomicBool,
}

/// The concurrent mapping from device IDs to device records, plus the
/// state of each device's reader task.
///
/// All operations take `&self` and are atomic with respect to one
/// another; the scan loop, readers and the send path all share one
/// registry.
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
    reader_states: RwLock<HashMap<DeviceId, Arc<ReaderState>>>,
}

impl Registry {
    /// A new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the device under its ID unless that ID is already taken.
    /// Returns whether the device was inserted.
    pub fn insert_if_absent(&self, device: Arc<Device>) -> bool {
        let mut devices = self.devices.write().expect("Registry lock poisoned");

        match devices.entry(device.id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(device);
                true
            }
        }
    }

    /// Remove and return the device registered under the ID.
    pub fn remove(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices
            .write()
            .expect("Registry lock poisoned")
            .remove(id)
    }

    /// The device registered under the ID.
    pub fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices
            .read()
            .expect("Registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// The device bound to the given port path, if any.
    pub fn find_by_port(&self, port: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .expect("Registry lock poisoned")
            .values()
            .find(|device| device.port == port)
            .cloned()
    }

    /// A snapshot of all registered IDs.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices
            .read()
            .expect("Registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// All `(id, port)` pairs currently registered.
    pub fn mappings(&self) -> Vec<(DeviceId, String)> {
        self.devices
            .read()
            .expect("Registry lock poisoned")
            .values()
            .map(|device| (device.id.clone(), device.port.clone()))
            .collect()
    }

    fn reader_state(&self, id: &DeviceId) -> Option<Arc<ReaderState>> {
        self.reader_states
            .read()
            .expect("Registry lock poisoned")
            .get(id)
            .cloned()
    }

    fn reader_state_or_default(&self, id: &DeviceId) -> Arc<ReaderState> {
        let mut states = self.reader_states.write().expect("Registry lock poisoned");

        states
            .entry(id.clone())
            .or_insert_with(|| {
                // A fresh entry is "not running": the reader flips
                // `exited` to false once it actually enters its loop.
                Arc::new(ReaderState {
                    started: AtomicBool::new(false),
                    exited: AtomicBool::new(true),
                })
            })
            .clone()
    }

    /// Flag the reader of `id` as started or stopped.
    pub fn set_started(&self, id: &DeviceId, started: bool) {
        self.reader_state_or_default(id)
            .started
            .store(started, Ordering::SeqCst);
    }

    /// Flag the reader of `id` as having entered or left its loop.
    pub fn set_exited(&self, id: &DeviceId, exited: bool) {
        self.reader_state_or_default(id)
            .exited
            .store(exited, Ordering::SeqCst);
    }

    /// Whether the reader of `id` should keep running.
    /// Unknown IDs are "not started".
    pub fn is_started(&self, id: &DeviceId) -> bool {
        self.reader_state(id)
            .map(|state| state.started.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Whether the reader of `id` has left its loop.
    /// Unknown IDs count as exited, so "no such reader" reads as done.
    pub fn is_exited(&self, id: &DeviceId) -> bool {
        self.reader_state(id)
            .map(|state| state.exited.load(Ordering::SeqCst))
            .unwrap_or(true)
    }

    /// Whether every reader ever started has wound down.
    /// Used to decide when teardown may proceed.
    pub fn all_exited(&self) -> bool {
        self.reader_states
            .read()
            .expect("Registry lock poisoned")
            .values()
            .all(|state| state.exited.load(Ordering::SeqCst))
    }

    /// Drop the reader-state entry of `id` if its device is gone and the
    /// reader is done. Entries of re-admitted devices stay put.
    pub fn prune_reader_state(&self, id: &DeviceId) {
        let device_exists = self
            .devices
            .read()
            .expect("Registry lock poisoned")
            .contains_key(id);

        if device_exists {
            return;
        }

        let mut states = self.reader_states.write().expect("Registry lock poisoned");

        if let Some(state) = states.get(id) {
            if state.exited.load(Ordering::SeqCst) && !state.started.load(Ordering::SeqCst) {
                states.remove(id);
            }
        }
    }
}
