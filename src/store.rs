//! Device state store.
//!
//! The store is the only shared mutable structure in the relay. It holds one
//! [`DeviceRecord`] per device ever seen and a single publish slot holding the
//! most recent [`PublishedResult`] from *any* device.
//!
//! # Write protocol
//!
//! An upload must win [`DeviceStateStore::try_begin_write`] before it reads
//! its payload and must end with exactly one
//! [`DeviceStateStore::finish_write`]. [`DeviceStateStore::begin_write`]
//! wraps both in a [`WriteLease`] whose `Drop` releases the device, so an
//! upload that errors or panics part way never locks its device out.
//!
//! # Locking
//!
//! The device map sits behind one `Mutex`; the check-and-set in
//! `try_begin_write` happens entirely under it. The publish slot is an
//! `RwLock<Option<Arc<_>>>`: a publish swaps the `Arc`, a read clones it, so
//! readers never see a half-written triple and never wait on payload I/O.
//!
//! Uploads from different devices are deliberately not serialized against
//! each other. The slot is last-writer-wins across devices.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Per-device freshness and exclusivity state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceRecord {
    /// Capture time of the most recently accepted upload
    pub last_accepted_time: f64,
    /// An accepted upload has not yet called `finish_write`
    pub write_in_progress: bool,
}

/// The frame set shown to viewers.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedResult {
    /// Device that produced this frame
    pub device_id: u32,
    /// Capture time declared in the upload header
    pub capture_time: f64,
    /// Bytes as uploaded
    pub raw: Bytes,
    /// Raw frame with detections drawn on it
    pub annotated: Bytes,
    /// Detection summary JSON
    pub detection_json: String,
}

/// Shared device state. Clone the surrounding `Arc` to share between tasks.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    devices: Mutex<HashMap<u32, DeviceRecord>>,
    latest: RwLock<Option<Arc<PublishedResult>>>,
}

impl DeviceStateStore {
    /// Empty store: no devices, nothing published.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a record half-updated: every
    // mutation below is a single assignment. Recover instead of cascading.
    fn devices(&self) -> MutexGuard<'_, HashMap<u32, DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the device for one upload.
    ///
    /// Succeeds iff the device has never been seen, or its last accepted
    /// capture time is strictly older than `capture_time` and no other upload
    /// holds it. On success the record is marked writing and its
    /// `last_accepted_time` advanced; on failure nothing changes.
    pub fn try_begin_write(&self, device_id: u32, capture_time: f64) -> bool {
        let mut devices = self.devices();

        match devices.get_mut(&device_id) {
            Some(record) => {
                let fresh = capture_time > record.last_accepted_time;
                if record.write_in_progress || !fresh {
                    return false;
                }
                record.last_accepted_time = capture_time;
                record.write_in_progress = true;
            }
            None => {
                devices.insert(
                    device_id,
                    DeviceRecord {
                        last_accepted_time: capture_time,
                        write_in_progress: true,
                    },
                );
            }
        }

        true
    }

    /// Release the device and, if `result` is present, replace the publish slot.
    pub fn finish_write(&self, device_id: u32, result: Option<PublishedResult>) {
        // Publish before releasing so a follow-up upload from the same device
        // cannot publish ahead of this one.
        if let Some(result) = result {
            let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
            *latest = Some(Arc::new(result));
        }

        if let Some(record) = self.devices().get_mut(&device_id) {
            record.write_in_progress = false;
        }
    }

    /// RAII form of [`try_begin_write`](Self::try_begin_write).
    pub fn begin_write(self: &Arc<Self>, device_id: u32, capture_time: f64) -> Option<WriteLease> {
        self.try_begin_write(device_id, capture_time)
            .then(|| WriteLease {
                store: Arc::clone(self),
                device_id,
                capture_time,
                finished: false,
            })
    }

    /// Snapshot of the publish slot.
    pub fn latest(&self) -> Option<Arc<PublishedResult>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of a device's record, if the device has uploaded before.
    pub fn device(&self, device_id: u32) -> Option<DeviceRecord> {
        self.devices().get(&device_id).copied()
    }

    /// Number of devices ever seen.
    pub fn device_count(&self) -> usize {
        self.devices().len()
    }
}

/// Exclusive right to publish one upload for one device.
///
/// Dropping the lease without calling [`publish`](Self::publish) releases the
/// device and leaves the publish slot untouched.
#[derive(Debug)]
#[must_use = "dropping a lease immediately releases the device"]
pub struct WriteLease {
    store: Arc<DeviceStateStore>,
    device_id: u32,
    capture_time: f64,
    finished: bool,
}

impl WriteLease {
    /// Device this lease holds.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Capture time that was accepted.
    pub fn capture_time(&self) -> f64 {
        self.capture_time
    }

    /// Publish the processed frame set and release the device.
    pub fn publish(mut self, raw: Bytes, annotated: Bytes, detection_json: String) {
        self.finished = true;
        self.store.finish_write(
            self.device_id,
            Some(PublishedResult {
                device_id: self.device_id,
                capture_time: self.capture_time,
                raw,
                annotated,
                detection_json,
            }),
        );
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        if !self.finished {
            self.store.finish_write(self.device_id, None);
        }
    }
}
