//! The HID relay subsystem: a manager owning zero or more providers and the
//! devices they've opened, each with a monotonic id, a per-device mutex and
//! a report holder that turns successive input-report snapshots into full
//! or delta `DeviceInputReport` protobuf messages (spec.md §4.8).
//!
//! Backends (SDL joystick, hidapi) are out of scope (spec.md §4.8
//! Non-goals); this module only implements the provider/device contracts
//! and the manager/report-diff logic those backends would plug into, plus
//! an in-memory device for exercising both.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use ihs_proto::{
    hid::{Delta, compute_delta},
    pb::hid::{
        DeviceInfo, DeviceInputReport, DeviceListUpdate, device_input_report::Report as ReportKind,
    },
};
use thiserror::Error;
use tracing::debug;

/// A device-level operation failed. Carries the backend's own description,
/// since the concrete failure modes are backend-specific (SDL error string,
/// hidapi `wcscpy` truncation, `ENODEV`...) and this crate has no backend of
/// its own to define a closed taxonomy over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hid device error: {0}")]
pub struct HidDeviceError(pub String);

/// Result alias for device and provider operations.
pub type Result<T> = std::result::Result<T, HidDeviceError>;

/// A single opened HID device (spec.md §4.8 "device").
pub trait HidDevice: Send {
    /// Open the device for I/O. Called once, before any other method.
    fn open(&mut self) -> Result<()>;
    /// Release the device. Idempotent.
    fn close(&mut self);
    /// Send an output report.
    fn write(&mut self, data: &[u8]) -> Result<()>;
    /// Read up to `len` bytes of the next input report, waiting at most
    /// `timeout`.
    fn read(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;
    /// Request a feature report by number.
    fn get_feature_report(&mut self, report_number: u8, len: usize) -> Result<Vec<u8>>;
    /// Send a feature report.
    fn send_feature_report(&mut self, data: &[u8]) -> Result<()>;
    /// The device's vendor string, or empty if unknown.
    fn vendor_string(&self) -> String {
        String::new()
    }
    /// The device's product string, or empty if unknown.
    fn product_string(&self) -> String {
        String::new()
    }
    /// The device's serial number string, or empty if unknown.
    fn serial_number_string(&self) -> String {
        String::new()
    }
    /// Begin streaming input reports of the given fixed length. The first
    /// report after this call is a full report; later changes are deltas
    /// (spec.md §4.8).
    fn start_input_reports(&mut self, length: usize) -> Result<()>;
    /// Force the next input report to be a full report rather than a delta.
    fn request_full_report(&mut self) -> Result<Vec<u8>>;
    /// Ask the device to disconnect by an implementation-defined `method`.
    fn request_disconnect(&mut self, method: u32, data: &[u8]) -> Result<()>;
}

/// A source of HID devices (spec.md §4.8 "provider"). The canonical path
/// format is `sdl://{joystick_instance_id}` for an SDL-backed provider and
/// `hid://...` for a hidapi-backed one; this crate defines no concrete
/// backend, only the contract a caller's backend implements.
pub trait HidProvider: Send {
    /// Whether this provider recognizes `path` as one of its own devices.
    fn supports_device(&self, path: &str) -> bool;
    /// Open the device at `path`, if this provider supports it.
    fn open_device(&self, path: &str) -> Option<Box<dyn HidDevice>>;
    /// Whether the provider's device list has changed since the last call
    /// (hot-plug detection).
    fn has_change(&mut self) -> bool {
        false
    }
    /// List the device paths currently visible to this provider.
    fn enumerate_devices(&self) -> Vec<String>;
}

/// A provider with no devices, used when a caller registers no backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl HidProvider for NullProvider {
    fn supports_device(&self, _path: &str) -> bool {
        false
    }

    fn open_device(&self, _path: &str) -> Option<Box<dyn HidDevice>> {
        None
    }

    fn enumerate_devices(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Maintains the previous-report snapshot for one device and turns each new
/// snapshot into a full or delta `DeviceInputReport` (spec.md §4.8, grounded
/// on `ihslib/src/hid/report.c`'s `IHS_HIDReportHolderUpdateDelta`).
#[derive(Debug, Default)]
pub struct ReportHolder {
    previous: Option<Vec<u8>>,
}

impl ReportHolder {
    /// A report holder with no prior snapshot; its next update is a full
    /// report.
    #[must_use]
    pub fn new() -> Self {
        Self { previous: None }
    }

    /// Diff `current` against the last snapshot (or deliver a full report
    /// if this is the first update since construction or the last call to
    /// [`Self::reset`]), returning the report body without the
    /// `device_id` field set.
    pub fn update(&mut self, current: &[u8]) -> ReportKind {
        let report = match &self.previous {
            Some(previous) if previous.len() == current.len() => {
                let delta = compute_delta(previous, current);
                ReportKind::DeltaReport(encode_delta(&delta))
            }
            _ => ReportKind::FullReport(current.to_vec()),
        };
        self.previous = Some(current.to_vec());
        report
    }

    /// Force the next [`Self::update`] to produce a full report.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

fn encode_delta(delta: &Delta) -> ihs_proto::pb::hid::DeltaReport {
    let mut data = Vec::with_capacity(delta.bitmap.len() + delta.changed_bytes.len());
    data.extend_from_slice(&delta.bitmap);
    data.extend_from_slice(&delta.changed_bytes);
    #[allow(clippy::cast_possible_truncation)]
    let full_length = delta.full_length as u32;
    ihs_proto::pb::hid::DeltaReport { data, crc: delta.crc, full_length }
}

struct ManagedDevice {
    path: String,
    device: Mutex<Box<dyn HidDevice>>,
    report_holder: Mutex<ReportHolder>,
}

/// Owns the registered providers and every device they've opened, assigning
/// each a monotonically increasing 32-bit id (spec.md §3 "HID device
/// registry").
pub struct HidManager {
    providers: Vec<Box<dyn HidProvider>>,
    next_device_id: AtomicU32,
    devices: Mutex<HashMap<u32, ManagedDevice>>,
}

impl HidManager {
    /// Build a manager over the given providers. A manager with no
    /// providers (or only [`NullProvider`]s) never opens a device.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn HidProvider>>) -> Self {
        Self { providers, next_device_id: AtomicU32::new(1), devices: Mutex::new(HashMap::new()) }
    }

    /// Open the device at `path` through whichever registered provider
    /// supports it, assigning it a fresh id. Returns `None` if no provider
    /// supports the path or the provider declined to open it.
    pub fn open(&self, path: &str) -> Option<u32> {
        let provider = self.providers.iter().find(|provider| provider.supports_device(path))?;
        let mut device = provider.open_device(path)?;
        if let Err(err) = device.open() {
            debug!(path, error = %err.0, "hid device open failed");
            return None;
        }
        let device_id = self.next_device_id.fetch_add(1, Ordering::Relaxed);
        let managed = ManagedDevice {
            path: path.to_owned(),
            device: Mutex::new(device),
            report_holder: Mutex::new(ReportHolder::new()),
        };
        #[allow(clippy::unwrap_used)]
        self.devices.lock().unwrap().insert(device_id, managed);
        Some(device_id)
    }

    /// Close and forget `device_id`. Returns `true` if it was open.
    pub fn close(&self, device_id: u32) -> bool {
        #[allow(clippy::unwrap_used)]
        let mut devices = self.devices.lock().unwrap();
        let Some(managed) = devices.remove(&device_id) else { return false };
        #[allow(clippy::unwrap_used)]
        managed.device.lock().unwrap().close();
        true
    }

    /// Close and forget every open device.
    pub fn close_all(&self) {
        #[allow(clippy::unwrap_used)]
        let mut devices = self.devices.lock().unwrap();
        for (_, managed) in devices.drain() {
            #[allow(clippy::unwrap_used)]
            managed.device.lock().unwrap().close();
        }
    }

    fn with_device<T>(&self, device_id: u32, f: impl FnOnce(&mut dyn HidDevice) -> T) -> Option<T> {
        #[allow(clippy::unwrap_used)]
        let devices = self.devices.lock().unwrap();
        let managed = devices.get(&device_id)?;
        #[allow(clippy::unwrap_used)]
        let mut device = managed.device.lock().unwrap();
        Some(f(device.as_mut()))
    }

    /// Write an output report to `device_id`.
    pub fn write(&self, device_id: u32, data: &[u8]) -> Option<Result<()>> {
        self.with_device(device_id, |device| device.write(data))
    }

    /// Read up to `len` bytes from `device_id`.
    pub fn read(&self, device_id: u32, len: usize, timeout: Duration) -> Option<Result<Vec<u8>>> {
        self.with_device(device_id, |device| device.read(len, timeout))
    }

    /// Request a feature report from `device_id`.
    pub fn get_feature_report(&self, device_id: u32, report_number: u8, len: usize) -> Option<Result<Vec<u8>>> {
        self.with_device(device_id, |device| device.get_feature_report(report_number, len))
    }

    /// Send a feature report to `device_id`.
    pub fn send_feature_report(&self, device_id: u32, data: &[u8]) -> Option<Result<()>> {
        self.with_device(device_id, |device| device.send_feature_report(data))
    }

    /// Start input-report streaming on `device_id` and reset its report
    /// holder so the next update is a full report.
    pub fn start_input_reports(&self, device_id: u32, length: usize) -> Option<Result<()>> {
        #[allow(clippy::unwrap_used)]
        let devices = self.devices.lock().unwrap();
        let managed = devices.get(&device_id)?;
        #[allow(clippy::unwrap_used)]
        let result = managed.device.lock().unwrap().start_input_reports(length);
        #[allow(clippy::unwrap_used)]
        managed.report_holder.lock().unwrap().reset();
        Some(result)
    }

    /// Ask `device_id` to disconnect.
    pub fn request_disconnect(&self, device_id: u32, method: u32, data: &[u8]) -> Option<Result<()>> {
        self.with_device(device_id, |device| device.request_disconnect(method, data))
    }

    /// Diff a freshly read input report against `device_id`'s last
    /// snapshot, producing the full-or-delta report body to relay to the
    /// host. Returns `None` if `device_id` isn't open.
    pub fn diff_input_report(&self, device_id: u32, current: &[u8]) -> Option<DeviceInputReport> {
        #[allow(clippy::unwrap_used)]
        let devices = self.devices.lock().unwrap();
        let managed = devices.get(&device_id)?;
        #[allow(clippy::unwrap_used)]
        let report = managed.report_holder.lock().unwrap().update(current);
        Some(DeviceInputReport { device_id, report: Some(report) })
    }

    /// Build the `DeviceListUpdate` describing every currently open device,
    /// relayed to the host after provider enumeration changes.
    #[must_use]
    pub fn device_list_update(&self) -> DeviceListUpdate {
        #[allow(clippy::unwrap_used)]
        let devices = self.devices.lock().unwrap();
        let devices = devices
            .iter()
            .map(|(&device_id, managed)| {
                #[allow(clippy::unwrap_used)]
                let device = managed.device.lock().unwrap();
                DeviceInfo {
                    device_id,
                    path: managed.path.clone(),
                    vendor_string: device.vendor_string(),
                    product_string: device.product_string(),
                    serial_number: device.serial_number_string(),
                }
            })
            .collect();
        DeviceListUpdate { devices }
    }

    /// Poll every registered provider for hot-plug changes.
    #[must_use]
    pub fn any_provider_changed(&mut self) -> bool {
        self.providers.iter_mut().fold(false, |changed, provider| provider.has_change() || changed)
    }
}

/// An in-memory device backed by a `Vec<u8>`, for exercising the manager
/// and report-diff logic without a real HID backend.
#[derive(Debug, Default)]
pub struct MemoryHidDevice {
    state: Vec<u8>,
    open: bool,
}

impl MemoryHidDevice {
    /// A closed device whose input-report state starts as `initial_state`.
    #[must_use]
    pub fn new(initial_state: Vec<u8>) -> Self {
        Self { state: initial_state, open: false }
    }

    /// Overwrite the device's current input-report state, as if new data
    /// had arrived on the wire.
    pub fn set_state(&mut self, state: Vec<u8>) {
        self.state = state;
    }
}

impl HidDevice for MemoryHidDevice {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn write(&mut self, _data: &[u8]) -> Result<()> {
        if self.open { Ok(()) } else { Err(HidDeviceError("device not open".to_owned())) }
    }

    fn read(&mut self, len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        Ok(self.state.iter().copied().take(len).collect())
    }

    fn get_feature_report(&mut self, _report_number: u8, len: usize) -> Result<Vec<u8>> {
        Ok(vec![0u8; len])
    }

    fn send_feature_report(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn start_input_reports(&mut self, _length: usize) -> Result<()> {
        Ok(())
    }

    fn request_full_report(&mut self) -> Result<Vec<u8>> {
        Ok(self.state.clone())
    }

    fn request_disconnect(&mut self, _method: u32, _data: &[u8]) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// A provider wrapping a single fixed [`MemoryHidDevice`], for tests.
pub struct MemoryProvider {
    path: String,
    initial_state: Vec<u8>,
}

impl MemoryProvider {
    /// A provider serving one device at `path` whose state starts as
    /// `initial_state`.
    #[must_use]
    pub fn new(path: impl Into<String>, initial_state: Vec<u8>) -> Self {
        Self { path: path.into(), initial_state }
    }
}

impl HidProvider for MemoryProvider {
    fn supports_device(&self, path: &str) -> bool {
        path == self.path
    }

    fn open_device(&self, path: &str) -> Option<Box<dyn HidDevice>> {
        if path == self.path {
            Some(Box::new(MemoryHidDevice::new(self.initial_state.clone())))
        } else {
            None
        }
    }

    fn enumerate_devices(&self) -> Vec<String> {
        vec![self.path.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> HidManager {
        HidManager::new(vec![Box::new(MemoryProvider::new("sdl://0", vec![0u8; 48]))])
    }

    #[test]
    fn unsupported_path_is_not_opened() {
        let manager = manager();
        assert!(manager.open("hid://unknown").is_none());
    }

    #[test]
    fn open_assigns_monotonic_ids() {
        let manager = manager();
        let first = manager.open("sdl://0").expect("opens");
        manager.close(first);
        let second = manager.open("sdl://0").expect("opens again");
        assert_ne!(first, second, "ids are never reused");
    }

    #[test]
    fn first_report_after_open_is_full() {
        let manager = manager();
        let device_id = manager.open("sdl://0").expect("opens");
        let report = manager.diff_input_report(device_id, &[0u8; 48]).expect("device is open");
        assert!(matches!(report.report, Some(ReportKind::FullReport(_))));
    }

    #[test]
    fn second_report_is_a_delta() {
        let manager = manager();
        let device_id = manager.open("sdl://0").expect("opens");
        manager.diff_input_report(device_id, &[0u8; 48]).expect("first report");
        let mut current = [0u8; 48];
        current[16] = 0x40;
        let report = manager.diff_input_report(device_id, &current).expect("device is open");
        match report.report {
            Some(ReportKind::DeltaReport(delta)) => {
                assert_eq!(delta.full_length, 48);
                assert_eq!(delta.crc, ihs_proto::crc32c(&current));
            }
            other => panic!("expected a delta report, got {other:?}"),
        }
    }

    #[test]
    fn start_input_reports_resets_to_a_full_report() {
        let manager = manager();
        let device_id = manager.open("sdl://0").expect("opens");
        manager.diff_input_report(device_id, &[0u8; 48]).expect("first report");
        manager.start_input_reports(device_id, 48).expect("device open").expect("backend accepts");
        let report = manager.diff_input_report(device_id, &[0u8; 48]).expect("device is open");
        assert!(matches!(report.report, Some(ReportKind::FullReport(_))));
    }

    #[test]
    fn closing_an_unknown_device_is_a_no_op() {
        let manager = manager();
        assert!(!manager.close(999));
    }

    #[test]
    fn device_list_update_reports_every_open_device() {
        let manager = manager();
        let device_id = manager.open("sdl://0").expect("opens");
        let update = manager.device_list_update();
        assert_eq!(update.devices.len(), 1);
        assert_eq!(update.devices[0].device_id, device_id);
        assert_eq!(update.devices[0].path, "sdl://0");
    }
}
