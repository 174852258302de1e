//! Test utilities for the USB core
//!
//! Mock device records, a driver that records its callbacks, and a tracing
//! capture for asserting on log output.
//!
//! # Example
//!
//! ```
//! use usbcore::test_utils::mock_device;
//!
//! let device = mock_device(1, 4, 0x0951, 0x1607);
//! assert_eq!(device.identity.to_string(), "0951:1607");
//! ```

use crate::device::{InterfaceInfo, UsbDeviceRecord, UsbInterface};
use crate::driver::{PmMessage, UsbDriver};
use crate::error::Errno;
use crate::id::{DeviceIdentity, UsbDeviceId};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// Mass-storage interface (SCSI transparent, bulk-only)
pub const MASS_STORAGE: InterfaceInfo = InterfaceInfo {
    number: 0,
    alt_setting: 0,
    class: 0x08,
    subclass: 0x06,
    protocol: 0x50,
};

/// A single-interface mass-storage device
pub fn mock_device(bus: u8, address: u8, vendor_id: u16, product_id: u16) -> UsbDeviceRecord {
    mock_device_with_interfaces(bus, address, vendor_id, product_id, &[MASS_STORAGE])
}

/// A device with the given interfaces
pub fn mock_device_with_interfaces(
    bus: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
    interfaces: &[InterfaceInfo],
) -> UsbDeviceRecord {
    UsbDeviceRecord {
        bus,
        address,
        identity: DeviceIdentity::new(vendor_id, product_id),
        bcd_device: 0x0100,
        class: 0x00,
        subclass: 0x00,
        protocol: 0x00,
        interfaces: interfaces.to_vec(),
    }
}

/// Interface `number` with the given class triple
pub fn interface(number: u8, class: u8, subclass: u8, protocol: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alt_setting: 0,
        class,
        subclass,
        protocol,
    }
}

/// A callback observed by [`RecordingDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Probe(UsbInterface, UsbDeviceId),
    Disconnect(UsbInterface),
    Suspend(UsbInterface, PmMessage),
    Resume(UsbInterface),
    ResetResume(UsbInterface),
    PreReset(UsbInterface),
    PostReset(UsbInterface),
}

/// Driver that records every callback and returns configurable results
#[derive(Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,
    probe_result: Mutex<Option<Errno>>,
    suspend_result: Mutex<Option<Errno>>,
    pre_reset_result: Mutex<Option<Errno>>,
    post_reset_result: Mutex<Option<Errno>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `probe` fail with `errno` from now on
    pub fn fail_probe(&self, errno: Errno) {
        *lock(&self.probe_result) = Some(errno);
    }

    /// Make `suspend` fail with `errno` from now on
    pub fn fail_suspend(&self, errno: Errno) {
        *lock(&self.suspend_result) = Some(errno);
    }

    /// Make the next `pre_reset` fail with `errno`
    pub fn fail_pre_reset(&self, errno: Errno) {
        *lock(&self.pre_reset_result) = Some(errno);
    }

    /// Make the next `post_reset` fail with `errno`
    pub fn fail_post_reset(&self, errno: Errno) {
        *lock(&self.post_reset_result) = Some(errno);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.calls).clone()
    }

    pub fn probes(&self) -> Vec<(UsbInterface, UsbDeviceId)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Probe(interface, id) => Some((interface, id)),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> Vec<UsbInterface> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Disconnect(interface) => Some(interface),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DriverCall) {
        lock(&self.calls).push(call);
    }
}

impl UsbDriver for RecordingDriver {
    fn probe(&self, interface: &UsbInterface, id: &UsbDeviceId) -> Result<(), Errno> {
        self.record(DriverCall::Probe(*interface, *id));
        match *lock(&self.probe_result) {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn disconnect(&self, interface: &UsbInterface) {
        self.record(DriverCall::Disconnect(*interface));
    }

    fn suspend(&self, interface: &UsbInterface, message: PmMessage) -> Result<(), Errno> {
        self.record(DriverCall::Suspend(*interface, message));
        match *lock(&self.suspend_result) {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn resume(&self, interface: &UsbInterface) -> Result<(), Errno> {
        self.record(DriverCall::Resume(*interface));
        Ok(())
    }

    fn reset_resume(&self, interface: &UsbInterface) -> Result<(), Errno> {
        self.record(DriverCall::ResetResume(*interface));
        Ok(())
    }

    fn pre_reset(&self, interface: &UsbInterface) -> Result<(), Errno> {
        self.record(DriverCall::PreReset(*interface));
        match lock(&self.pre_reset_result).take() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn post_reset(&self, interface: &UsbInterface) -> Result<(), Errno> {
        self.record(DriverCall::PostReset(*interface));
        match lock(&self.post_reset_result).take() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }
}

/// Driver whose `probe` panics for one interface number
///
/// Every other interface is claimed.
pub struct PanickingDriver {
    interface: u8,
    disconnects: AtomicUsize,
}

impl PanickingDriver {
    pub fn on_interface(interface: u8) -> Self {
        Self {
            interface,
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl UsbDriver for PanickingDriver {
    fn probe(&self, interface: &UsbInterface, _id: &UsbDeviceId) -> Result<(), Errno> {
        if interface.number() == self.interface {
            panic!("probe of interface {} panicked", interface.number());
        }
        Ok(())
    }

    fn disconnect(&self, _interface: &UsbInterface) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory sink for tracing output
///
/// ```
/// use usbcore::test_utils::LogCapture;
///
/// let logs = LogCapture::new();
/// logs.capture(|| tracing::info!("hello"));
/// assert!(logs.contains("hello"));
/// ```
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with a subscriber writing into this capture
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Number of captured lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|line| line.contains(needle)).count()
    }
}

/// Writer handed out by [`LogCapture`]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
