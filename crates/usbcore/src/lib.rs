//! Userspace USB core
//!
//! Plays the host's part for USB interface drivers: it learns about devices
//! from libusb hot-plug notifications, matches their interfaces against the
//! ID tables of registered drivers and invokes the drivers' lifecycle
//! callbacks. Drivers implement [`UsbDriver`] and never call the callbacks
//! themselves.

pub mod channel;
pub mod device;
pub mod driver;
pub mod error;
pub mod hotplug;
pub mod id;
pub mod logging;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod worker;

pub use channel::{
    CoreBridge, CoreCommand, CoreWorker, DeviceSummary, HotplugEvent, create_core_bridge,
};
pub use device::{InterfaceInfo, UsbDeviceRecord, UsbInterface};
pub use driver::{DriverDescriptor, PmMessage, UsbDriver};
pub use error::{Errno, Error, RegistrationError, Result};
pub use id::{DeviceIdentity, MatchFlags, UsbDeviceId};
pub use logging::setup_logging;
pub use registry::{Binding, SharedCore, UsbCore, lock_core};
pub use worker::{CoreSettings, UsbCoreThread, spawn_core_thread};
