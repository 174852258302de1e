//! Pendrive interface driver
//!
//! Claims two flash-drive models and logs their arrival and removal. No I/O
//! is done and no per-interface state is kept.

use std::sync::Arc;
use tracing::{debug, info};
use usbcore::{DriverDescriptor, Errno, UsbDeviceId, UsbDriver, UsbInterface};

/// Name the driver registers under
pub const DRIVER_NAME: &str = "pendrive";

/// Devices this driver claims
pub static PENDRIVE_ID_TABLE: [UsbDeviceId; 3] = [
    UsbDeviceId::device(0x03f0, 0x5307),
    UsbDeviceId::device(0x0951, 0x1607),
    UsbDeviceId::TERMINATOR,
];

#[derive(Debug, Default)]
pub struct PendriveDriver;

impl PendriveDriver {
    /// Descriptor handed to the USB core on module init
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(DRIVER_NAME, &PENDRIVE_ID_TABLE, Arc::new(PendriveDriver))
    }
}

/// Line logged when a matching device is plugged in
pub fn plugged_in_message(id: &UsbDeviceId) -> String {
    format!("Pendrive ({}) plugged in", id.identity())
}

pub const REMOVED_MESSAGE: &str = "Pendrive removed";

impl UsbDriver for PendriveDriver {
    fn probe(&self, interface: &UsbInterface, id: &UsbDeviceId) -> Result<(), Errno> {
        debug!("Inside probe for interface {}", interface);
        info!("{}", plugged_in_message(id));
        Ok(())
    }

    fn disconnect(&self, interface: &UsbInterface) {
        debug!("Inside disconnect for interface {}", interface);
        info!("{}", REMOVED_MESSAGE);
    }
}
