//! USB device and interface records
//!
//! The core never keeps a libusb handle open. On arrival it reads the
//! descriptors once into a [`UsbDeviceRecord`] and hands drivers borrowed
//! [`UsbInterface`] views built from it.

use crate::id::DeviceIdentity;
use rusb::{ConfigDescriptor, Device, UsbContext, Version};
use std::fmt;
use tracing::debug;

/// Interface as described by its first alternate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alt_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
}

/// Everything the core knows about a connected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceRecord {
    pub bus: u8,
    pub address: u8,
    pub identity: DeviceIdentity,
    /// Device release number (bcdDevice)
    pub bcd_device: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub interfaces: Vec<InterfaceInfo>,
}

impl UsbDeviceRecord {
    /// Read descriptors of a libusb device
    ///
    /// Uses the active configuration, falling back to the first one when the
    /// device is not configured yet.
    pub fn from_device<T: UsbContext>(device: &Device<T>) -> Result<Self, rusb::Error> {
        let descriptor = device.device_descriptor()?;

        let config = match device.active_config_descriptor() {
            Ok(config) => config,
            Err(e) => {
                debug!(
                    "No active configuration on bus={} addr={} ({}), using index 0",
                    device.bus_number(),
                    device.address(),
                    e
                );
                device.config_descriptor(0)?
            }
        };

        Ok(Self {
            bus: device.bus_number(),
            address: device.address(),
            identity: DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
            bcd_device: version_to_bcd(descriptor.device_version()),
            class: descriptor.class_code(),
            subclass: descriptor.sub_class_code(),
            protocol: descriptor.protocol_code(),
            interfaces: interfaces_of(&config),
        })
    }

    /// Bus/address pair identifying the device while it is connected
    pub fn key(&self) -> (u8, u8) {
        (self.bus, self.address)
    }

    /// Interface handle for one of this device's interfaces
    pub fn interface(&self, info: &InterfaceInfo) -> UsbInterface {
        UsbInterface {
            bus: self.bus,
            address: self.address,
            identity: self.identity,
            info: *info,
        }
    }
}

fn interfaces_of(config: &ConfigDescriptor) -> Vec<InterfaceInfo> {
    config
        .interfaces()
        .filter_map(|interface| {
            let alt = interface.descriptors().next()?;
            Some(InterfaceInfo {
                number: alt.interface_number(),
                alt_setting: alt.setting_number(),
                class: alt.class_code(),
                subclass: alt.sub_class_code(),
                protocol: alt.protocol_code(),
            })
        })
        .collect()
}

/// Encode a descriptor version back into its BCD form
fn version_to_bcd(version: Version) -> u16 {
    (u16::from(version.major()) << 8)
        | (u16::from(version.minor() & 0x0f) << 4)
        | u16::from(version.sub_minor() & 0x0f)
}

/// Interface handle passed to driver callbacks
///
/// Only valid for the duration of the callback; drivers that need to keep
/// per-interface state key it by [`UsbInterface::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbInterface {
    bus: u8,
    address: u8,
    identity: DeviceIdentity,
    info: InterfaceInfo,
}

impl UsbInterface {
    pub fn bus_number(&self) -> u8 {
        self.bus
    }

    pub fn device_address(&self) -> u8 {
        self.address
    }

    /// Identity of the device this interface belongs to
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn number(&self) -> u8 {
        self.info.number
    }

    pub fn info(&self) -> &InterfaceInfo {
        &self.info
    }

    /// (bus, address, interface number)
    pub fn key(&self) -> (u8, u8, u8) {
        (self.bus, self.address, self.info.number)
    }
}

impl fmt::Display for UsbInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{} ({})",
            self.bus, self.address, self.info.number, self.identity
        )
    }
}
