//! Device ID tables
//!
//! A driver advertises the devices it supports with a static table of
//! [`UsbDeviceId`] entries closed by [`UsbDeviceId::TERMINATOR`]. The core
//! walks each table up to the terminator and applies the same match rules as
//! the Linux USB core (`usb_match_one_id`).

use crate::device::{InterfaceInfo, UsbDeviceRecord};
use bitflags::bitflags;
use std::fmt;

/// USB class code for vendor-specific devices
pub const USB_CLASS_VENDOR_SPEC: u8 = 0xff;

/// Vendor/product pair identifying a device model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

bitflags! {
    /// Which fields of a [`UsbDeviceId`] take part in matching
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MatchFlags: u16 {
        const VENDOR = 0x0001;
        const PRODUCT = 0x0002;
        const DEV_LO = 0x0004;
        const DEV_HI = 0x0008;
        const DEV_CLASS = 0x0010;
        const DEV_SUBCLASS = 0x0020;
        const DEV_PROTOCOL = 0x0040;
        const INT_CLASS = 0x0080;
        const INT_SUBCLASS = 0x0100;
        const INT_PROTOCOL = 0x0200;
        const INT_NUMBER = 0x0400;

        const DEVICE = Self::VENDOR.bits() | Self::PRODUCT.bits();
        const DEV_RANGE = Self::DEV_LO.bits() | Self::DEV_HI.bits();
        const DEV_INFO = Self::DEV_CLASS.bits()
            | Self::DEV_SUBCLASS.bits()
            | Self::DEV_PROTOCOL.bits();
        const INT_INFO = Self::INT_CLASS.bits()
            | Self::INT_SUBCLASS.bits()
            | Self::INT_PROTOCOL.bits();
    }
}

/// One entry of a driver's ID table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceId {
    pub match_flags: MatchFlags,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device_lo: u16,
    pub bcd_device_hi: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_number: u8,
}

impl UsbDeviceId {
    /// Empty entry closing an ID table
    pub const TERMINATOR: UsbDeviceId = UsbDeviceId {
        match_flags: MatchFlags::empty(),
        id_vendor: 0,
        id_product: 0,
        bcd_device_lo: 0,
        bcd_device_hi: 0,
        device_class: 0,
        device_subclass: 0,
        device_protocol: 0,
        interface_class: 0,
        interface_subclass: 0,
        interface_protocol: 0,
        interface_number: 0,
    };

    /// Match a specific vendor/product pair
    pub const fn device(vendor_id: u16, product_id: u16) -> Self {
        UsbDeviceId {
            match_flags: MatchFlags::DEVICE,
            id_vendor: vendor_id,
            id_product: product_id,
            ..Self::TERMINATOR
        }
    }

    /// Match a vendor/product pair within an inclusive bcdDevice range
    pub const fn device_ver(vendor_id: u16, product_id: u16, lo: u16, hi: u16) -> Self {
        UsbDeviceId {
            match_flags: MatchFlags::DEVICE.union(MatchFlags::DEV_RANGE),
            id_vendor: vendor_id,
            id_product: product_id,
            bcd_device_lo: lo,
            bcd_device_hi: hi,
            ..Self::TERMINATOR
        }
    }

    /// Match any interface with the given class triple
    pub const fn interface_info(class: u8, subclass: u8, protocol: u8) -> Self {
        UsbDeviceId {
            match_flags: MatchFlags::INT_INFO,
            interface_class: class,
            interface_subclass: subclass,
            interface_protocol: protocol,
            ..Self::TERMINATOR
        }
    }

    /// Vendor/product pair carried by this entry
    pub const fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.id_vendor, self.id_product)
    }

    /// True for the empty entry that ends a table
    pub fn is_terminator(&self) -> bool {
        *self == Self::TERMINATOR
    }

    /// Check this entry against one interface of a device
    pub fn matches(&self, device: &UsbDeviceRecord, interface: &InterfaceInfo) -> bool {
        self.matches_device(device) && self.matches_interface(device, interface)
    }

    fn matches_device(&self, device: &UsbDeviceRecord) -> bool {
        let flags = self.match_flags;

        if flags.contains(MatchFlags::VENDOR) && self.id_vendor != device.identity.vendor_id {
            return false;
        }
        if flags.contains(MatchFlags::PRODUCT) && self.id_product != device.identity.product_id {
            return false;
        }
        if flags.contains(MatchFlags::DEV_LO) && self.bcd_device_lo > device.bcd_device {
            return false;
        }
        if flags.contains(MatchFlags::DEV_HI) && self.bcd_device_hi < device.bcd_device {
            return false;
        }
        if flags.contains(MatchFlags::DEV_CLASS) && self.device_class != device.class {
            return false;
        }
        if flags.contains(MatchFlags::DEV_SUBCLASS) && self.device_subclass != device.subclass {
            return false;
        }
        if flags.contains(MatchFlags::DEV_PROTOCOL) && self.device_protocol != device.protocol {
            return false;
        }

        true
    }

    fn matches_interface(&self, device: &UsbDeviceRecord, interface: &InterfaceInfo) -> bool {
        let flags = self.match_flags;

        // Vendor-specific devices only match on interface info when the
        // vendor is pinned too.
        if device.class == USB_CLASS_VENDOR_SPEC
            && !flags.contains(MatchFlags::VENDOR)
            && flags.intersects(MatchFlags::INT_INFO.union(MatchFlags::INT_NUMBER))
        {
            return false;
        }

        if flags.contains(MatchFlags::INT_CLASS) && self.interface_class != interface.class {
            return false;
        }
        if flags.contains(MatchFlags::INT_SUBCLASS) && self.interface_subclass != interface.subclass
        {
            return false;
        }
        if flags.contains(MatchFlags::INT_PROTOCOL) && self.interface_protocol != interface.protocol
        {
            return false;
        }
        if flags.contains(MatchFlags::INT_NUMBER) && self.interface_number != interface.number {
            return false;
        }

        true
    }

    /// Kernel-style module alias for this entry
    ///
    /// Fields that do not take part in matching are rendered as `*`, e.g.
    /// `usb:v03F0p5307d*dc*dsc*dp*ic*isc*ip*in*`.
    pub fn modalias(&self) -> String {
        let flags = self.match_flags;
        let hex16 = |flag: MatchFlags, value: u16| {
            if flags.contains(flag) {
                format!("{:04X}", value)
            } else {
                "*".to_string()
            }
        };
        let hex8 = |flag: MatchFlags, value: u8| {
            if flags.contains(flag) {
                format!("{:02X}", value)
            } else {
                "*".to_string()
            }
        };

        let exact_bcd = self.bcd_device_lo == self.bcd_device_hi;
        let bcd = if flags.contains(MatchFlags::DEV_RANGE) && exact_bcd {
            format!("{:04X}", self.bcd_device_lo)
        } else {
            "*".to_string()
        };

        format!(
            "usb:v{}p{}d{}dc{}dsc{}dp{}ic{}isc{}ip{}in{}",
            hex16(MatchFlags::VENDOR, self.id_vendor),
            hex16(MatchFlags::PRODUCT, self.id_product),
            bcd,
            hex8(MatchFlags::DEV_CLASS, self.device_class),
            hex8(MatchFlags::DEV_SUBCLASS, self.device_subclass),
            hex8(MatchFlags::DEV_PROTOCOL, self.device_protocol),
            hex8(MatchFlags::INT_CLASS, self.interface_class),
            hex8(MatchFlags::INT_SUBCLASS, self.interface_subclass),
            hex8(MatchFlags::INT_PROTOCOL, self.interface_protocol),
            hex8(MatchFlags::INT_NUMBER, self.interface_number),
        )
    }
}

/// Entries of an ID table before its terminator
pub fn table_entries(table: &[UsbDeviceId]) -> impl Iterator<Item = &UsbDeviceId> {
    table.iter().take_while(|id| !id.is_terminator())
}

/// Whether the table is closed by a terminator entry
pub fn is_terminated(table: &[UsbDeviceId]) -> bool {
    table.iter().any(UsbDeviceId::is_terminator)
}

/// First table entry matching the given interface
pub fn match_table<'a>(
    table: &'a [UsbDeviceId],
    device: &UsbDeviceRecord,
    interface: &InterfaceInfo,
) -> Option<&'a UsbDeviceId> {
    table_entries(table).find(|id| id.matches(device, interface))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_device;

    static TABLE: [UsbDeviceId; 3] = [
        UsbDeviceId::device(0x03f0, 0x5307),
        UsbDeviceId::device(0x0951, 0x1607),
        UsbDeviceId::TERMINATOR,
    ];

    #[test]
    fn test_identity_display() {
        assert_eq!(DeviceIdentity::new(0x3f0, 0x5307).to_string(), "03F0:5307");
        assert_eq!(DeviceIdentity::new(0xabcd, 0x1).to_string(), "ABCD:0001");
    }

    #[test]
    fn test_device_entry_flags() {
        let id = UsbDeviceId::device(0x0951, 0x1607);
        assert_eq!(id.match_flags, MatchFlags::DEVICE);
        assert_eq!(id.match_flags.bits(), 0x0003);
        assert!(!id.is_terminator());
        assert!(UsbDeviceId::TERMINATOR.is_terminator());
    }

    #[test]
    fn test_table_entries_stop_at_terminator() {
        let table = [
            UsbDeviceId::device(1, 2),
            UsbDeviceId::TERMINATOR,
            UsbDeviceId::device(3, 4),
        ];
        assert_eq!(table_entries(&table).count(), 1);
        assert!(is_terminated(&table));
        assert!(!is_terminated(&table[..1]));
    }

    #[test]
    fn test_match_table_vendor_product() {
        let dev = mock_device(1, 4, 0x0951, 0x1607);
        let hit = match_table(&TABLE, &dev, &dev.interfaces[0]).unwrap();
        assert_eq!(hit.identity(), DeviceIdentity::new(0x0951, 0x1607));

        let other = mock_device(1, 5, 0x0951, 0x1608);
        assert!(match_table(&TABLE, &other, &other.interfaces[0]).is_none());
    }

    #[test]
    fn test_bcd_device_range() {
        let id = UsbDeviceId::device_ver(0x1234, 0x5678, 0x0100, 0x0200);
        let mut dev = mock_device(1, 2, 0x1234, 0x5678);

        dev.bcd_device = 0x0150;
        assert!(id.matches(&dev, &dev.interfaces[0]));
        dev.bcd_device = 0x0200;
        assert!(id.matches(&dev, &dev.interfaces[0]));
        dev.bcd_device = 0x0201;
        assert!(!id.matches(&dev, &dev.interfaces[0]));
    }

    #[test]
    fn test_interface_class_match() {
        // Mass storage, SCSI transparent, bulk-only
        let id = UsbDeviceId::interface_info(0x08, 0x06, 0x50);
        let dev = mock_device(1, 2, 0x1111, 0x2222);
        assert!(id.matches(&dev, &dev.interfaces[0]));

        let mut hid = mock_device(1, 3, 0x1111, 0x2222);
        hid.interfaces[0].class = 0x03;
        assert!(!id.matches(&hid, &hid.interfaces[0]));
    }

    #[test]
    fn test_vendor_specific_device_needs_vendor_for_interface_match() {
        let id = UsbDeviceId::interface_info(0x08, 0x06, 0x50);
        let mut dev = mock_device(1, 2, 0x1111, 0x2222);
        dev.class = USB_CLASS_VENDOR_SPEC;
        assert!(!id.matches(&dev, &dev.interfaces[0]));

        let pinned = UsbDeviceId {
            match_flags: id.match_flags | MatchFlags::VENDOR,
            id_vendor: 0x1111,
            ..id
        };
        assert!(pinned.matches(&dev, &dev.interfaces[0]));
    }

    #[test]
    fn test_modalias() {
        assert_eq!(
            TABLE[0].modalias(),
            "usb:v03F0p5307d*dc*dsc*dp*ic*isc*ip*in*"
        );
        assert_eq!(
            UsbDeviceId::interface_info(0x08, 0x06, 0x50).modalias(),
            "usb:v*p*d*dc*dsc*dp*ic08isc06ip50in*"
        );
        assert_eq!(
            UsbDeviceId::device_ver(0x1, 0x2, 0x0110, 0x0110).modalias(),
            "usb:v0001p0002d0110dc*dsc*dp*ic*isc*ip*in*"
        );
    }
}
