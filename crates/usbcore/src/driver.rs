//! Driver interface
//!
//! A USB interface driver implements [`UsbDriver`] and hands a
//! [`DriverDescriptor`] to [`UsbCore::register`](crate::UsbCore::register).
//! The core decides when the callbacks run; drivers never call them
//! themselves.

use crate::device::UsbInterface;
use crate::error::Errno;
use crate::id::{UsbDeviceId, table_entries};
use std::fmt;
use std::sync::Arc;

/// Power-management transition requested by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmMessage {
    /// System sleep. The driver's result is ignored.
    Suspend,
    /// Runtime autosuspend. A failure vetoes the suspend.
    AutoSuspend,
}

impl PmMessage {
    pub fn is_system_sleep(self) -> bool {
        matches!(self, PmMessage::Suspend)
    }
}

/// Callbacks the USB core invokes on a registered driver
///
/// `probe` and `disconnect` are required. The power-management and reset
/// hooks default to doing nothing and reporting success.
///
/// Callbacks run with the core lock held and must not call back into the
/// core.
pub trait UsbDriver: Send + Sync {
    /// Offered an interface whose device matched `id`
    ///
    /// Return `Ok(())` to claim it, `Err(Errno::ENODEV)` to decline.
    fn probe(&self, interface: &UsbInterface, id: &UsbDeviceId) -> Result<(), Errno>;

    /// The interface is gone, or the driver is being unregistered
    fn disconnect(&self, interface: &UsbInterface);

    fn suspend(&self, _interface: &UsbInterface, _message: PmMessage) -> Result<(), Errno> {
        Ok(())
    }

    fn resume(&self, _interface: &UsbInterface) -> Result<(), Errno> {
        Ok(())
    }

    /// Resumed, but the device was reset while suspended
    fn reset_resume(&self, _interface: &UsbInterface) -> Result<(), Errno> {
        Ok(())
    }

    fn pre_reset(&self, _interface: &UsbInterface) -> Result<(), Errno> {
        Ok(())
    }

    fn post_reset(&self, _interface: &UsbInterface) -> Result<(), Errno> {
        Ok(())
    }
}

/// What a driver hands to the core on registration
#[derive(Clone)]
pub struct DriverDescriptor {
    /// Unique driver name
    pub name: &'static str,
    /// ID table closed by [`UsbDeviceId::TERMINATOR`]
    pub id_table: &'static [UsbDeviceId],
    pub driver: Arc<dyn UsbDriver>,
}

impl DriverDescriptor {
    pub fn new(
        name: &'static str,
        id_table: &'static [UsbDeviceId],
        driver: Arc<dyn UsbDriver>,
    ) -> Self {
        Self {
            name,
            id_table,
            driver,
        }
    }

    /// Table entries the core will match against
    pub fn entries(&self) -> impl Iterator<Item = &UsbDeviceId> {
        table_entries(self.id_table)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("id_table", &self.entries().count())
            .finish_non_exhaustive()
    }
}
