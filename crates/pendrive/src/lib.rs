//! pendrive
//!
//! A USB interface driver that claims two flash-drive models and logs when
//! they are plugged in and removed. The host side (device enumeration, ID
//! matching, callback dispatch) is the `usbcore` crate.

pub mod config;
pub mod driver;
pub mod module;

pub use config::DriverConfig;
pub use driver::{DRIVER_NAME, PENDRIVE_ID_TABLE, PendriveDriver};
pub use module::{DriverModule, MODULE_INFO, ModuleState, module_init_status};
