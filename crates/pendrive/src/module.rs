//! Module lifecycle
//!
//! [`DriverModule`] is the one object that holds the driver's registration
//! with the USB core. It is created at startup, registered by
//! [`DriverModule::module_init`] and unregistered by
//! [`DriverModule::module_teardown`] or when dropped.

use crate::driver::PendriveDriver;
use tracing::{debug, info, warn};
use usbcore::{DriverDescriptor, RegistrationError, SharedCore, lock_core};

/// Static module metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub license: &'static str,
    pub author: &'static str,
    pub description: &'static str,
}

pub const MODULE_INFO: ModuleInfo = ModuleInfo {
    name: crate::driver::DRIVER_NAME,
    license: "GPL",
    author: "pendrive contributors",
    description: "Logs arrival and removal of supported USB flash drives",
};

/// Registration state of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unregistered,
    Registered,
}

/// Owner of the driver's registration
pub struct DriverModule {
    core: SharedCore,
    descriptor: DriverDescriptor,
    state: ModuleState,
}

impl DriverModule {
    /// Module for the pendrive driver
    pub fn new(core: SharedCore) -> Self {
        Self::with_descriptor(core, PendriveDriver::descriptor())
    }

    pub fn with_descriptor(core: SharedCore, descriptor: DriverDescriptor) -> Self {
        Self {
            core,
            descriptor,
            state: ModuleState::Unregistered,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Register the driver with the USB core
    ///
    /// The core's refusal is returned unchanged and leaves the module
    /// unregistered. There is no retry.
    pub fn module_init(&mut self) -> Result<(), RegistrationError> {
        info!("Driver for USB device {} loading", self.descriptor.name);
        debug!("Registering USB driver {}", self.descriptor.name);

        lock_core(&self.core).register(self.descriptor.clone())?;

        self.state = ModuleState::Registered;
        info!("Driver {} registered", self.descriptor.name);
        Ok(())
    }

    /// Unregister the driver, disconnecting every interface it holds
    pub fn module_teardown(&mut self) {
        if self.state != ModuleState::Registered {
            warn!(
                "Teardown of driver {} requested while not registered",
                self.descriptor.name
            );
            return;
        }

        info!("Unregistering USB driver {}", self.descriptor.name);
        lock_core(&self.core).deregister(self.descriptor.name);
        self.state = ModuleState::Unregistered;
        info!("Unregistration of {} complete", self.descriptor.name);
    }
}

impl Drop for DriverModule {
    fn drop(&mut self) {
        if self.state == ModuleState::Registered {
            self.module_teardown();
        }
    }
}

/// Status the module loader sees for an init result: 0 or a negative errno
pub fn module_init_status(result: &Result<(), RegistrationError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
