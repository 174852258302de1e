//! USB core driver registry
//!
//! Tracks connected devices and registered interface drivers, matches one
//! against the other and invokes driver callbacks. Hot-plug events reach it
//! from the core thread; drivers reach it through `register`/`deregister`.

use crate::device::{InterfaceInfo, UsbDeviceRecord, UsbInterface};
use crate::driver::{DriverDescriptor, PmMessage};
use crate::error::{Errno, RegistrationError};
use crate::id::{is_terminated, match_table};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// (bus, address, interface number)
type InterfaceKey = (u8, u8, u8);

/// Core shared between the event thread and driver modules
pub type SharedCore = Arc<Mutex<UsbCore>>;

/// Lock a shared core
///
/// A binding is only ever recorded for a device the core holds, and is
/// dropped before its driver is told, so a panic inside a driver callback
/// leaves the maps consistent and the guard is recovered.
pub fn lock_core(core: &SharedCore) -> MutexGuard<'_, UsbCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An interface currently claimed by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub interface: UsbInterface,
    pub driver: &'static str,
}

/// Registry of devices, drivers and the bindings between them
#[derive(Default)]
pub struct UsbCore {
    /// Registered drivers, in registration order
    drivers: Vec<DriverDescriptor>,
    /// Connected devices by (bus, address)
    devices: BTreeMap<(u8, u8), UsbDeviceRecord>,
    /// Claimed interfaces -> driver name
    bindings: HashMap<InterfaceKey, &'static str>,
}

impl UsbCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a core wrapped for sharing with the event thread
    pub fn shared() -> SharedCore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Register an interface driver
    ///
    /// Interfaces of already-connected devices that no other driver holds
    /// are offered to the new driver before this returns.
    pub fn register(&mut self, descriptor: DriverDescriptor) -> Result<(), RegistrationError> {
        self.validate(&descriptor)?;

        let name = descriptor.name;
        self.drivers.push(descriptor.clone());
        info!("usbcore: registered new interface driver {}", name);

        let mut bound = 0;
        for device in self.devices.values() {
            for interface in &device.interfaces {
                let key = (device.bus, device.address, interface.number);
                if self.bindings.contains_key(&key) {
                    continue;
                }
                if try_probe(&descriptor, device, interface) {
                    self.bindings.insert(key, name);
                    bound += 1;
                }
            }
        }

        if bound > 0 {
            debug!("{}: claimed {} existing interface(s)", name, bound);
        }
        Ok(())
    }

    fn validate(&self, descriptor: &DriverDescriptor) -> Result<(), RegistrationError> {
        let name = descriptor.name;
        if name.is_empty() {
            return Err(RegistrationError::InvalidName);
        }
        if !is_terminated(descriptor.id_table) {
            return Err(RegistrationError::MissingTerminator {
                name: name.to_string(),
            });
        }
        if descriptor.entries().next().is_none() {
            return Err(RegistrationError::EmptyIdTable {
                name: name.to_string(),
            });
        }
        if self.is_registered(name) {
            return Err(RegistrationError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Unregister a driver, disconnecting every interface it holds
    ///
    /// Returns false when no driver of that name is registered.
    pub fn deregister(&mut self, name: &str) -> bool {
        let Some(index) = self.drivers.iter().position(|d| d.name == name) else {
            warn!("usbcore: no interface driver named {} to deregister", name);
            return false;
        };

        for device in self.devices.values() {
            for interface in device.interfaces.iter().rev() {
                let key = (device.bus, device.address, interface.number);
                if self.bindings.get(&key).is_some_and(|bound| *bound == name) {
                    disconnect_interface(&self.drivers, &mut self.bindings, device, interface);
                }
            }
        }

        self.drivers.remove(index);
        info!("usbcore: deregistered interface driver {}", name);
        true
    }

    /// Handle a newly connected device
    ///
    /// Returns the number of interfaces a driver claimed.
    pub fn device_arrived(&mut self, record: UsbDeviceRecord) -> usize {
        let (bus, address) = record.key();
        if self.devices.contains_key(&(bus, address)) {
            debug!(
                "Device at bus={} addr={} re-announced, treating as reconnect",
                bus, address
            );
            self.device_left(bus, address);
        }

        info!(
            "New USB device found, idVendor={:04x}, idProduct={:04x}, bus={}, addr={}",
            record.identity.vendor_id, record.identity.product_id, bus, address
        );

        // The record goes in before any probe, so every binding made below
        // always has its device.
        self.devices.insert((bus, address), record.clone());

        let mut bound = 0;
        for interface in &record.interfaces {
            if let Some(name) = self.probe_interface(&record, interface) {
                self.bindings.insert((bus, address, interface.number), name);
                bound += 1;
            }
        }
        bound
    }

    /// Offer an interface to each driver in registration order
    fn probe_interface(
        &self,
        device: &UsbDeviceRecord,
        interface: &InterfaceInfo,
    ) -> Option<&'static str> {
        for driver in &self.drivers {
            if try_probe(driver, device, interface) {
                return Some(driver.name);
            }
        }
        None
    }

    /// Handle a disconnected device
    pub fn device_left(&mut self, bus: u8, address: u8) -> Option<UsbDeviceRecord> {
        let Some(record) = self.devices.get(&(bus, address)).cloned() else {
            debug!("Unknown device left: bus={}, addr={}", bus, address);
            return None;
        };

        for interface in record.interfaces.iter().rev() {
            disconnect_interface(&self.drivers, &mut self.bindings, &record, interface);
        }
        self.devices.remove(&(bus, address));

        info!(
            "USB disconnect, bus={}, addr={} ({})",
            bus, address, record.identity
        );
        Some(record)
    }

    /// Suspend every bound interface of a device
    ///
    /// For system sleep driver failures are logged and ignored. For
    /// autosuspend the first failure resumes the interfaces already
    /// suspended and is returned.
    pub fn suspend(&self, bus: u8, address: u8, message: PmMessage) -> Result<(), Errno> {
        let device = self.devices.get(&(bus, address)).ok_or(Errno::ENODEV)?;

        let mut suspended: Vec<(&DriverDescriptor, UsbInterface)> = Vec::new();
        for interface in &device.interfaces {
            let Some(driver) = self.bound_descriptor((bus, address, interface.number)) else {
                continue;
            };
            let handle = device.interface(interface);

            match driver.driver.suspend(&handle, message) {
                Ok(()) => suspended.push((driver, handle)),
                Err(e) if message.is_system_sleep() => {
                    warn!("{}: suspend of {} failed, ignored: {}", driver.name, handle, e);
                }
                Err(e) => {
                    warn!("{}: suspend of {} failed: {}", driver.name, handle, e);
                    for (driver, handle) in suspended.iter().rev() {
                        if let Err(e) = driver.driver.resume(handle) {
                            warn!("{}: resume of {} failed: {}", driver.name, handle, e);
                        }
                    }
                    return Err(e);
                }
            }
        }

        debug!("Suspended device bus={} addr={} ({:?})", bus, address, message);
        Ok(())
    }

    /// Resume every bound interface of a device
    ///
    /// `reset` selects `reset_resume` for devices that lost their state
    /// while suspended.
    pub fn resume(&self, bus: u8, address: u8, reset: bool) -> Result<(), Errno> {
        let device = self.devices.get(&(bus, address)).ok_or(Errno::ENODEV)?;

        for interface in &device.interfaces {
            let Some(driver) = self.bound_descriptor((bus, address, interface.number)) else {
                continue;
            };
            let handle = device.interface(interface);
            let result = if reset {
                driver.driver.reset_resume(&handle)
            } else {
                driver.driver.resume(&handle)
            };
            if let Err(e) = result {
                warn!("{}: resume of {} failed: {}", driver.name, handle, e);
            }
        }

        debug!("Resumed device bus={} addr={}", bus, address);
        Ok(())
    }

    /// Reset a device, notifying its drivers before and after
    ///
    /// Interfaces whose driver fails either hook are unbound and probed
    /// again.
    pub fn reset_device(&mut self, bus: u8, address: u8) -> Result<(), Errno> {
        let device = self
            .devices
            .get(&(bus, address))
            .cloned()
            .ok_or(Errno::ENODEV)?;

        let mut failed: Vec<InterfaceInfo> = Vec::new();
        for interface in &device.interfaces {
            let Some(driver) = self.bound_descriptor((bus, address, interface.number)) else {
                continue;
            };
            let handle = device.interface(interface);
            if let Err(e) = driver.driver.pre_reset(&handle) {
                warn!("{}: pre_reset of {} failed: {}", driver.name, handle, e);
                failed.push(*interface);
            }
        }

        debug!("Resetting device bus={} addr={}", bus, address);

        for interface in &device.interfaces {
            if failed.contains(interface) {
                continue;
            }
            let Some(driver) = self.bound_descriptor((bus, address, interface.number)) else {
                continue;
            };
            let handle = device.interface(interface);
            if let Err(e) = driver.driver.post_reset(&handle) {
                warn!("{}: post_reset of {} failed: {}", driver.name, handle, e);
                failed.push(*interface);
            }
        }

        for interface in &failed {
            disconnect_interface(&self.drivers, &mut self.bindings, &device, interface);
            if let Some(name) = self.probe_interface(&device, interface) {
                self.bindings.insert((bus, address, interface.number), name);
            }
        }

        Ok(())
    }

    fn bound_descriptor(&self, key: InterfaceKey) -> Option<&DriverDescriptor> {
        let name = self.bindings.get(&key)?;
        self.drivers.iter().find(|d| d.name == *name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.drivers.iter().any(|d| d.name == name)
    }

    /// Names of registered drivers, in registration order
    pub fn drivers(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.name).collect()
    }

    /// Connected devices, ordered by bus and address
    pub fn devices(&self) -> impl Iterator<Item = &UsbDeviceRecord> {
        self.devices.values()
    }

    /// Driver holding the given interface, if any
    pub fn bound_driver(&self, bus: u8, address: u8, interface: u8) -> Option<&'static str> {
        self.bindings.get(&(bus, address, interface)).copied()
    }

    /// All claimed interfaces, ordered by bus, address and interface
    pub fn bindings(&self) -> Vec<Binding> {
        self.devices
            .values()
            .flat_map(|device| {
                device.interfaces.iter().filter_map(move |interface| {
                    let key = (device.bus, device.address, interface.number);
                    self.bindings.get(&key).map(|&driver| Binding {
                        interface: device.interface(interface),
                        driver,
                    })
                })
            })
            .collect()
    }
}

/// Probe one driver for one interface
///
/// Returns true when the driver claimed the interface.
fn try_probe(
    driver: &DriverDescriptor,
    device: &UsbDeviceRecord,
    interface: &InterfaceInfo,
) -> bool {
    let Some(id) = match_table(driver.id_table, device, interface) else {
        return false;
    };

    let handle = device.interface(interface);
    match driver.driver.probe(&handle, id) {
        Ok(()) => {
            debug!("{}: bound to interface {}", driver.name, handle);
            true
        }
        Err(Errno::ENODEV) => {
            debug!("{}: declined interface {}", driver.name, handle);
            false
        }
        Err(e) => {
            warn!("{}: probe of {} failed: {}", driver.name, handle, e);
            false
        }
    }
}

/// Drop a binding and tell its driver
fn disconnect_interface(
    drivers: &[DriverDescriptor],
    bindings: &mut HashMap<InterfaceKey, &'static str>,
    device: &UsbDeviceRecord,
    interface: &InterfaceInfo,
) {
    let Some(name) = bindings.remove(&(device.bus, device.address, interface.number)) else {
        return;
    };

    let handle = device.interface(interface);
    match drivers.iter().find(|d| d.name == name) {
        Some(driver) => {
            driver.driver.disconnect(&handle);
            debug!("{}: unbound from interface {}", name, handle);
        }
        None => warn!("{}: bound to {} but no longer registered", name, handle),
    }
}
