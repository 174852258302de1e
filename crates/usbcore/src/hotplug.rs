//! libusb hot-plug callback
//!
//! libusb calls back from inside `handle_events` on the core thread. The
//! callback only reads descriptors and queues an event; the core thread
//! dispatches it once `handle_events` returns.

use crate::channel::HotplugEvent;
use crate::device::UsbDeviceRecord;
use async_channel::Sender;
use rusb::{Device, Hotplug, UsbContext};
use tracing::{debug, error, warn};

/// Hot-plug callback handler
pub struct HotplugCallback {
    event_sender: Sender<HotplugEvent>,
}

impl HotplugCallback {
    pub fn new(event_sender: Sender<HotplugEvent>) -> Self {
        Self { event_sender }
    }

    fn send(&self, event: HotplugEvent) {
        if let Err(e) = self.event_sender.send_blocking(event) {
            error!("Failed to queue hot-plug event: {}", e);
        }
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        match UsbDeviceRecord::from_device(&device) {
            Ok(record) => self.send(HotplugEvent::Arrived(record)),
            Err(e) => warn!(
                "Ignoring device bus={} addr={}: cannot read descriptors: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }

    fn device_left(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        self.send(HotplugEvent::Left {
            bus: device.bus_number(),
            address: device.address(),
        });
    }
}
