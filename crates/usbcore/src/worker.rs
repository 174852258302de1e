//! USB core thread
//!
//! Dedicated thread that owns the libusb context and hot-plug registration.
//! It runs `handle_events` with a timeout, feeds queued hot-plug events into
//! the shared [`UsbCore`] and answers commands from the async runtime.

use crate::channel::{CoreCommand, CoreWorker, DeviceSummary, HotplugEvent};
use crate::hotplug::HotplugCallback;
use crate::registry::{SharedCore, UsbCore, lock_core};
use rusb::{Context, HotplugBuilder, Registration, UsbContext};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Settings for the core thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSettings {
    /// Announce devices already connected when the thread starts
    pub enumerate_existing: bool,
    /// Upper bound on a single `handle_events` wait
    pub event_timeout: Duration,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            enumerate_existing: true,
            event_timeout: Duration::from_millis(100),
        }
    }
}

/// The core thread's state
pub struct UsbCoreThread {
    context: Context,
    _hotplug_registration: Registration<Context>,
    core: SharedCore,
    worker: CoreWorker,
    settings: CoreSettings,
}

impl UsbCoreThread {
    /// Create the libusb context and register for hot-plug notifications
    ///
    /// With `enumerate_existing`, libusb announces connected devices from
    /// inside this call; they are queued and dispatched on the first loop
    /// iteration.
    pub fn new(
        worker: CoreWorker,
        core: SharedCore,
        settings: CoreSettings,
    ) -> crate::Result<Self> {
        if !rusb::has_hotplug() {
            return Err(crate::Error::HotplugUnsupported);
        }

        let context = Context::new()?;
        let callback = HotplugCallback::new(worker.event_sender());

        let registration = HotplugBuilder::new()
            .enumerate(settings.enumerate_existing)
            .register(&context, Box::new(callback))?;

        debug!(
            "Hot-plug callbacks registered (enumerate_existing={})",
            settings.enumerate_existing
        );

        Ok(Self {
            context,
            _hotplug_registration: registration,
            core,
            worker,
            settings,
        })
    }

    /// Run until `Shutdown` is received or the bridge is dropped
    pub fn run(self) -> crate::Result<()> {
        info!("USB core thread started");

        loop {
            // Events first, so commands see every device announced so far
            self.drain_events();

            match self.worker.try_recv_command() {
                Some(CoreCommand::Shutdown) => {
                    info!("USB core thread shutting down");
                    break;
                }
                Some(CoreCommand::ListDevices { response }) => {
                    let devices = list_devices(&lock_core(&self.core));
                    debug!("Listing {} devices", devices.len());
                    let _ = response.send(devices);
                }
                None => {}
            }

            match self.context.handle_events(Some(self.settings.event_timeout)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(self.settings.event_timeout);
                }
            }
        }

        info!("USB core thread stopped");
        Ok(())
    }

    fn drain_events(&self) {
        while let Some(event) = self.worker.try_recv_event() {
            handle_event(&mut lock_core(&self.core), event);
        }
    }
}

/// Apply one hot-plug event, containing panics from driver callbacks
///
/// A panicking driver must not take the core thread down with it. Returns
/// false when the event's dispatch panicked.
pub fn handle_event(core: &mut UsbCore, event: HotplugEvent) -> bool {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatch_event(core, event)
    }));

    if let Err(e) = result {
        error!("Panic in hot-plug event handler: {:?}", e);
        return false;
    }
    true
}

/// Apply one hot-plug event to the core
pub fn dispatch_event(core: &mut UsbCore, event: HotplugEvent) {
    match event {
        HotplugEvent::Arrived(record) => {
            let bound = core.device_arrived(record);
            debug!("{} interface(s) claimed", bound);
        }
        HotplugEvent::Left { bus, address } => {
            core.device_left(bus, address);
        }
    }
}

/// Snapshot of connected devices with their bindings
pub fn list_devices(core: &UsbCore) -> Vec<DeviceSummary> {
    core.devices()
        .map(|device| DeviceSummary {
            device: device.clone(),
            bindings: device
                .interfaces
                .iter()
                .filter_map(|interface| {
                    core.bound_driver(device.bus, device.address, interface.number)
                        .map(|driver| (interface.number, driver))
                })
                .collect(),
        })
        .collect()
}

/// Spawn the USB core thread
///
/// Returns once libusb is initialized, so a missing USB stack is reported
/// here rather than from the join handle.
pub fn spawn_core_thread(
    worker: CoreWorker,
    core: SharedCore,
    settings: CoreSettings,
) -> crate::Result<JoinHandle<crate::Result<()>>> {
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);

    let handle = std::thread::Builder::new()
        .name("usbcore".to_string())
        .spawn(move || {
            let thread = match UsbCoreThread::new(worker, core, settings) {
                Ok(thread) => {
                    let _ = ready_tx.send(Ok(()));
                    thread
                }
                Err(e) => {
                    error!("USB core initialization failed: {}", e);
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
            };
            thread.run()
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(crate::Error::Channel(
            "USB core thread exited during startup".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverDescriptor;
    use crate::id::UsbDeviceId;
    use crate::test_utils::{
        PanickingDriver, RecordingDriver, interface, mock_device, mock_device_with_interfaces,
    };
    use std::sync::Arc;

    static TABLE: [UsbDeviceId; 2] = [
        UsbDeviceId::device(0x03f0, 0x5307),
        UsbDeviceId::TERMINATOR,
    ];

    #[test]
    fn test_dispatch_event_binds_and_unbinds() {
        let driver = Arc::new(RecordingDriver::new());
        let mut core = UsbCore::new();
        core.register(DriverDescriptor::new("rec", &TABLE, driver.clone()))
            .unwrap();

        dispatch_event(
            &mut core,
            HotplugEvent::Arrived(mock_device(1, 3, 0x03f0, 0x5307)),
        );
        assert_eq!(core.bound_driver(1, 3, 0), Some("rec"));
        assert_eq!(driver.probes().len(), 1);

        dispatch_event(&mut core, HotplugEvent::Left { bus: 1, address: 3 });
        assert_eq!(core.bound_driver(1, 3, 0), None);
        assert_eq!(driver.disconnects().len(), 1);
    }

    #[test]
    fn test_panicking_driver_does_not_escape_event_handler() {
        let mut core = UsbCore::new();
        let driver = Arc::new(PanickingDriver::on_interface(1));
        core.register(DriverDescriptor::new("panicky", &TABLE, driver.clone()))
            .unwrap();

        let record = mock_device_with_interfaces(
            1,
            2,
            0x03f0,
            0x5307,
            &[interface(0, 0x08, 0x06, 0x50), interface(1, 0x08, 0x06, 0x50)],
        );
        assert!(!handle_event(&mut core, HotplugEvent::Arrived(record)));

        // Interface 0 stays bound to a device the core still knows about
        assert_eq!(core.devices().count(), 1);
        assert_eq!(core.bound_driver(1, 2, 0), Some("panicky"));
        assert_eq!(core.bindings().len(), 1);

        assert!(handle_event(&mut core, HotplugEvent::Left { bus: 1, address: 2 }));
        assert_eq!(driver.disconnects(), 1);
        assert_eq!(core.bound_driver(1, 2, 0), None);
        assert_eq!(core.devices().count(), 0);
    }

    #[test]
    fn test_list_devices_reports_bindings() {
        let driver = Arc::new(RecordingDriver::new());
        let mut core = UsbCore::new();
        core.register(DriverDescriptor::new("rec", &TABLE, driver))
            .unwrap();
        core.device_arrived(mock_device(1, 3, 0x03f0, 0x5307));
        core.device_arrived(mock_device(1, 4, 0x1234, 0x0001));

        let devices = list_devices(&core);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].bindings, vec![(0, "rec")]);
        assert!(devices[1].bindings.is_empty());
    }

    #[test]
    fn test_core_thread_creation() {
        let (_bridge, worker) = crate::channel::create_core_bridge();

        // May fail without USB permissions or hot-plug support
        match UsbCoreThread::new(worker, UsbCore::shared(), CoreSettings::default()) {
            Ok(_) => {}
            Err(e) => eprintln!(
                "USB core thread creation failed (expected without USB): {}",
                e
            ),
        }
    }
}
