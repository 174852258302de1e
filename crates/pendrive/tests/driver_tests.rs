//! Integration tests for the pendrive driver on the USB core
//!
//! Tests the driver's observable behaviour through the core, including:
//! - Plug-in and removal log lines for both supported devices
//! - Devices outside the ID table never reaching the driver
//! - Module init/teardown state transitions and status codes
//! - Device listings reporting the interfaces the driver claimed

use pendrive::{DRIVER_NAME, DriverModule, ModuleState, module_init_status};
use usbcore::test_utils::{LogCapture, mock_device};
use usbcore::{SharedCore, UsbCore, lock_core};

fn loaded_module() -> (SharedCore, DriverModule) {
    let core = UsbCore::shared();
    let mut module = DriverModule::new(core.clone());
    module.module_init().unwrap();
    (core, module)
}

mod attach {
    use super::*;

    #[test]
    fn test_hp_pendrive_plugged_in() {
        let (core, _module) = loaded_module();
        let logs = LogCapture::new();

        let bound =
            logs.capture(|| lock_core(&core).device_arrived(mock_device(1, 4, 0x03f0, 0x5307)));

        assert_eq!(bound, 1);
        assert!(logs.contains("Pendrive (03F0:5307) plugged in"));
        assert_eq!(lock_core(&core).bound_driver(1, 4, 0), Some(DRIVER_NAME));
    }

    #[test]
    fn test_kingston_pendrive_plugged_in() {
        let (core, _module) = loaded_module();
        let logs = LogCapture::new();

        let bound =
            logs.capture(|| lock_core(&core).device_arrived(mock_device(3, 12, 0x0951, 0x1607)));

        assert_eq!(bound, 1);
        assert!(logs.contains("Pendrive (0951:1607) plugged in"));
    }

    #[test]
    fn test_unsupported_device_not_offered() {
        let (core, _module) = loaded_module();
        let logs = LogCapture::new();

        let bound = logs.capture(|| {
            let mut core = lock_core(&core);
            core.device_arrived(mock_device(1, 5, 0x03f0, 0x1607))
                + core.device_arrived(mock_device(1, 6, 0x0951, 0x5307))
                + core.device_arrived(mock_device(1, 7, 0x046d, 0xc52b))
        });

        assert_eq!(bound, 0);
        assert_eq!(logs.count("plugged in"), 0);
        assert!(lock_core(&core).bindings().is_empty());
    }

    #[test]
    fn test_device_present_before_init_is_claimed() {
        let core = UsbCore::shared();
        lock_core(&core).device_arrived(mock_device(1, 4, 0x0951, 0x1607));

        let logs = LogCapture::new();
        let mut module = DriverModule::new(core.clone());
        logs.capture(|| module.module_init()).unwrap();

        assert!(logs.contains("Pendrive (0951:1607) plugged in"));
        assert_eq!(lock_core(&core).bound_driver(1, 4, 0), Some(DRIVER_NAME));
    }
}

mod detach {
    use super::*;

    #[test]
    fn test_removal_logged() {
        let (core, _module) = loaded_module();
        lock_core(&core).device_arrived(mock_device(1, 4, 0x03f0, 0x5307));

        let logs = LogCapture::new();
        logs.capture(|| lock_core(&core).device_left(1, 4));

        assert_eq!(logs.count("Pendrive removed"), 1);
        assert!(lock_core(&core).bindings().is_empty());
    }

    #[test]
    fn test_removal_of_unclaimed_device_is_silent() {
        let (core, _module) = loaded_module();
        lock_core(&core).device_arrived(mock_device(1, 4, 0x1234, 0x5678));

        let logs = LogCapture::new();
        logs.capture(|| lock_core(&core).device_left(1, 4));

        assert_eq!(logs.count("Pendrive removed"), 0);
    }

    #[test]
    fn test_teardown_detaches_claimed_devices() {
        let (core, mut module) = loaded_module();
        {
            let mut core = lock_core(&core);
            core.device_arrived(mock_device(1, 4, 0x03f0, 0x5307));
            core.device_arrived(mock_device(1, 5, 0x0951, 0x1607));
        }

        let logs = LogCapture::new();
        logs.capture(|| module.module_teardown());

        assert_eq!(logs.count("Pendrive removed"), 2);
        assert_eq!(module.state(), ModuleState::Unregistered);
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_init_registers() {
        let core = UsbCore::shared();
        let mut module = DriverModule::new(core.clone());
        assert_eq!(module.state(), ModuleState::Unregistered);

        let result = module.module_init();

        assert_eq!(module_init_status(&result), 0);
        assert_eq!(module.state(), ModuleState::Registered);
        assert!(lock_core(&core).is_registered(DRIVER_NAME));
    }

    #[test]
    fn test_teardown_unregisters() {
        let (core, mut module) = loaded_module();

        module.module_teardown();

        assert_eq!(module.state(), ModuleState::Unregistered);
        assert!(!lock_core(&core).is_registered(DRIVER_NAME));
    }

    #[test]
    fn test_second_module_rejected_with_ebusy() {
        let (core, first) = loaded_module();
        let mut second = DriverModule::new(core.clone());

        let result = second.module_init();

        assert_eq!(module_init_status(&result), -16);
        assert_eq!(second.state(), ModuleState::Unregistered);
        assert_eq!(first.state(), ModuleState::Registered);

        // Dropping the rejected module must not unregister the first one
        drop(second);
        assert!(lock_core(&core).is_registered(DRIVER_NAME));
    }

    #[test]
    fn test_teardown_without_init_is_noop() {
        let core = UsbCore::shared();
        let mut module = DriverModule::new(core.clone());

        module.module_teardown();

        assert_eq!(module.state(), ModuleState::Unregistered);
        assert!(lock_core(&core).drivers().is_empty());
    }

    #[test]
    fn test_reload_after_teardown() {
        let (core, mut module) = loaded_module();
        lock_core(&core).device_arrived(mock_device(1, 4, 0x03f0, 0x5307));

        module.module_teardown();
        assert_eq!(lock_core(&core).bound_driver(1, 4, 0), None);

        module.module_init().unwrap();
        assert_eq!(lock_core(&core).bound_driver(1, 4, 0), Some(DRIVER_NAME));
    }
}

mod listing {
    use super::*;
    use usbcore::HotplugEvent;
    use usbcore::worker::{handle_event, list_devices};

    #[test]
    fn test_listing_shows_pendrive_bindings() {
        let (core, _module) = loaded_module();
        {
            let mut core = lock_core(&core);
            handle_event(
                &mut core,
                HotplugEvent::Arrived(mock_device(1, 4, 0x03f0, 0x5307)),
            );
            handle_event(
                &mut core,
                HotplugEvent::Arrived(mock_device(1, 5, 0x046d, 0xc52b)),
            );
        }

        let devices = list_devices(&lock_core(&core));

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].bindings, vec![(0, DRIVER_NAME)]);
        assert!(devices[1].bindings.is_empty());
    }

    #[test]
    fn test_listing_without_module_has_no_bindings() {
        let core = UsbCore::shared();
        lock_core(&core).device_arrived(mock_device(1, 4, 0x03f0, 0x5307));

        let devices = list_devices(&lock_core(&core));
        assert!(devices[0].bindings.is_empty());

        let mut module = DriverModule::new(core.clone());
        module.module_init().unwrap();

        let devices = list_devices(&lock_core(&core));
        assert_eq!(devices[0].bindings, vec![(0, DRIVER_NAME)]);
    }
}
