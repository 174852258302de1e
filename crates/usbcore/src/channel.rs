//! Channels between the async runtime, the hot-plug callback and the core
//! thread

use crate::device::UsbDeviceRecord;
use async_channel::{Receiver, Sender, bounded, unbounded};

/// Commands from the async runtime to the core thread
#[derive(Debug)]
pub enum CoreCommand {
    /// List connected devices and their bindings
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<DeviceSummary>>,
    },

    /// Stop the core thread
    Shutdown,
}

/// Hot-plug notifications from libusb
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    /// Device connected, descriptors already read
    Arrived(UsbDeviceRecord),

    /// Device disconnected
    Left { bus: u8, address: u8 },
}

/// A connected device and the drivers bound to its interfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub device: UsbDeviceRecord,
    /// (interface number, driver name)
    pub bindings: Vec<(u8, &'static str)>,
}

/// Handle for the async runtime
#[derive(Clone)]
pub struct CoreBridge {
    cmd_tx: Sender<CoreCommand>,
}

impl CoreBridge {
    /// Send a command to the core thread
    pub async fn send_command(&self, cmd: CoreCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask the core thread for its current device list
    pub async fn list_devices(&self) -> crate::Result<Vec<DeviceSummary>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(CoreCommand::ListDevices { response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask the core thread to stop
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(CoreCommand::Shutdown).await
    }
}

/// Handle for the core thread (blocking)
pub struct CoreWorker {
    pub(crate) cmd_rx: Receiver<CoreCommand>,
    pub(crate) event_tx: Sender<HotplugEvent>,
    pub(crate) event_rx: Receiver<HotplugEvent>,
}

impl CoreWorker {
    /// Try to receive a command without blocking
    ///
    /// A closed channel reads as `Shutdown`, since nobody is left to stop
    /// the thread otherwise.
    pub fn try_recv_command(&self) -> Option<CoreCommand> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(async_channel::TryRecvError::Empty) => None,
            Err(async_channel::TryRecvError::Closed) => Some(CoreCommand::Shutdown),
        }
    }

    /// Sender handed to the hot-plug callback
    pub fn event_sender(&self) -> Sender<HotplugEvent> {
        self.event_tx.clone()
    }

    /// Take the next queued hot-plug event, if any
    pub fn try_recv_event(&self) -> Option<HotplugEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Create the channels between the async runtime and the core thread
///
/// Returns (CoreBridge for Tokio, CoreWorker for the core thread). The
/// hot-plug queue is unbounded: its producer runs on the core thread itself,
/// inside `handle_events`, and must never wait on the consumer.
pub fn create_core_bridge() -> (CoreBridge, CoreWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = unbounded();

    (
        CoreBridge { cmd_tx },
        CoreWorker {
            cmd_rx,
            event_tx,
            event_rx,
        },
    )
}
