//! Error types for the USB core

use std::fmt;
use thiserror::Error;

/// Negative errno-style status code returned by driver callbacks
///
/// Drivers report failure the same way Linux USB drivers do: a negative
/// error number. `Errno::ENODEV` from `probe` means "not my device" and is
/// not logged as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EIO: Errno = Errno(-5);
    pub const ENOMEM: Errno = Errno(-12);
    pub const EBUSY: Errno = Errno(-16);
    pub const ENODEV: Errno = Errno(-19);
    pub const EINVAL: Errno = Errno(-22);
    pub const ENOTTY: Errno = Errno(-25);

    /// Build from a raw code, normalizing the sign to negative
    pub const fn new(code: i32) -> Self {
        if code > 0 { Errno(-code) } else { Errno(code) }
    }

    /// Raw (negative) error number
    pub const fn code(self) -> i32 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        match self {
            Errno::EIO => Some("EIO"),
            Errno::ENOMEM => Some("ENOMEM"),
            Errno::EBUSY => Some("EBUSY"),
            Errno::ENODEV => Some("ENODEV"),
            Errno::EINVAL => Some("EINVAL"),
            Errno::ENOTTY => Some("ENOTTY"),
            _ => None,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}

impl std::error::Error for Errno {}

/// Why the USB core refused a driver registration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("driver name must not be empty")]
    InvalidName,

    #[error("driver '{name}' has an ID table without a terminating entry")]
    MissingTerminator { name: String },

    #[error("driver '{name}' has an empty ID table")]
    EmptyIdTable { name: String },

    #[error("a driver named '{name}' is already registered")]
    DuplicateName { name: String },
}

impl RegistrationError {
    /// Errno the module loader sees for this failure
    pub fn errno(&self) -> Errno {
        match self {
            RegistrationError::InvalidName
            | RegistrationError::MissingTerminator { .. }
            | RegistrationError::EmptyIdTable { .. } => Errno::EINVAL,
            RegistrationError::DuplicateName { .. } => Errno::EBUSY,
        }
    }

    /// Negative status code, as returned from module init
    pub fn code(&self) -> i32 {
        self.errno().code()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Hot-plug notifications are not supported by this libusb build")]
    HotplugUnsupported,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
