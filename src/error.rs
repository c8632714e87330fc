//! Error handling primitives for the aXiom self-test driver.

use core::fmt;

use crate::poll::Stage;

/// Crate-wide result type alias.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error variants produced by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Any error reported by the underlying bus interface.
    Interface(E),
    /// The provided configuration parameters are invalid.
    InvalidConfig,
    /// The usage table has not been read yet; call `init` first.
    NotReady,
    /// The device is executing its bootloader and exposes no usages.
    BootloaderMode,
    /// The device does not publish the requested usage.
    UnknownUsage(u8),
    /// The usage is shorter than the layout the driver decodes.
    UsageTooShort {
        /// Usage number.
        usage: u8,
        /// Length published in the usage table.
        length: u16,
    },
    /// The usage does not fit the buffer supplied by the caller.
    UsageTooLarge {
        /// Usage number.
        usage: u8,
        /// Length published in the usage table.
        length: u16,
    },
    /// The device mask selects a bit that maps to no test.
    InvalidTest(u16),
    /// The system manager rejected a command.
    CommandRejected {
        /// Command word that was sent.
        command: u16,
        /// Response word left by the device.
        response: u16,
    },
    /// A poll loop ran out of time before reaching its terminal state.
    Timeout {
        /// Stage that was being waited on.
        stage: Stage,
        /// Time spent waiting, in milliseconds.
        waited_ms: u32,
    },
    /// A poll loop observed a cancellation request.
    Cancelled {
        /// Stage that was being waited on.
        stage: Stage,
    },
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Interface(err)
    }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interface(err) => write!(f, "bus error: {err}"),
            Self::InvalidConfig => f.write_str("invalid driver configuration"),
            Self::NotReady => f.write_str("usage table not read yet"),
            Self::BootloaderMode => f.write_str("device is in bootloader mode"),
            Self::UnknownUsage(usage) => write!(f, "device does not publish usage u{usage:02X}"),
            Self::UsageTooShort { usage, length } => {
                write!(f, "usage u{usage:02X} is too short ({length} bytes)")
            }
            Self::UsageTooLarge { usage, length } => {
                write!(f, "usage u{usage:02X} is too large ({length} bytes)")
            }
            Self::InvalidTest(bits) => write!(f, "self-test mask {bits:#06x} selects unknown tests"),
            Self::CommandRejected { command, response } => {
                write!(f, "command {command:#06x} rejected with response {response:#06x}")
            }
            Self::Timeout { stage, waited_ms } => {
                write!(f, "timed out after {waited_ms} ms waiting for {}", stage.label())
            }
            Self::Cancelled { stage } => write!(f, "cancelled while waiting for {}", stage.label()),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for Error<E> {}
