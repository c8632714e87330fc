//! Host transport selection.
//!
//! Turns the interface kind and flags chosen on the command line into exactly
//! one connected [`HostInterface`]: `/dev/i2c-<bus>`, `/dev/spidev<bus>.<device>`
//! or the first aXiom USB bridge.

use std::error::Error as StdError;
use std::fmt;

use embedded_hal::i2c::Error as _;
use embedded_hal::spi::Error as _;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{I2cdev, SpidevDevice};
use thiserror::Error;

use crate::interface::AxiomInterface;
use crate::interface::i2c::I2cInterface;
use crate::interface::spi::SpiInterface;
use crate::interface::usb::UsbInterface;
use crate::params::I2cAddress;

/// SPI clock used for the aXiom link.
pub const SPI_MAX_SPEED_HZ: u32 = 1_000_000;

/// Errors raised while selecting, opening or using a host transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Parameters required by the chosen transport were not supplied.
    #[error("the {kind} interface needs {}", .missing.join(" and "))]
    MissingParameters {
        /// Transport that was requested.
        kind: TransportKind,
        /// Flags that were missing.
        missing: Vec<&'static str>,
    },

    /// Opening or configuring a device node failed.
    #[error("failed to open {path}")]
    Open {
        /// Device node that was opened.
        path: String,
        /// Underlying error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// I2C transfer failed.
    #[error("I2C transfer failed: {0:?}")]
    I2c(embedded_hal::i2c::ErrorKind),

    /// SPI transfer failed.
    #[error("SPI transfer failed: {0:?}")]
    Spi(embedded_hal::spi::ErrorKind),

    /// HID layer error talking to the USB bridge.
    #[error("USB bridge error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// No aXiom USB bridge is attached.
    #[error("no aXiom USB bridge found")]
    BridgeNotFound,

    /// The USB bridge did not answer in time.
    #[error("USB bridge did not respond")]
    BridgeTimeout,

    /// The USB bridge answered with a non-zero status.
    #[error("USB bridge reported status {0:#04x}")]
    BridgeStatus(u8),

    /// The USB bridge answered with a malformed report.
    #[error("USB bridge protocol error: {0}")]
    Bridge(&'static str),
}

/// Physical link used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TransportKind {
    /// Linux I2C character device.
    I2c,
    /// Linux spidev device.
    Spi,
    /// TouchNetix USB bridge.
    Usb,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I2c => "I2C",
            Self::Spi => "SPI",
            Self::Usb => "USB",
        })
    }
}

/// Transport parameters as supplied by the user; any may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportParams {
    /// I2C bus number, as in `/dev/i2c-<bus>`.
    pub i2c_bus: Option<u32>,
    /// I2C address of the device.
    pub i2c_address: Option<I2cAddress>,
    /// SPI bus number, as in `/dev/spidev<bus>.<device>`.
    pub spi_bus: Option<u32>,
    /// SPI chip-select, as in `/dev/spidev<bus>.<device>`.
    pub spi_device: Option<u32>,
}

/// Fully resolved transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSpec {
    /// I2C bus and device address.
    I2c {
        /// Bus number.
        bus: u32,
        /// Device address.
        address: I2cAddress,
    },
    /// SPI bus and chip-select.
    Spi {
        /// Bus number.
        bus: u32,
        /// Chip-select number.
        device: u32,
    },
    /// USB bridge.
    Usb,
}

impl TransportSpec {
    /// Checks that every parameter `kind` needs is present.
    pub fn resolve(kind: TransportKind, params: &TransportParams) -> Result<Self, TransportError> {
        let mut missing = Vec::new();
        let spec = match kind {
            TransportKind::I2c => {
                if params.i2c_bus.is_none() {
                    missing.push("--i2c-bus");
                }
                if params.i2c_address.is_none() {
                    missing.push("--i2c-address");
                }
                params
                    .i2c_bus
                    .zip(params.i2c_address)
                    .map(|(bus, address)| Self::I2c { bus, address })
            }
            TransportKind::Spi => {
                if params.spi_bus.is_none() {
                    missing.push("--spi-bus");
                }
                if params.spi_device.is_none() {
                    missing.push("--spi-device");
                }
                params
                    .spi_bus
                    .zip(params.spi_device)
                    .map(|(bus, device)| Self::Spi { bus, device })
            }
            TransportKind::Usb => Some(Self::Usb),
        };

        spec.ok_or(TransportError::MissingParameters { kind, missing })
    }

    /// Transport kind of this selection.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::I2c { .. } => TransportKind::I2c,
            Self::Spi { .. } => TransportKind::Spi,
            Self::Usb => TransportKind::Usb,
        }
    }

    /// Device node backing this selection, if any.
    pub fn device_path(&self) -> Option<String> {
        match self {
            Self::I2c { bus, .. } => Some(format!("/dev/i2c-{bus}")),
            Self::Spi { bus, device } => Some(format!("/dev/spidev{bus}.{device}")),
            Self::Usb => None,
        }
    }

    /// Opens the selected transport.
    pub fn open(&self) -> Result<HostInterface, TransportError> {
        let path = self.device_path();
        let open_error = |source: Box<dyn StdError + Send + Sync>| TransportError::Open {
            path: path.clone().unwrap_or_default(),
            source,
        };

        let interface = match *self {
            Self::I2c { address, .. } => {
                let node = path.as_deref().unwrap_or_default();
                let i2c = I2cdev::new(node).map_err(|err| open_error(err.into()))?;
                HostInterface::I2c(I2cInterface::new(i2c, address))
            }
            Self::Spi { .. } => {
                let node = path.as_deref().unwrap_or_default();
                let mut spi = SpidevDevice::open(node).map_err(|err| open_error(err.into()))?;
                let options = SpidevOptions::new()
                    .bits_per_word(8)
                    .max_speed_hz(SPI_MAX_SPEED_HZ)
                    .mode(SpiModeFlags::SPI_MODE_0)
                    .build();
                spi.0
                    .configure(&options)
                    .map_err(|err| open_error(err.into()))?;
                HostInterface::Spi(SpiInterface::new(spi))
            }
            Self::Usb => HostInterface::Usb(UsbInterface::open()?),
        };

        info!("opened {:?} transport", self.kind());
        Ok(interface)
    }
}

/// The one transport that is active for a run.
pub enum HostInterface {
    /// Linux I2C.
    I2c(I2cInterface<I2cdev>),
    /// Linux spidev.
    Spi(SpiInterface<SpidevDevice>),
    /// USB bridge.
    Usb(UsbInterface),
}

impl AxiomInterface for HostInterface {
    type Error = TransportError;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            Self::I2c(iface) => iface
                .read(address, buf)
                .map_err(|err| TransportError::I2c(err.kind())),
            Self::Spi(iface) => iface
                .read(address, buf)
                .map_err(|err| TransportError::Spi(err.kind())),
            Self::Usb(iface) => iface.read(address, buf),
        }
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::I2c(iface) => iface
                .write(address, data)
                .map_err(|err| TransportError::I2c(err.kind())),
            Self::Spi(iface) => iface
                .write(address, data)
                .map_err(|err| TransportError::Spi(err.kind())),
            Self::Usb(iface) => iface.write(address, data),
        }
    }
}
