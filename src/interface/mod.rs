//! Bus interface abstraction for the aXiom driver.
//!
//! Every aXiom access, whatever the physical link, starts with the same
//! 4-byte header: the little-endian target address followed by a 15-bit
//! length whose top bit flags a read.

pub mod i2c;
pub mod spi;
#[cfg(feature = "host")]
pub mod usb;

/// Size in bytes of the transfer header.
pub const HEADER_LEN: usize = 4;
/// Largest payload a single header can describe.
pub const MAX_TRANSFER_LEN: usize = 0x7FFF;

const READ_FLAG: u16 = 0x8000;

/// Abstraction over the low-level bus access required by the driver.
pub trait AxiomInterface {
    /// Error type produced by the concrete bus implementation.
    type Error;

    /// Reads `buf.len()` bytes starting at `address`.
    fn read(&mut self, address: u16, buf: &mut [u8]) -> core::result::Result<(), Self::Error>;

    /// Writes `data` starting at `address`.
    fn write(&mut self, address: u16, data: &[u8]) -> core::result::Result<(), Self::Error>;
}

impl<T: AxiomInterface + ?Sized> AxiomInterface for &mut T {
    type Error = T::Error;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> core::result::Result<(), Self::Error> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> core::result::Result<(), Self::Error> {
        (**self).write(address, data)
    }
}

/// Builds the transfer header for an access of `len` bytes at `address`.
///
/// `len` must not exceed [`MAX_TRANSFER_LEN`]; callers split larger accesses.
pub fn transfer_header(address: u16, len: usize, is_read: bool) -> [u8; HEADER_LEN] {
    let mut length = (len.min(MAX_TRANSFER_LEN)) as u16;
    if is_read {
        length |= READ_FLAG;
    }
    let [a0, a1] = address.to_le_bytes();
    let [l0, l1] = length.to_le_bytes();
    [a0, a1, l0, l1]
}
