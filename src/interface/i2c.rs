//! I2C interface implementation built on top of `embedded-hal` `I2c`.

use embedded_hal::i2c::{I2c, Operation, SevenBitAddress};

use super::{AxiomInterface, MAX_TRANSFER_LEN, transfer_header};
use crate::params::I2cAddress;

/// I2C-based interface implementation for the aXiom driver.
pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: I2cAddress,
}

impl<I2C> I2cInterface<I2C> {
    /// Creates a new interface talking to the device strapped at `address`.
    pub const fn new(i2c: I2C, address: I2cAddress) -> Self {
        Self { i2c, address }
    }

    /// Bus address this interface talks to.
    pub fn address(&self) -> I2cAddress {
        self.address
    }

    /// Provides mutable access to the wrapped I2C bus.
    pub fn i2c_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    /// Consumes the interface and returns the owned I2C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> AxiomInterface for I2cInterface<I2C>
where
    I2C: I2c<SevenBitAddress>,
{
    type Error = I2C::Error;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> core::result::Result<(), Self::Error> {
        let mut target = address;
        for chunk in buf.chunks_mut(MAX_TRANSFER_LEN) {
            let header = transfer_header(target, chunk.len(), true);
            self.i2c.write_read(self.address.value(), &header, chunk)?;
            target = target.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> core::result::Result<(), Self::Error> {
        let mut target = address;
        for chunk in data.chunks(MAX_TRANSFER_LEN) {
            let header = transfer_header(target, chunk.len(), false);
            // Adjacent writes in one transaction go out without a repeated start.
            let mut operations = [Operation::Write(&header), Operation::Write(chunk)];
            self.i2c.transaction(self.address.value(), &mut operations)?;
            target = target.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }
}
