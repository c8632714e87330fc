//! SPI interface implementation built on top of `embedded-hal` `SpiDevice`.

use embedded_hal::spi::{Operation, SpiDevice};

use super::{AxiomInterface, MAX_TRANSFER_LEN, transfer_header};

/// Dummy bytes clocked between a read header and the first data byte.
pub const READ_PADDING_LEN: usize = 32;

/// SPI-based interface implementation for the aXiom driver.
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI> SpiInterface<SPI> {
    /// Creates a new interface from the provided SPI device abstraction.
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Provides mutable access to the wrapped SPI device.
    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Consumes the interface and returns the owned SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> AxiomInterface for SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    type Error = SPI::Error;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> core::result::Result<(), Self::Error> {
        let padding = [0u8; READ_PADDING_LEN];
        let mut target = address;
        for chunk in buf.chunks_mut(MAX_TRANSFER_LEN) {
            let len = chunk.len();
            let header = transfer_header(target, len, true);
            let mut operations = [
                Operation::Write(&header),
                Operation::Write(&padding),
                Operation::Read(chunk),
            ];
            self.spi.transaction(&mut operations)?;
            target = target.wrapping_add(len as u16);
        }
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> core::result::Result<(), Self::Error> {
        let mut target = address;
        for chunk in data.chunks(MAX_TRANSFER_LEN) {
            let header = transfer_header(target, chunk.len(), false);
            let mut operations = [Operation::Write(&header), Operation::Write(chunk)];
            self.spi.transaction(&mut operations)?;
            target = target.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }
}
