//! USB interface implementation for the TouchNetix aXiom USB bridge.
//!
//! The bridge is a HID device. Each output report carries one bridge transfer
//! command wrapping a regular aXiom header; the matching input report echoes
//! the command, a status byte and any data read back.

use hidapi::{HidApi, HidDevice};

use super::{AxiomInterface, HEADER_LEN, transfer_header};
use crate::transport::TransportError;

/// USB vendor id of the aXiom bridge.
pub const VENDOR_ID: u16 = 0x03EB;
/// USB product ids of known aXiom bridge revisions.
pub const PRODUCT_IDS: [u16; 2] = [0x2F04, 0x2F08];
/// HID report size, excluding the report id byte.
pub const REPORT_LEN: usize = 64;

const REPORT_ID: u8 = 0x00;
const CMD_TRANSFER: u8 = 0x51;
const STATUS_OK: u8 = 0x00;
const REQUEST_PREFIX_LEN: usize = 3;
const RESPONSE_PREFIX_LEN: usize = 2;

/// Largest payload a single write report can carry.
pub const MAX_WRITE_CHUNK: usize = REPORT_LEN - REQUEST_PREFIX_LEN - HEADER_LEN;
/// Largest payload a single read report can return.
pub const MAX_READ_CHUNK: usize = REPORT_LEN - RESPONSE_PREFIX_LEN;

const DEFAULT_TIMEOUT_MS: i32 = 500;

/// HID-backed interface to an aXiom behind the USB bridge.
pub struct UsbInterface {
    device: HidDevice,
    timeout_ms: i32,
}

impl UsbInterface {
    /// Opens the first attached aXiom bridge.
    pub fn open() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        let info = api
            .device_list()
            .find(|info| info.vendor_id() == VENDOR_ID && PRODUCT_IDS.contains(&info.product_id()))
            .ok_or(TransportError::BridgeNotFound)?;

        debug!(
            "opening aXiom bridge {:#x}:{:#x}",
            info.vendor_id(),
            info.product_id()
        );
        let device = info.open_device(&api)?;
        Ok(Self::new(device))
    }

    /// Wraps an already opened bridge.
    pub fn new(device: HidDevice) -> Self {
        Self { device, timeout_ms: DEFAULT_TIMEOUT_MS }
    }

    /// Overrides how long to wait for each bridge response.
    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Consumes the interface and returns the HID device.
    pub fn release(self) -> HidDevice {
        self.device
    }

    fn exchange(
        &mut self,
        header: [u8; HEADER_LEN],
        payload: &[u8],
        read_len: usize,
    ) -> Result<[u8; REPORT_LEN], TransportError> {
        let request = encode_transfer(header, payload, read_len);
        self.device.write(&request)?;

        let mut response = [0u8; REPORT_LEN];
        let received = self.device.read_timeout(&mut response, self.timeout_ms)?;
        if received == 0 {
            return Err(TransportError::BridgeTimeout);
        }
        check_response(&response[..received], read_len)?;
        Ok(response)
    }
}

impl AxiomInterface for UsbInterface {
    type Error = TransportError;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut target = address;
        for chunk in buf.chunks_mut(MAX_READ_CHUNK) {
            let header = transfer_header(target, chunk.len(), true);
            let response = self.exchange(header, &[], chunk.len())?;
            chunk.copy_from_slice(&response[RESPONSE_PREFIX_LEN..RESPONSE_PREFIX_LEN + chunk.len()]);
            target = target.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        let mut target = address;
        for chunk in data.chunks(MAX_WRITE_CHUNK) {
            let header = transfer_header(target, chunk.len(), false);
            self.exchange(header, chunk, 0)?;
            target = target.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }
}

/// Builds the output report (report id included) for one bridge transfer.
pub fn encode_transfer(
    header: [u8; HEADER_LEN],
    payload: &[u8],
    read_len: usize,
) -> [u8; REPORT_LEN + 1] {
    let mut report = [0u8; REPORT_LEN + 1];
    let write_len = HEADER_LEN + payload.len();
    report[0] = REPORT_ID;
    report[1] = CMD_TRANSFER;
    report[2] = write_len as u8;
    report[3] = read_len as u8;
    let body = 1 + REQUEST_PREFIX_LEN;
    report[body..body + HEADER_LEN].copy_from_slice(&header);
    report[body + HEADER_LEN..body + write_len].copy_from_slice(payload);
    report
}

/// Validates an input report returned for a transfer expecting `read_len` bytes.
pub fn check_response(report: &[u8], read_len: usize) -> Result<(), TransportError> {
    if report.len() < RESPONSE_PREFIX_LEN + read_len {
        return Err(TransportError::Bridge("short response report"));
    }
    if report[0] != CMD_TRANSFER {
        return Err(TransportError::Bridge("response does not echo the transfer command"));
    }
    if report[1] != STATUS_OK {
        return Err(TransportError::BridgeStatus(report[1]));
    }
    Ok(())
}
