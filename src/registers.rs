//! Register map definitions for the aXiom usages driven by this crate.
#![allow(unused_parens)]

use modular_bitfield::prelude::*;

use crate::params::{AcquisitionState, OverallResult, SelfTestStatus, TestId, TestResult};

/// Usage number of the system manager (`u02`).
pub const USAGE_SYSTEM_MANAGER: u8 = 0x02;
/// Usage number of the self-test configuration (`u06`).
pub const USAGE_SELF_TEST: u8 = 0x06;
/// Usage number of the live view (`u07`).
pub const USAGE_LIVE_VIEW: u8 = 0x07;
/// Usage number of the device information block (`u31`).
pub const USAGE_DEVICE_INFO: u8 = 0x31;

/// Fixed address of the `u31` device information header.
pub const DEVICE_INFO_ADDRESS: u16 = 0x0000;
/// Size in bytes of the `u31` device information header.
pub const DEVICE_INFO_LEN: usize = 12;
/// Address of the first usage table entry, directly after the `u31` header page.
pub const USAGE_TABLE_ADDRESS: u16 = 0x0100;
/// Size in bytes of one usage table entry.
pub const USAGE_ENTRY_LEN: usize = 6;

/// Size in bytes of a `u02` command frame (command word plus three parameters).
pub const COMMAND_FRAME_LEN: usize = 8;
/// Value the device leaves in the `u02` command word once a command completed.
pub const COMMAND_RESPONSE_SUCCESS: u16 = 0x0000;
/// Responses with this bit set report a rejected command.
pub const COMMAND_RESPONSE_ERROR_FLAG: u16 = 0x8000;

/// Byte offset of the host-trigger mask inside `u06`.
pub const SELF_TEST_TRIGGER_OFFSET: usize = 0;
/// Smallest `u06` length that still holds the host-trigger mask.
pub const SELF_TEST_MIN_LEN: usize = 2;
/// Largest `u06` image handled by the driver.
pub const SELF_TEST_MAX_LEN: usize = 64;

/// Number of per-test result slots in `u07`, indexed by test number.
pub const LIVE_VIEW_RESULT_SLOTS: usize = 16;
/// Byte offset of the first per-test result slot inside `u07`.
pub const LIVE_VIEW_RESULTS_OFFSET: usize = 4;
/// Smallest `u07` length the driver can decode.
pub const LIVE_VIEW_MIN_LEN: usize = LIVE_VIEW_RESULTS_OFFSET + LIVE_VIEW_RESULT_SLOTS;

/// Bitfield representation of the `u31` device information header.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfoHeader {
    // Device identifier (bits 14:0 of bytes 0-1).
    pub device_id: B15,
    // Set when the runtime firmware is executing, clear in the bootloader.
    pub runtime: bool,
    // Firmware minor revision.
    pub fw_minor: u8,
    // Firmware major revision.
    pub fw_major: u8,
    // Firmware variant.
    pub fw_variant: u8,
    #[skip]
    __: B8,
    // Bootloader minor revision.
    pub bootloader_minor: u8,
    // Bootloader major revision.
    pub bootloader_major: u8,
    // JEDEC identifier of the silicon.
    pub jedec_id: u16,
    // Number of entries in the usage table.
    pub num_usages: u8,
    // Silicon revision.
    pub silicon_revision: u8,
}

/// Bitfield representation of one usage table entry.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEntry {
    // Usage number (`uXX`).
    pub usage: u8,
    // First page occupied by the usage.
    pub start_page: u8,
    // Number of pages; zero for report-only usages.
    pub num_pages: u8,
    // Last valid word offset in the final page.
    pub max_offset: B7,
    // Usage is delivered as a report rather than a register group.
    pub is_report: bool,
    // Interface revision.
    pub uif_revision: u8,
    // Usage revision.
    pub usage_revision: u8,
}

impl UsageEntry {
    /// Register address of the first byte of this usage.
    pub fn address(&self) -> u16 {
        u16::from(self.start_page()) << 8
    }

    /// Length in bytes of this usage.
    pub fn length(&self) -> u16 {
        match self.num_pages() {
            0 => 0,
            pages => (u16::from(pages) - 1) * 256 + (u16::from(self.max_offset()) + 1) * 2,
        }
    }
}

/// Bitfield representation of the `u07` live view header.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveViewHeader {
    // Acquisition engine running flag (byte 0, bit 0).
    pub ae_running: bool,
    #[skip]
    __: B7,
    // Self-test status (byte 1), zero when idle.
    pub self_test_status: u8,
    // Overall result of the last run (byte 2).
    pub overall_result: u8,
    #[skip]
    __: B8,
}

/// Decoded `u07` live view snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveView {
    /// Acquisition engine state.
    pub acquisition: AcquisitionState,
    /// Self-test run status.
    pub self_test_status: SelfTestStatus,
    /// Overall result of the last run.
    pub overall: OverallResult,
    results: [u8; LIVE_VIEW_RESULT_SLOTS],
}

impl LiveView {
    /// Decodes a raw `u07` image. Returns `None` when the image is too short.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < LIVE_VIEW_MIN_LEN {
            return None;
        }

        let header = LiveViewHeader::from_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let mut results = [0u8; LIVE_VIEW_RESULT_SLOTS];
        results.copy_from_slice(
            &raw[LIVE_VIEW_RESULTS_OFFSET..LIVE_VIEW_RESULTS_OFFSET + LIVE_VIEW_RESULT_SLOTS],
        );

        Some(Self {
            acquisition: AcquisitionState::from(header.ae_running()),
            self_test_status: SelfTestStatus::from(header.self_test_status()),
            overall: OverallResult::from(header.overall_result()),
            results,
        })
    }

    /// Result code of one test.
    pub fn result(&self, test: TestId) -> TestResult {
        TestResult::from(self.results[usize::from(test.number())])
    }

    /// Iterates every test slot alongside its result.
    pub fn results(&self) -> impl Iterator<Item = (TestId, TestResult)> + '_ {
        (TestId::MIN..=TestId::MAX)
            .filter_map(TestId::new)
            .map(move |test| (test, self.result(test)))
    }
}

/// Encodes a `u02` command frame.
pub fn encode_command(opcode: u16, parameters: [u16; 3]) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0..2].copy_from_slice(&opcode.to_le_bytes());
    for (slot, value) in frame[2..].chunks_exact_mut(2).zip(parameters) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
    frame
}

/// Reads the host-trigger mask from a raw `u06` image.
pub fn trigger_mask(raw: &[u8]) -> u16 {
    u16::from_le_bytes([
        raw[SELF_TEST_TRIGGER_OFFSET],
        raw[SELF_TEST_TRIGGER_OFFSET + 1],
    ])
}

/// Stores the host-trigger mask into a raw `u06` image.
pub fn set_trigger_mask(raw: &mut [u8], mask: u16) {
    raw[SELF_TEST_TRIGGER_OFFSET..SELF_TEST_TRIGGER_OFFSET + 2]
        .copy_from_slice(&mask.to_le_bytes());
}
