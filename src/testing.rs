//! Test doubles: a simulated aXiom behind [`AxiomInterface`] and a counting delay.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;

use crate::interface::AxiomInterface;
use crate::params::{Command, TestId};
use crate::registers::{
    COMMAND_FRAME_LEN,
    DEVICE_INFO_LEN,
    LIVE_VIEW_RESULTS_OFFSET,
    USAGE_ENTRY_LEN,
    USAGE_LIVE_VIEW,
    USAGE_SELF_TEST,
    USAGE_SYSTEM_MANAGER,
    USAGE_TABLE_ADDRESS,
};

pub const SYSTEM_MANAGER_ADDRESS: u16 = 0x0200;
pub const SELF_TEST_ADDRESS: u16 = 0x0300;
pub const LIVE_VIEW_ADDRESS: u16 = 0x0400;
const SELF_TEST_LEN: usize = 4;
const MEMORY_LEN: usize = 0x0500;

/// Delay that records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: usize,
    pub total_ms: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ms += u64::from(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += u64::from(ms);
    }
}

/// In-memory aXiom exposing u02, u06 and u07 through a usage table.
///
/// Commands complete as soon as they are written. A self-test run reports
/// running for a configurable number of `u07` reads, then idle with results.
pub struct SimAxiom {
    memory: Vec<u8>,
    nvm_trigger_mask: u16,
    runtime: bool,
    acquisition_running: bool,
    self_test_polls: usize,
    pending_run: Option<usize>,
    status_reads: usize,
    failing: Vec<TestId>,
    rejected: Option<Command>,
    stalled: Option<Command>,
    commands: Vec<Command>,
    self_test_writes: usize,
}

impl SimAxiom {
    pub fn new() -> Self {
        let mut sim = Self {
            memory: vec![0; MEMORY_LEN],
            nvm_trigger_mask: 0,
            runtime: true,
            acquisition_running: true,
            self_test_polls: 0,
            pending_run: None,
            status_reads: 0,
            failing: Vec::new(),
            rejected: None,
            stalled: None,
            commands: Vec::new(),
            self_test_writes: 0,
        };
        sim.layout();
        sim
    }

    pub fn in_bootloader(mut self) -> Self {
        self.runtime = false;
        self.layout();
        self
    }

    pub fn with_trigger_mask(mut self, mask: u16) -> Self {
        let at = usize::from(SELF_TEST_ADDRESS);
        self.memory[at..at + 2].copy_from_slice(&mask.to_le_bytes());
        self
    }

    pub fn with_acquisition_running(mut self, running: bool) -> Self {
        self.acquisition_running = running;
        self
    }

    pub fn with_self_test_polls(mut self, polls: usize) -> Self {
        self.self_test_polls = polls;
        self
    }

    pub fn with_failing_test(mut self, test: TestId) -> Self {
        self.failing.push(test);
        self
    }

    pub fn with_rejected(mut self, command: Command) -> Self {
        self.rejected = Some(command);
        self
    }

    /// Leaves `command` unacknowledged: the command word keeps its opcode.
    pub fn with_stalled(mut self, command: Command) -> Self {
        self.stalled = Some(command);
        self
    }

    pub fn trigger_mask(&self) -> u16 {
        let at = usize::from(SELF_TEST_ADDRESS);
        u16::from_le_bytes([self.memory[at], self.memory[at + 1]])
    }

    pub fn nvm_trigger_mask(&self) -> u16 {
        self.nvm_trigger_mask
    }

    pub fn self_test_image(&self) -> &[u8] {
        let at = usize::from(SELF_TEST_ADDRESS);
        &self.memory[at..at + SELF_TEST_LEN]
    }

    pub fn set_self_test_tail(&mut self, tail: [u8; 2]) {
        let at = usize::from(SELF_TEST_ADDRESS) + 2;
        self.memory[at..at + 2].copy_from_slice(&tail);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn self_test_writes(&self) -> usize {
        self.self_test_writes
    }

    /// `u07` reads from the trigger up to and including the first idle report.
    pub fn self_test_status_reads(&self) -> usize {
        self.status_reads
    }

    fn layout(&mut self) {
        let mut header = [0u8; DEVICE_INFO_LEN];
        let id: u16 = 0x0C40 | if self.runtime { 0x8000 } else { 0 };
        header[0..2].copy_from_slice(&id.to_le_bytes());
        header[2] = 0x08;
        header[3] = 0x04;
        header[10] = 4;
        self.memory[..DEVICE_INFO_LEN].copy_from_slice(&header);

        let entries: [[u8; USAGE_ENTRY_LEN]; 4] = [
            [USAGE_SYSTEM_MANAGER, 0x02, 0x01, 0x03, 0x00, 0x02],
            [USAGE_SELF_TEST, 0x03, 0x01, 0x01, 0x00, 0x01],
            [USAGE_LIVE_VIEW, 0x04, 0x01, 0x0F, 0x00, 0x03],
            [0x34, 0x00, 0x00, 0x80, 0x00, 0x01],
        ];
        let base = usize::from(USAGE_TABLE_ADDRESS);
        for (index, entry) in entries.iter().enumerate() {
            let at = base + index * USAGE_ENTRY_LEN;
            self.memory[at..at + USAGE_ENTRY_LEN].copy_from_slice(entry);
        }

        // Overall result reads "not run" until the first run completes.
        self.memory[usize::from(LIVE_VIEW_ADDRESS) + 2] = 2;
    }

    fn execute(&mut self, opcode: u16) {
        let command = [
            Command::Stop,
            Command::Start,
            Command::SaveConfig,
            Command::RunSelfTests,
        ]
        .into_iter()
        .find(|command| command.opcode() == opcode);

        let Some(command) = command else {
            self.set_response(0x8000 | opcode);
            return;
        };
        self.commands.push(command);

        if self.stalled == Some(command) {
            return;
        }
        if self.rejected == Some(command) {
            self.set_response(0x8001);
            return;
        }

        match command {
            Command::Stop => self.acquisition_running = false,
            Command::Start => self.acquisition_running = true,
            Command::SaveConfig => self.nvm_trigger_mask = self.trigger_mask(),
            Command::RunSelfTests => {
                self.pending_run = Some(self.self_test_polls);
                self.status_reads = 0;
            }
        }
        self.set_response(0x0000);
    }

    fn set_response(&mut self, response: u16) {
        let at = usize::from(SYSTEM_MANAGER_ADDRESS);
        self.memory[at..at + 2].copy_from_slice(&response.to_le_bytes());
    }

    fn refresh_live_view(&mut self) {
        let at = usize::from(LIVE_VIEW_ADDRESS);
        let mut running = false;
        if let Some(remaining) = self.pending_run {
            self.status_reads += 1;
            if remaining == 0 {
                self.pending_run = None;
                self.publish_results();
            } else {
                self.pending_run = Some(remaining - 1);
                running = true;
            }
        }

        self.memory[at] = u8::from(self.acquisition_running);
        self.memory[at + 1] = u8::from(running);
    }

    fn publish_results(&mut self) {
        let at = usize::from(LIVE_VIEW_ADDRESS);
        let mask = self.trigger_mask();
        let mut any_failed = false;
        for number in TestId::MIN..=TestId::MAX {
            let code = if mask & (1 << number) == 0 {
                0
            } else if self.failing.iter().any(|test| test.number() == number) {
                any_failed = true;
                2
            } else {
                1
            };
            self.memory[at + LIVE_VIEW_RESULTS_OFFSET + usize::from(number)] = code;
        }
        self.memory[at + 2] = u8::from(any_failed);
    }
}

impl AxiomInterface for SimAxiom {
    type Error = Infallible;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        if address == LIVE_VIEW_ADDRESS {
            self.refresh_live_view();
        }
        let at = usize::from(address);
        buf.copy_from_slice(&self.memory[at..at + buf.len()]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        let at = usize::from(address);
        self.memory[at..at + data.len()].copy_from_slice(data);

        if address == SELF_TEST_ADDRESS {
            self.self_test_writes += 1;
        }
        if address == SYSTEM_MANAGER_ADDRESS && data.len() == COMMAND_FRAME_LEN {
            self.execute(u16::from_le_bytes([data[0], data[1]]));
        }
        Ok(())
    }
}
