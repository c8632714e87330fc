//! Strongly typed parameter enumerations for the aXiom self-test driver.
//!
//! These types map directly to the encodings found in the aXiom usages the
//! driver touches and are used across [`Config`](crate::config::Config), the
//! high-level driver APIs and the rendered reports. Prefer these types over
//! raw integers to keep selections and commands valid and explicit.
//!
//! # Examples
//!
//! ```rust
//! use axiom_selftest::params::{TestId, TestSelection};
//!
//! let crc = TestId::CRC_CHECK;
//! let selection: TestSelection = "1,2,9".parse().unwrap();
//! assert!(selection.contains(crc));
//! ```

use core::fmt;
use core::str::FromStr;

/// The two I2C addresses an aXiom device can be strapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum I2cAddress {
    /// Default strapping, `0x66`.
    Primary = 0x66,
    /// Alternate strapping, `0x67`.
    Secondary = 0x67,
}

impl I2cAddress {
    /// Returns the 7-bit bus address.
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for I2cAddress {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        match value {
            0x66 => Ok(Self::Primary),
            0x67 => Ok(Self::Secondary),
            other => Err(other),
        }
    }
}

impl FromStr for I2cAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let value = u8::from_str_radix(digits, 16).map_err(|_| ParseError::Malformed)?;
        Self::try_from(value).map_err(|_| ParseError::Unsupported)
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.value())
    }
}

/// System manager (u02) commands issued by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Stop the acquisition engine.
    Stop,
    /// Start (resume) the acquisition engine.
    Start,
    /// Copy the volatile configuration into non-volatile memory.
    SaveConfig,
    /// Run every self test selected for the host trigger in u06.
    RunSelfTests,
}

impl Command {
    /// Command word written to the first u02 register.
    pub const fn opcode(self) -> u16 {
        match self {
            Self::Stop => 0x0005,
            Self::Start => 0x0006,
            Self::SaveConfig => 0x0007,
            Self::RunSelfTests => 0x000C,
        }
    }

    /// Parameter words written after the command word.
    pub const fn parameters(self) -> [u16; 3] {
        match self {
            // Unlock key required before the device commits to NVM.
            Self::SaveConfig => [0x0000, 0xB10C, 0xC0DE],
            _ => [0; 3],
        }
    }

    /// Short human-readable name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::SaveConfig => "save config",
            Self::RunSelfTests => "run self tests",
        }
    }
}

/// Acquisition engine state as reported by u07.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionState {
    /// Sensing is paused.
    Stopped,
    /// Sensing is running.
    Running,
}

impl AcquisitionState {
    /// Lower-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

impl From<bool> for AcquisitionState {
    fn from(running: bool) -> Self {
        if running { Self::Running } else { Self::Stopped }
    }
}

/// Self-test run status as reported by u07.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelfTestStatus {
    /// No self test is in progress.
    Idle,
    /// Self tests are executing.
    Running,
}

impl SelfTestStatus {
    /// Lower-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }
}

impl From<u8> for SelfTestStatus {
    fn from(value: u8) -> Self {
        // Any non-zero status means the device is still busy.
        if value == 0 { Self::Idle } else { Self::Running }
    }
}

/// Aggregate result of the last self-test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverallResult {
    /// Every selected test passed.
    Pass,
    /// At least one selected test failed.
    Fail,
    /// No test has run since power-up.
    NotRun,
    /// Code not known to this driver.
    Unknown(u8),
}

impl OverallResult {
    /// Upper-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NotRun => "NOT RUN",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for OverallResult {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Pass,
            1 => Self::Fail,
            2 => Self::NotRun,
            other => Self::Unknown(other),
        }
    }
}

/// Result code of a single self test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestResult {
    /// The test was not part of the last run.
    NotRun,
    /// The test passed.
    Pass,
    /// The test failed.
    Fail,
    /// The test was started but could not complete.
    Aborted,
    /// Code not known to this driver.
    Unknown(u8),
}

impl TestResult {
    /// Lower-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotRun => "not run",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Aborted => "aborted",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for TestResult {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NotRun,
            1 => Self::Pass,
            2 => Self::Fail,
            3 => Self::Aborted,
            other => Self::Unknown(other),
        }
    }
}

/// How a requested selection is combined with the mask already on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelectionMode {
    /// Overwrite the device mask with the requested selection.
    #[default]
    Replace,
    /// OR the requested selection into the device mask.
    Merge,
}

/// When the acquisition engine is stopped around a self-test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AcquisitionPolicy {
    /// Stop only when a selected test needs the engine paused.
    #[default]
    Auto,
    /// Always stop the engine before triggering.
    Stop,
    /// Never touch the engine.
    Leave,
}

/// Identifier of a built-in self test (1 to 13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestId(u8);

impl TestId {
    /// Lowest valid test number.
    pub const MIN: u8 = 1;
    /// Highest valid test number.
    pub const MAX: u8 = 13;
    /// Configuration and firmware CRC check.
    pub const CRC_CHECK: Self = Self(9);

    /// Validates a raw test number.
    pub const fn new(number: u8) -> Option<Self> {
        if number >= Self::MIN && number <= Self::MAX {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Raw test number.
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Bit selecting this test in the u06 host-trigger mask.
    pub const fn bit(self) -> u16 {
        1 << self.0
    }

    /// Descriptive name where one is documented.
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            9 => Some("CRC check"),
            _ => None,
        }
    }

    /// Whether this test must run with the acquisition engine stopped.
    pub const fn requires_acquisition_stopped(self) -> bool {
        self.0 != Self::CRC_CHECK.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "test {:>2} ({})", self.0, name),
            None => write!(f, "test {:>2}", self.0),
        }
    }
}

/// Set of self tests selected to run on the host trigger.
///
/// Bit `n` of the mask selects test `n`; bit 0 and bits 14-15 are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestSelection(u16);

impl TestSelection {
    /// Bits that correspond to a valid test number.
    pub const VALID_MASK: u16 = 0x3FFE;
    /// Selection with no tests.
    pub const EMPTY: Self = Self(0);

    /// Validates a raw mask, rejecting bits that map to no test.
    pub const fn from_bits(bits: u16) -> Option<Self> {
        if bits & !Self::VALID_MASK == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Builds a selection from a raw device mask, dropping invalid bits.
    pub const fn from_bits_truncate(bits: u16) -> Self {
        Self(bits & Self::VALID_MASK)
    }

    /// Raw mask as written to u06.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` when no test is selected.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if `test` is part of the selection.
    pub const fn contains(self, test: TestId) -> bool {
        self.0 & test.bit() != 0
    }

    /// Adds `test` to the selection.
    pub const fn with(self, test: TestId) -> Self {
        Self(self.0 | test.bit())
    }

    /// Union of both selections.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Number of selected tests.
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether any selected test needs the acquisition engine stopped.
    pub fn requires_acquisition_stopped(self) -> bool {
        self.iter().any(TestId::requires_acquisition_stopped)
    }

    /// Iterates the selected tests in ascending order.
    pub fn iter(self) -> impl Iterator<Item = TestId> {
        (TestId::MIN..=TestId::MAX)
            .filter_map(TestId::new)
            .filter(move |test| self.contains(*test))
    }
}

impl FromIterator<TestId> for TestSelection {
    fn from_iter<T: IntoIterator<Item = TestId>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl FromStr for TestSelection {
    type Err = ParseError;

    /// Accepts a hex mask (`0x2E3E`) or a comma-separated list of test numbers (`1,2,9`).
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let bits = u16::from_str_radix(hex, 16).map_err(|_| ParseError::Malformed)?;
            return Self::from_bits(bits).ok_or(ParseError::Unsupported);
        }

        let mut selection = Self::EMPTY;
        for item in s.split(',').map(str::trim) {
            let number: u8 = item.parse().map_err(|_| ParseError::Malformed)?;
            let test = TestId::new(number).ok_or(ParseError::Unsupported)?;
            selection = selection.with(test);
        }
        Ok(selection)
    }
}

impl fmt::Display for TestSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for test in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", test.number())?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Errors raised while parsing textual parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// The text is not a number in the expected base.
    Malformed,
    /// The number is well formed but outside the accepted set.
    Unsupported,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed value"),
            Self::Unsupported => f.write_str("value outside the supported range"),
        }
    }
}

impl core::error::Error for ParseError {}
