//! Configuration primitives for the aXiom self-test driver.

use crate::poll::{PollPolicy, Stage};

/// Default interval between two status reads (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 100;

/// Timing configuration applied to every poll loop the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Sleep between two status reads.
    pub poll_interval_ms: u32,
    /// Upper bound for the system manager to acknowledge a command.
    pub command_timeout_ms: u32,
    /// Upper bound for the acquisition engine to stop or start.
    pub acquisition_timeout_ms: u32,
    /// Upper bound for a self-test run to complete.
    pub self_test_timeout_ms: u32,
}

impl Config {
    /// Begins building a [`Config`] using the builder pattern.
    pub fn new() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Checks that the interval is non-zero and no timeout is shorter than it.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let shortest = self
            .command_timeout_ms
            .min(self.acquisition_timeout_ms)
            .min(self.self_test_timeout_ms);
        if shortest < self.poll_interval_ms {
            return Err(ConfigError::TimeoutShorterThanInterval);
        }

        Ok(())
    }

    /// Poll policy applied while waiting on `stage`.
    pub fn policy(&self, stage: Stage) -> PollPolicy {
        let timeout_ms = match stage {
            Stage::CommandAck => self.command_timeout_ms,
            Stage::AcquisitionStop | Stage::AcquisitionStart => self.acquisition_timeout_ms,
            Stage::SelfTest => self.self_test_timeout_ms,
        };
        PollPolicy::new(self.poll_interval_ms, timeout_ms)
    }
}

/// Builder for [`Config`] allowing piecemeal construction.
#[derive(Debug, Clone, Copy)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder seeded with [`Config::default()`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Overrides the status poll interval.
    pub fn poll_interval_ms(mut self, interval_ms: u32) -> Self {
        self.config.poll_interval_ms = interval_ms;
        self
    }

    /// Overrides the command acknowledge timeout.
    pub fn command_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.config.command_timeout_ms = timeout_ms;
        self
    }

    /// Overrides the acquisition engine stop/start timeout.
    pub fn acquisition_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.config.acquisition_timeout_ms = timeout_ms;
        self
    }

    /// Overrides the self-test completion timeout.
    pub fn self_test_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.config.self_test_timeout_ms = timeout_ms;
        self
    }

    /// Finalizes the builder and returns the [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            command_timeout_ms: 1_000,
            acquisition_timeout_ms: 2_000,
            self_test_timeout_ms: 30_000,
        }
    }
}

/// Validation errors generated while verifying a [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The poll interval is zero, which would spin the bus.
    ZeroInterval,
    /// A timeout would expire before the first re-read.
    TimeoutShorterThanInterval,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroInterval => f.write_str("poll interval must be at least 1 ms"),
            Self::TimeoutShorterThanInterval => {
                f.write_str("every timeout must be at least one poll interval")
            }
        }
    }
}

impl core::error::Error for ConfigError {}
