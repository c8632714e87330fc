//! Bounded, cancellable polling used to wait on device state transitions.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;

use crate::error::{Error, Result};

/// Stage a poll loop is waiting on, carried by timeout and cancellation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// System manager acknowledging a command.
    CommandAck,
    /// Acquisition engine reporting stopped.
    AcquisitionStop,
    /// Acquisition engine reporting running.
    AcquisitionStart,
    /// Self-test status returning to idle.
    SelfTest,
}

impl Stage {
    /// Human-readable description.
    pub const fn label(self) -> &'static str {
        match self {
            Self::CommandAck => "command acknowledge",
            Self::AcquisitionStop => "acquisition engine to stop",
            Self::AcquisitionStart => "acquisition engine to start",
            Self::SelfTest => "self tests to complete",
        }
    }
}

/// Interval and upper bound of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollPolicy {
    /// Sleep between two consecutive reads, in milliseconds.
    pub interval_ms: u32,
    /// Total time allowed before giving up, in milliseconds.
    pub timeout_ms: u32,
}

impl PollPolicy {
    /// Creates a policy from an interval and a timeout.
    pub const fn new(interval_ms: u32, timeout_ms: u32) -> Self {
        Self { interval_ms, timeout_ms }
    }
}

/// Source of cancellation requests checked between reads.
pub trait Cancellation {
    /// Returns `true` once the caller asked the loop to stop.
    fn is_cancelled(&self) -> bool;
}

/// Cancellation token that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Cancellation for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<C: Cancellation + ?Sized> Cancellation for &C {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Calls `check` until it yields a value, sleeping `policy.interval_ms` between calls.
///
/// The first check runs immediately. The loop ends with [`Error::Timeout`] once
/// the accumulated sleep reaches `policy.timeout_ms` without a value, and with
/// [`Error::Cancelled`] if `cancel` fires between two checks. Check errors are
/// returned as-is.
pub fn poll_until<T, E, D, C, F>(
    delay: &mut D,
    policy: PollPolicy,
    cancel: &C,
    stage: Stage,
    mut check: F,
) -> Result<T, E>
where
    D: DelayNs,
    C: Cancellation + ?Sized,
    F: FnMut() -> Result<Option<T>, E>,
{
    let mut waited_ms: u32 = 0;
    loop {
        if let Some(value) = check()? {
            trace!("poll {:?} done after {} ms", stage, waited_ms);
            return Ok(value);
        }

        if cancel.is_cancelled() {
            debug!("poll {:?} cancelled after {} ms", stage, waited_ms);
            return Err(Error::Cancelled { stage });
        }

        if waited_ms >= policy.timeout_ms {
            warn!("poll {:?} timed out after {} ms", stage, waited_ms);
            return Err(Error::Timeout { stage, waited_ms });
        }

        let step = policy.interval_ms.max(1);
        delay.delay_ms(step);
        waited_ms = waited_ms.saturating_add(step);
    }
}
