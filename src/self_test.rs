//! Self-test trigger sequence for the aXiom driver.
//!
//! The device runs its self tests asynchronously. The host selects the tests
//! in `u06`, pauses the acquisition engine when a selected test needs it,
//! triggers the run through the system manager and then polls `u07` until the
//! self-test status returns to idle. An engine paused here is restarted before
//! the results are collected, also when the run itself failed.

use embedded_hal::delay::DelayNs;

use crate::device::Axiom;
use crate::error::{Error, Result};
use crate::interface::AxiomInterface;
use crate::params::{
    AcquisitionPolicy,
    AcquisitionState,
    Command,
    OverallResult,
    SelectionMode,
    SelfTestStatus,
    TestId,
    TestResult,
    TestSelection,
};
use crate::poll::{Cancellation, Never, Stage, poll_until};
use crate::registers::LiveView;

/// What to run and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestPlan {
    /// Tests to select for the host trigger.
    pub selection: TestSelection,
    /// How `selection` is combined with the mask already on the device.
    pub mode: SelectionMode,
    /// Commit the updated selection to non-volatile memory.
    pub persist: bool,
    /// When to pause the acquisition engine around the run.
    pub acquisition: AcquisitionPolicy,
}

impl SelfTestPlan {
    /// Plan replacing the device selection with `selection`, without persisting.
    pub const fn new(selection: TestSelection) -> Self {
        Self {
            selection,
            mode: SelectionMode::Replace,
            persist: false,
            acquisition: AcquisitionPolicy::Auto,
        }
    }

    /// Overrides how the selection is combined with the device mask.
    pub const fn mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Requests the selection to be saved to non-volatile memory.
    pub const fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Overrides when the acquisition engine is paused.
    pub const fn acquisition(mut self, policy: AcquisitionPolicy) -> Self {
        self.acquisition = policy;
        self
    }
}

impl Default for SelfTestPlan {
    /// Enables the CRC check on top of whatever is already selected and persists it.
    fn default() -> Self {
        Self::new(TestSelection::EMPTY.with(TestId::CRC_CHECK))
            .mode(SelectionMode::Merge)
            .persist(true)
    }
}

/// Result produced by the self-test routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestReport {
    /// Tests selected on the device when the run was triggered.
    pub selection: TestSelection,
    /// Overall result reported by the device.
    pub overall: OverallResult,
    /// Whether the acquisition engine was paused for the run.
    pub acquisition_paused: bool,
    /// Live view read after the run completed.
    pub live_view: LiveView,
}

impl SelfTestReport {
    /// Indicates whether the device reported an overall pass.
    pub fn passed(&self) -> bool {
        self.overall == OverallResult::Pass
    }

    /// Acquisition engine state after the run.
    pub fn acquisition(&self) -> AcquisitionState {
        self.live_view.acquisition
    }

    /// Results of the selected tests, in ascending test order.
    pub fn results(&self) -> impl Iterator<Item = (TestId, TestResult)> + '_ {
        self.selection
            .iter()
            .map(move |test| (test, self.live_view.result(test)))
    }

    /// Selected tests that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = (TestId, TestResult)> + '_ {
        self.results().filter(|(_, result)| *result != TestResult::Pass)
    }
}

/// Executes the self-test sequence described by `plan`.
pub fn run_self_test<IFACE, CommE, C>(
    device: &mut Axiom<IFACE>,
    plan: &SelfTestPlan,
    delay: &mut impl DelayNs,
    cancel: &C,
) -> Result<SelfTestReport, CommE>
where
    IFACE: AxiomInterface<Error = CommE>,
    C: Cancellation + ?Sized,
{
    if plan.selection.is_empty() && plan.mode == SelectionMode::Replace {
        return Err(Error::InvalidConfig);
    }

    let selection =
        device.configure_self_tests(plan.selection, plan.mode, plan.persist, delay, cancel)?;
    if selection.is_empty() {
        return Err(Error::InvalidConfig);
    }

    let pause = match plan.acquisition {
        AcquisitionPolicy::Auto => selection.requires_acquisition_stopped(),
        AcquisitionPolicy::Stop => true,
        AcquisitionPolicy::Leave => false,
    };

    let mut paused = false;
    let outcome = trigger_and_wait(device, pause, &mut paused, delay, cancel);

    if paused {
        // Restart regardless of cancellation; the poll is still bounded by its timeout.
        let restarted = device.start_acquisition(delay, &Never);
        match (&outcome, restarted) {
            (Ok(()), Err(err)) => return Err(err),
            (Err(_), Err(_)) => warn!("acquisition engine could not be restarted"),
            _ => {}
        }
    }
    outcome?;

    let live_view = device.read_live_view()?;
    info!(
        "self test complete: {:?}, {} tests",
        live_view.overall,
        selection.len()
    );

    Ok(SelfTestReport {
        selection,
        overall: live_view.overall,
        acquisition_paused: paused,
        live_view,
    })
}

fn trigger_and_wait<IFACE, CommE, C>(
    device: &mut Axiom<IFACE>,
    pause: bool,
    paused: &mut bool,
    delay: &mut impl DelayNs,
    cancel: &C,
) -> Result<(), CommE>
where
    IFACE: AxiomInterface<Error = CommE>,
    C: Cancellation + ?Sized,
{
    if pause && device.acquisition_state()? == AcquisitionState::Running {
        debug!("pausing acquisition engine");
        *paused = true;
        device.stop_acquisition(delay, cancel)?;
    }

    device.send_command(Command::RunSelfTests, delay, cancel)?;

    let policy = device.config().policy(Stage::SelfTest);
    poll_until(delay, policy, cancel, Stage::SelfTest, || {
        let view = device.read_live_view()?;
        Ok((view.self_test_status == SelfTestStatus::Idle).then_some(()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::poll::Never;
    use crate::testing::{CountingDelay, SimAxiom};
    use core::sync::atomic::AtomicBool;

    fn ready_device(sim: SimAxiom) -> Axiom<SimAxiom> {
        let mut device = Axiom::new(sim, Config::default());
        device.init().unwrap();
        device
    }

    fn full_selection() -> TestSelection {
        TestSelection::from_bits(0x2E3E).unwrap()
    }

    #[test]
    fn crc_preset_persists_and_leaves_engine_running() {
        let mut device = ready_device(SimAxiom::new());
        let mut delay = CountingDelay::default();

        let report = device
            .run_self_test(&SelfTestPlan::default(), &mut delay, &Never)
            .unwrap();

        let sim = device.interface_mut();
        assert_eq!(sim.trigger_mask(), 0x0200);
        assert_eq!(sim.nvm_trigger_mask(), 0x0200);
        assert_eq!(sim.commands(), [Command::SaveConfig, Command::RunSelfTests]);
        assert!(!report.acquisition_paused);
        assert_eq!(report.acquisition(), AcquisitionState::Running);
        assert!(report.passed());
        assert_eq!(report.results().count(), 1);
    }

    #[test]
    fn persisting_a_rerun_saves_the_volatile_selection() {
        let mut device = ready_device(SimAxiom::new());
        let mut delay = CountingDelay::default();
        let crc = SelfTestPlan::new(TestSelection::EMPTY.with(TestId::CRC_CHECK));

        device.run_self_test(&crc, &mut delay, &Never).unwrap();
        device.run_self_test(&crc.persist(true), &mut delay, &Never).unwrap();

        let sim = device.interface_mut();
        assert_eq!(sim.trigger_mask(), 0x0200);
        assert_eq!(sim.nvm_trigger_mask(), 0x0200);
        assert_eq!(
            sim.commands(),
            [Command::RunSelfTests, Command::SaveConfig, Command::RunSelfTests]
        );
    }

    #[test]
    fn merge_keeps_existing_tests_and_pauses_for_them() {
        let mut device = ready_device(SimAxiom::new().with_trigger_mask(0x0006));
        let mut delay = CountingDelay::default();

        let report = device
            .run_self_test(&SelfTestPlan::default(), &mut delay, &Never)
            .unwrap();

        let sim = device.interface_mut();
        assert_eq!(sim.trigger_mask(), 0x0206);
        assert_eq!(sim.nvm_trigger_mask(), 0x0206);
        assert_eq!(
            sim.commands(),
            [Command::SaveConfig, Command::Stop, Command::RunSelfTests, Command::Start]
        );
        assert!(report.acquisition_paused);
        assert_eq!(report.results().count(), 3);
    }

    #[test]
    fn full_preset_stops_and_restarts_engine() {
        let mut device = ready_device(SimAxiom::new().with_self_test_polls(3));
        let mut delay = CountingDelay::default();
        let plan = SelfTestPlan::new(full_selection()).acquisition(AcquisitionPolicy::Stop);

        let report = device.run_self_test(&plan, &mut delay, &Never).unwrap();

        let sim = device.interface_mut();
        assert_eq!(sim.trigger_mask(), 0x2E3E);
        assert_eq!(sim.nvm_trigger_mask(), 0);
        assert_eq!(
            sim.commands(),
            [Command::Stop, Command::RunSelfTests, Command::Start]
        );
        assert!(report.acquisition_paused);
        assert_eq!(report.acquisition(), AcquisitionState::Running);
        let numbers: Vec<u8> = report.results().map(|(test, _)| test.number()).collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5, 9, 10, 11, 13]);
    }

    #[test]
    fn auto_policy_pauses_only_when_needed() {
        let mut device = ready_device(SimAxiom::new());
        let mut delay = CountingDelay::default();
        let crc_only = SelfTestPlan::new(TestSelection::EMPTY.with(TestId::CRC_CHECK));
        device.run_self_test(&crc_only, &mut delay, &Never).unwrap();
        assert_eq!(device.interface_mut().commands(), [Command::RunSelfTests]);

        let mut device = ready_device(SimAxiom::new());
        device
            .run_self_test(&SelfTestPlan::new(full_selection()), &mut delay, &Never)
            .unwrap();
        assert_eq!(
            device.interface_mut().commands(),
            [Command::Stop, Command::RunSelfTests, Command::Start]
        );
    }

    #[test]
    fn engine_already_stopped_is_left_stopped() {
        let mut device = ready_device(SimAxiom::new().with_acquisition_running(false));
        let mut delay = CountingDelay::default();

        let report = device
            .run_self_test(&SelfTestPlan::new(full_selection()), &mut delay, &Never)
            .unwrap();

        assert!(!report.acquisition_paused);
        assert_eq!(report.acquisition(), AcquisitionState::Stopped);
        assert_eq!(device.interface_mut().commands(), [Command::RunSelfTests]);
    }

    #[test]
    fn poll_ends_exactly_when_status_returns_to_idle() {
        for running_reads in [0usize, 1, 4, 25] {
            let mut device = ready_device(SimAxiom::new().with_self_test_polls(running_reads));
            let mut delay = CountingDelay::default();
            let crc_only = SelfTestPlan::new(TestSelection::EMPTY.with(TestId::CRC_CHECK));

            device.run_self_test(&crc_only, &mut delay, &Never).unwrap();

            let sim = device.interface_mut();
            assert_eq!(sim.self_test_status_reads(), running_reads + 1);
            assert_eq!(delay.total_ms, running_reads as u64 * 100);
        }
    }

    #[test]
    fn failing_tests_are_reported() {
        let mut device = ready_device(SimAxiom::new().with_failing_test(TestId::CRC_CHECK));
        let mut delay = CountingDelay::default();

        let report = device
            .run_self_test(&SelfTestPlan::default(), &mut delay, &Never)
            .unwrap();

        assert_eq!(report.overall, OverallResult::Fail);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures, [(TestId::CRC_CHECK, TestResult::Fail)]);
    }

    #[test]
    fn timeout_still_restarts_engine() {
        let sim = SimAxiom::new().with_self_test_polls(usize::MAX);
        let mut device = Axiom::new(sim, Config::new().self_test_timeout_ms(500).build());
        device.init().unwrap();
        let mut delay = CountingDelay::default();

        let err = device
            .run_self_test(&SelfTestPlan::new(full_selection()), &mut delay, &Never)
            .unwrap_err();

        assert_eq!(err, Error::Timeout { stage: Stage::SelfTest, waited_ms: 500 });
        assert_eq!(
            device.interface_mut().commands(),
            [Command::Stop, Command::RunSelfTests, Command::Start]
        );
        assert_eq!(device.acquisition_state().unwrap(), AcquisitionState::Running);
    }

    #[test]
    fn cancellation_stops_polling_and_restarts_engine() {
        let cancel = AtomicBool::new(true);
        let mut device = ready_device(SimAxiom::new().with_self_test_polls(10));
        let mut delay = CountingDelay::default();
        let plan = SelfTestPlan::new(full_selection());

        let err = device.run_self_test(&plan, &mut delay, &cancel).unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(device.acquisition_state().unwrap(), AcquisitionState::Running);
    }

    #[test]
    fn empty_replace_selection_is_rejected() {
        let mut device = ready_device(SimAxiom::new());
        let mut delay = CountingDelay::default();

        let err = device
            .run_self_test(&SelfTestPlan::new(TestSelection::EMPTY), &mut delay, &Never)
            .unwrap_err();

        assert_eq!(err, Error::InvalidConfig);
        assert!(device.interface_mut().commands().is_empty());
    }

    #[test]
    fn rejected_command_surfaces() {
        let mut device = ready_device(SimAxiom::new().with_rejected(Command::RunSelfTests));
        let mut delay = CountingDelay::default();
        let crc_only = SelfTestPlan::new(TestSelection::EMPTY.with(TestId::CRC_CHECK));

        let err = device.run_self_test(&crc_only, &mut delay, &Never).unwrap_err();

        assert!(matches!(err, Error::CommandRejected { command: 0x000C, .. }));
    }
}
