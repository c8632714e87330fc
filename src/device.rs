//! High-level aXiom device driver implementation.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_hal::spi::SpiDevice;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interface::AxiomInterface;
use crate::interface::i2c::I2cInterface;
use crate::interface::spi::SpiInterface;
use crate::params::{AcquisitionState, Command, I2cAddress, SelectionMode, TestSelection};
use crate::poll::{Cancellation, Stage, poll_until};
use crate::registers::{
    COMMAND_RESPONSE_ERROR_FLAG,
    COMMAND_RESPONSE_SUCCESS,
    DEVICE_INFO_ADDRESS,
    DEVICE_INFO_LEN,
    DeviceInfoHeader,
    LIVE_VIEW_MIN_LEN,
    LiveView,
    SELF_TEST_MAX_LEN,
    SELF_TEST_MIN_LEN,
    USAGE_ENTRY_LEN,
    USAGE_LIVE_VIEW,
    USAGE_SELF_TEST,
    USAGE_SYSTEM_MANAGER,
    USAGE_TABLE_ADDRESS,
    UsageEntry,
    encode_command,
    set_trigger_mask,
    trigger_mask,
};
use crate::self_test::{SelfTestPlan, SelfTestReport, run_self_test};
use crate::usage::{DeviceInfo, MAX_USAGES, Usage, UsageTable};

/// High-level synchronous driver for an aXiom touch controller.
pub struct Axiom<IFACE> {
    interface: IFACE,
    config: Config,
    info: Option<DeviceInfo>,
    usages: UsageTable,
}

impl<IFACE> Axiom<IFACE> {
    // ==================================================================
    // == Driver Construction & Ownership ===============================
    // ==================================================================
    /// Creates a new driver instance from the provided bus interface.
    pub fn new(interface: IFACE, config: Config) -> Self {
        Self {
            interface,
            config,
            info: None,
            usages: UsageTable::new(),
        }
    }

    /// Consumes the driver and returns the owned interface.
    pub fn release(self) -> (IFACE, Config) {
        (self.interface, self.config)
    }

    /// Provides mutable access to the underlying interface.
    pub fn interface_mut(&mut self) -> &mut IFACE {
        &mut self.interface
    }

    /// Returns a shared reference to the active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the active configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Identification read by [`Axiom::init`], if it ran.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.info
    }

    /// Usage table read by [`Axiom::init`].
    pub fn usages(&self) -> &UsageTable {
        &self.usages
    }
}

impl<I2C> Axiom<I2cInterface<I2C>>
where
    I2C: I2c<SevenBitAddress>,
{
    /// Convenience constructor for I2C transports.
    pub fn new_i2c(i2c: I2C, address: I2cAddress, config: Config) -> Self {
        Self::new(I2cInterface::new(i2c, address), config)
    }

    /// Releases the driver, returning the I2C bus and configuration.
    pub fn release_i2c(self) -> (I2C, Config) {
        let (iface, config) = self.release();
        (iface.release(), config)
    }
}

impl<SPI> Axiom<SpiInterface<SPI>>
where
    SPI: SpiDevice,
{
    /// Convenience constructor for SPI transports.
    pub fn new_spi(spi: SPI, config: Config) -> Self {
        Self::new(SpiInterface::new(spi), config)
    }

    /// Releases the driver, returning the SPI device and configuration.
    pub fn release_spi(self) -> (SPI, Config) {
        let (iface, config) = self.release();
        (iface.release(), config)
    }
}

impl<IFACE, CommE> Axiom<IFACE>
where
    IFACE: AxiomInterface<Error = CommE>,
{
    // ==================================================================
    // == Initialization & Usage Discovery ==============================
    // ==================================================================
    /// Reads the `u31` header and the usage table.
    ///
    /// Must succeed before any usage can be accessed.
    pub fn init(&mut self) -> Result<DeviceInfo, CommE> {
        self.config.validate().map_err(|_| Error::InvalidConfig)?;

        let mut raw = [0u8; DEVICE_INFO_LEN];
        self.interface.read(DEVICE_INFO_ADDRESS, &mut raw)?;
        let info = DeviceInfo::from(DeviceInfoHeader::from(raw));
        debug!(
            "aXiom device {} firmware {}.{} with {} usages",
            info.device_id,
            info.fw_major,
            info.fw_minor,
            info.num_usages
        );

        if !info.runtime {
            return Err(Error::BootloaderMode);
        }

        let count = usize::from(info.num_usages).min(MAX_USAGES);
        let mut table = [0u8; MAX_USAGES * USAGE_ENTRY_LEN];
        let table = &mut table[..count * USAGE_ENTRY_LEN];
        self.interface.read(USAGE_TABLE_ADDRESS, table)?;

        let mut usages = UsageTable::new();
        for raw_entry in table.chunks_exact(USAGE_ENTRY_LEN) {
            let mut entry = [0u8; USAGE_ENTRY_LEN];
            entry.copy_from_slice(raw_entry);
            usages.insert(UsageEntry::from(entry));
        }
        if usize::from(info.num_usages) > MAX_USAGES {
            warn!("usage table truncated to {} entries", MAX_USAGES);
        }

        self.usages = usages;
        self.info = Some(info);
        Ok(info)
    }

    /// Location of a usage, once [`Axiom::init`] has run.
    pub fn usage(&self, number: u8) -> Result<Usage, CommE> {
        if self.info.is_none() {
            return Err(Error::NotReady);
        }
        self.usages.get(number).ok_or(Error::UnknownUsage(number))
    }

    // ==================================================================
    // == Register Group Access =========================================
    // ==================================================================
    /// Reads a whole usage into `buf` and returns its length.
    pub fn read_usage(&mut self, number: u8, buf: &mut [u8]) -> Result<usize, CommE> {
        let usage = self.usage(number)?;
        let length = usize::from(usage.length);
        if buf.len() < length {
            return Err(Error::UsageTooLarge { usage: number, length: usage.length });
        }

        self.interface.read(usage.address, &mut buf[..length])?;
        Ok(length)
    }

    /// Writes `data` to the start of a usage.
    ///
    /// With `persist` set the volatile configuration is then committed to
    /// non-volatile memory; otherwise the change is lost on the next config reload.
    pub fn write_usage<C>(
        &mut self,
        number: u8,
        data: &[u8],
        persist: bool,
        delay: &mut impl DelayNs,
        cancel: &C,
    ) -> Result<(), CommE>
    where
        C: Cancellation + ?Sized,
    {
        let usage = self.usage(number)?;
        if data.len() > usize::from(usage.length) {
            return Err(Error::UsageTooLarge { usage: number, length: usage.length });
        }

        self.interface.write(usage.address, data)?;
        if persist {
            self.send_command(Command::SaveConfig, delay, cancel)?;
        }
        Ok(())
    }

    // ==================================================================
    // == System Manager ================================================
    // ==================================================================
    /// Sends a system manager command and waits for the device to accept it.
    pub fn send_command<C>(
        &mut self,
        command: Command,
        delay: &mut impl DelayNs,
        cancel: &C,
    ) -> Result<(), CommE>
    where
        C: Cancellation + ?Sized,
    {
        let usage = self.usage(USAGE_SYSTEM_MANAGER)?;
        let frame = encode_command(command.opcode(), command.parameters());
        if usize::from(usage.length) < frame.len() {
            return Err(Error::UsageTooShort { usage: usage.number, length: usage.length });
        }

        debug!("sending {:?} command", command);
        self.interface.write(usage.address, &frame)?;

        let policy = self.config.policy(Stage::CommandAck);
        let opcode = command.opcode();
        poll_until(delay, policy, cancel, Stage::CommandAck, || {
            let mut word = [0u8; 2];
            self.interface.read(usage.address, &mut word)?;
            match u16::from_le_bytes(word) {
                COMMAND_RESPONSE_SUCCESS => Ok(Some(())),
                response if response & COMMAND_RESPONSE_ERROR_FLAG != 0 => {
                    Err(Error::CommandRejected { command: opcode, response })
                }
                _ => Ok(None),
            }
        })
    }

    /// Stops the acquisition engine and waits until it reports stopped.
    pub fn stop_acquisition<C>(&mut self, delay: &mut impl DelayNs, cancel: &C) -> Result<(), CommE>
    where
        C: Cancellation + ?Sized,
    {
        self.send_command(Command::Stop, delay, cancel)?;
        self.wait_for_acquisition(AcquisitionState::Stopped, delay, cancel)
    }

    /// Starts the acquisition engine and waits until it reports running.
    pub fn start_acquisition<C>(&mut self, delay: &mut impl DelayNs, cancel: &C) -> Result<(), CommE>
    where
        C: Cancellation + ?Sized,
    {
        self.send_command(Command::Start, delay, cancel)?;
        self.wait_for_acquisition(AcquisitionState::Running, delay, cancel)
    }

    fn wait_for_acquisition<C>(
        &mut self,
        target: AcquisitionState,
        delay: &mut impl DelayNs,
        cancel: &C,
    ) -> Result<(), CommE>
    where
        C: Cancellation + ?Sized,
    {
        let stage = match target {
            AcquisitionState::Stopped => Stage::AcquisitionStop,
            AcquisitionState::Running => Stage::AcquisitionStart,
        };
        let policy = self.config.policy(stage);
        poll_until(delay, policy, cancel, stage, || {
            let state = self.read_live_view()?.acquisition;
            Ok((state == target).then_some(()))
        })
    }

    // ==================================================================
    // == Self-Test Configuration & Status ==============================
    // ==================================================================
    /// Reads the live view (`u07`).
    pub fn read_live_view(&mut self) -> Result<LiveView, CommE> {
        let usage = self.usage(USAGE_LIVE_VIEW)?;
        if usize::from(usage.length) < LIVE_VIEW_MIN_LEN {
            return Err(Error::UsageTooShort { usage: usage.number, length: usage.length });
        }

        let mut raw = [0u8; LIVE_VIEW_MIN_LEN];
        self.interface.read(usage.address, &mut raw)?;
        LiveView::decode(&raw).ok_or(Error::UsageTooShort {
            usage: usage.number,
            length: usage.length,
        })
    }

    /// Current acquisition engine state.
    pub fn acquisition_state(&mut self) -> Result<AcquisitionState, CommE> {
        Ok(self.read_live_view()?.acquisition)
    }

    /// Tests currently selected to run on the host trigger.
    pub fn self_test_selection(&mut self) -> Result<TestSelection, CommE> {
        let mut raw = [0u8; SELF_TEST_MAX_LEN];
        let length = self.read_self_test_image(&mut raw)?;
        let bits = trigger_mask(&raw[..length]);
        TestSelection::from_bits(bits).ok_or(Error::InvalidTest(bits))
    }

    /// Updates the host-trigger selection in `u06` and returns the mask now on the device.
    ///
    /// The rest of `u06` is preserved. `u06` is not rewritten when it already
    /// holds the resulting mask, so repeating the call leaves the device
    /// unchanged. A `persist` request is honoured in both cases since the
    /// volatile mask may differ from the one in non-volatile memory.
    pub fn configure_self_tests<C>(
        &mut self,
        selection: TestSelection,
        mode: SelectionMode,
        persist: bool,
        delay: &mut impl DelayNs,
        cancel: &C,
    ) -> Result<TestSelection, CommE>
    where
        C: Cancellation + ?Sized,
    {
        let mut raw = [0u8; SELF_TEST_MAX_LEN];
        let length = self.read_self_test_image(&mut raw)?;
        let image = &mut raw[..length];

        let current = trigger_mask(image);
        let updated = match mode {
            SelectionMode::Replace => selection,
            SelectionMode::Merge => TestSelection::from_bits_truncate(current).union(selection),
        };

        if updated.bits() == current {
            debug!("self-test mask {:#x} already configured", current);
            if persist {
                self.send_command(Command::SaveConfig, delay, cancel)?;
            }
            return Ok(updated);
        }

        set_trigger_mask(image, updated.bits());
        info!(
            "writing self-test mask {:#x} (was {:#x}, persist {})",
            updated.bits(),
            current,
            persist
        );
        self.write_usage(USAGE_SELF_TEST, image, persist, delay, cancel)?;
        Ok(updated)
    }

    fn read_self_test_image(&mut self, raw: &mut [u8; SELF_TEST_MAX_LEN]) -> Result<usize, CommE> {
        let usage = self.usage(USAGE_SELF_TEST)?;
        if usize::from(usage.length) < SELF_TEST_MIN_LEN {
            return Err(Error::UsageTooShort { usage: usage.number, length: usage.length });
        }
        self.read_usage(USAGE_SELF_TEST, raw)
    }

    // ==================================================================
    // == Self-Test =====================================================
    // ==================================================================
    /// Configures, triggers and collects a self-test run.
    pub fn run_self_test<C>(
        &mut self,
        plan: &SelfTestPlan,
        delay: &mut impl DelayNs,
        cancel: &C,
    ) -> Result<SelfTestReport, CommE>
    where
        C: Cancellation + ?Sized,
    {
        run_self_test(self, plan, delay, cancel)
    }
}
