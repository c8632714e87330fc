//! `axiom-selftest`: configure, run and report the aXiom built-in self tests.
//!
//! ```text
//! USAGE:
//!   axiom-selftest -i i2c --i2c-bus 1 --i2c-address 0x66 --tests 9 --merge --persist
//!   axiom-selftest -i spi --spi-bus 0 --spi-device 0 --tests 0x2E3E --acquisition stop
//!   axiom-selftest -i usb --live-view
//! ```

use anyhow::{Context, Result};
use axiom_selftest::config::{Config, DEFAULT_POLL_INTERVAL_MS};
use axiom_selftest::params::{AcquisitionPolicy, I2cAddress, SelectionMode, TestId, TestSelection};
use axiom_selftest::poll::Never;
use axiom_selftest::transport::{TransportError, TransportKind, TransportParams, TransportSpec};
use axiom_selftest::{Axiom, SelfTestPlan};
use clap::{ArgAction, CommandFactory, Parser};
use linux_embedded_hal::Delay;
use tracing_subscriber::EnvFilter;

/// Process exit status when the chosen transport lacks a parameter.
const EXIT_MISSING_PARAMETERS: i32 = -1;

#[derive(Parser)]
#[command(
    name = "axiom-selftest",
    about = "Utility to configure and get aXiom self test results",
    version
)]
struct Cli {
    /// Comms interface to communicate with aXiom.
    #[arg(short = 'i', value_enum)]
    interface: TransportKind,

    /// I2C bus number, as per `/dev/i2c-<bus>`.
    #[arg(long, value_name = "BUS")]
    i2c_bus: Option<u32>,

    /// I2C address, either 0x66 or 0x67.
    #[arg(long, value_name = "ADDR")]
    i2c_address: Option<I2cAddress>,

    /// SPI bus number, as per `/dev/spidev<bus>.<device>`.
    #[arg(long, value_name = "BUS")]
    spi_bus: Option<u32>,

    /// SPI device for CS, as per `/dev/spidev<bus>.<device>`.
    #[arg(long, value_name = "DEV")]
    spi_device: Option<u32>,

    /// Tests to run: comma-separated numbers (1-13) or a hex mask such as 0x2E3E.
    ///
    /// Without this flag the CRC check (test 9) is added to the tests already
    /// selected on the device and saved to non-volatile memory.
    #[arg(long, value_name = "LIST")]
    tests: Option<TestSelection>,

    /// Add the tests to the selection already on the device instead of replacing it.
    #[arg(long)]
    merge: bool,

    /// Save the selection to non-volatile memory.
    #[arg(long)]
    persist: bool,

    /// When to stop the acquisition engine around the run.
    #[arg(long, value_enum, default_value_t = AcquisitionPolicy::Auto)]
    acquisition: AcquisitionPolicy,

    /// Interval between two status reads.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u32,

    /// Give up when the self tests have not completed after this long.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u32>,

    /// Also print the full u07 live view.
    #[arg(long)]
    live_view: bool,

    /// Log more (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn transport(&self) -> Result<TransportSpec, TransportError> {
        let params = TransportParams {
            i2c_bus: self.i2c_bus,
            i2c_address: self.i2c_address,
            spi_bus: self.spi_bus,
            spi_device: self.spi_device,
        };
        TransportSpec::resolve(self.interface, &params)
    }

    fn plan(&self) -> SelfTestPlan {
        let Some(tests) = self.tests else {
            return SelfTestPlan::default().acquisition(self.acquisition);
        };

        let mode = if self.merge { SelectionMode::Merge } else { SelectionMode::Replace };
        SelfTestPlan::new(tests)
            .mode(mode)
            .persist(self.persist)
            .acquisition(self.acquisition)
    }

    /// Driver timing. Stage timeouts grow with the poll interval so that a
    /// slow interval still allows at least one re-read per stage.
    fn config(&self) -> Result<Config> {
        let interval = self.poll_interval_ms;
        let defaults = Config::default();
        let config = Config::new()
            .poll_interval_ms(interval)
            .command_timeout_ms(defaults.command_timeout_ms.max(interval))
            .acquisition_timeout_ms(defaults.acquisition_timeout_ms.max(interval))
            .self_test_timeout_ms(
                self.timeout_ms
                    .unwrap_or(defaults.self_test_timeout_ms.max(interval)),
            )
            .build();
        config.validate().context("invalid timing options")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let spec = match cli.transport() {
        Ok(spec) => spec,
        Err(err @ TransportError::MissingParameters { .. }) => {
            eprintln!("{err}");
            eprintln!("{}", Cli::command().render_help());
            std::process::exit(EXIT_MISSING_PARAMETERS);
        }
        Err(err) => return Err(err.into()),
    };

    run(&cli, &spec)
}

fn run(cli: &Cli, spec: &TransportSpec) -> Result<()> {
    let config = cli.config()?;
    let plan = cli.plan();
    if plan.selection.contains(TestId::CRC_CHECK) && !plan.persist {
        tracing::warn!(
            "the CRC check fails when the selection in RAM differs from NVM; pass --persist to save it"
        );
    }

    let interface = spec
        .open()
        .with_context(|| format!("opening {} transport", spec.kind()))?;
    let mut axiom = Axiom::new(interface, config);

    let info = axiom.init().context("reading aXiom device information")?;
    tracing::info!(
        device_id = info.device_id,
        fw_major = info.fw_major,
        fw_minor = info.fw_minor,
        "connected"
    );

    let mut delay = Delay;
    let report = axiom
        .run_self_test(&plan, &mut delay, &Never)
        .with_context(|| format!("running self tests {}", plan.selection))?;

    println!("Self Test Complete");
    println!("{report}");
    if cli.live_view {
        println!();
        println!("{}", report.live_view);
    }

    Ok(())
}
