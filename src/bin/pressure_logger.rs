//! Log data from a serial pressure gauge.
//!
//! Thin CLI over the library: assemble validated settings from flags (or a
//! TOML settings file with `[logger]` and `[gauge]` tables), initialize the
//! gauge protocol, and run the acquisition loop until Ctrl-C or a failure.
//!
//! ```bash
//! pressure_logger ./data --port /dev/ttyUSB0 --sample-rate 10 --buffer-size 20 --smoothing 4
//! pressure_logger --config pg.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use daqlog::config::{LoggerSettings, PressureGaugeSettings, PressureRunConfig};
use daqlog::logger::DataLogger;
use daqlog::protocol::pressure::PressureGauge;

#[derive(Parser)]
#[command(name = "pressure_logger")]
#[command(about = "Log data from a serial pressure gauge", long_about = None)]
struct Cli {
    /// Output directory for created run files
    #[arg(required_unless_present = "config")]
    outdir: Option<PathBuf>,

    /// Serial port the pressure gauge is connected to
    #[arg(long, required_unless_present = "config")]
    port: Option<String>,

    /// Run name prefixing the generated filename
    #[arg(long, default_value = "PG")]
    name: String,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 10.0)]
    sample_rate: f64,

    /// Number of samples to buffer before writing to the file
    #[arg(long, default_value_t = 20)]
    buffer_size: usize,

    /// Number of streamed samples to smooth over
    #[arg(long, default_value_t = 1)]
    smoothing: u32,

    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Per-response read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// TOML settings file; overrides all other flags
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<PressureRunConfig> {
        if let Some(path) = &self.config {
            return Ok(PressureRunConfig::load(path)?);
        }
        let mut logger = LoggerSettings::new(
            self.name,
            self.outdir.unwrap_or_else(|| PathBuf::from(".")),
        );
        logger.buffer_size = self.buffer_size;
        logger.sample_rate = self.sample_rate;
        let config = PressureRunConfig {
            logger,
            gauge: PressureGaugeSettings {
                port: self.port.unwrap_or_default(),
                baud: self.baud,
                timeout_ms: self.timeout_ms,
                smoothing: self.smoothing,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let gauge = PressureGauge::new(config.gauge);

    let mut logger = DataLogger::new(config.logger, gauge)?;
    logger.init().await?;
    logger
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
