//! Configuration surface for loggers and protocols.
//!
//! Every knob the process consumes is an explicit, serde-validated field on
//! a protocol-specific settings struct — unknown keys are rejected at parse
//! time and semantic validation runs before any `init()` is called. Settings
//! files are TOML, loaded through the `config` crate; the thin binaries can
//! also assemble the same structs from command-line flags.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{DaqError, DaqResult};

fn default_outdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_buffer_size() -> usize {
    1
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_baud() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_smoothing() -> u32 {
    1
}

fn default_gain() -> Gain {
    Gain::One
}

/// Settings of the logger core itself, independent of the instrument.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerSettings {
    /// Run name; prefixes the generated filename.
    pub name: String,
    /// Output directory for run files.
    #[serde(default = "default_outdir")]
    pub outdir: PathBuf,
    /// Samples buffered in memory before a flush. At least 1.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Target sample rate in Hz. Strictly positive.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

impl LoggerSettings {
    /// Settings with defaults for everything but name and output directory.
    pub fn new(name: impl Into<String>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            outdir: outdir.into(),
            buffer_size: default_buffer_size(),
            sample_rate: default_sample_rate(),
        }
    }

    /// Semantic validation, run before `init()`.
    pub fn validate(&self) -> DaqResult<()> {
        if self.name.is_empty() {
            return Err(DaqError::Configuration("run name must not be empty".into()));
        }
        if self.buffer_size < 1 {
            return Err(DaqError::Configuration(
                "buffer_size must be at least 1 row".into(),
            ));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(DaqError::Configuration(
                "sample_rate must be a positive number of Hz".into(),
            ));
        }
        Ok(())
    }
}

/// Settings of the serial pressure gauge protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureGaugeSettings {
    /// Serial port path, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Per-response read timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Streamed samples averaged into one logged sample. At least 1.
    #[serde(default = "default_smoothing")]
    pub smoothing: u32,
}

impl PressureGaugeSettings {
    /// Semantic validation, run before `init()`.
    pub fn validate(&self) -> DaqResult<()> {
        if self.port.is_empty() {
            return Err(DaqError::Configuration(
                "serial port path must not be empty".into(),
            ));
        }
        if self.smoothing < 1 {
            return Err(DaqError::Configuration(
                "smoothing must be at least 1 sample".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(DaqError::Configuration(
                "timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Programmable gain of the ADC front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "f64")]
pub enum Gain {
    /// 2/3× (±6.144 V full scale).
    TwoThirds,
    /// 1×.
    One,
    /// 2×.
    Two,
    /// 4×.
    Four,
    /// 8×.
    Eight,
    /// 16×.
    Sixteen,
}

impl Gain {
    /// Numeric value, as stored in the `gain` column.
    pub fn as_f64(self) -> f64 {
        match self {
            Gain::TwoThirds => 2.0 / 3.0,
            Gain::One => 1.0,
            Gain::Two => 2.0,
            Gain::Four => 4.0,
            Gain::Eight => 8.0,
            Gain::Sixteen => 16.0,
        }
    }
}

impl TryFrom<f64> for Gain {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let candidates = [
            (Gain::TwoThirds, 2.0 / 3.0),
            (Gain::One, 1.0),
            (Gain::Two, 2.0),
            (Gain::Four, 4.0),
            (Gain::Eight, 8.0),
            (Gain::Sixteen, 16.0),
        ];
        candidates
            .into_iter()
            .find(|(_, v)| (value - v).abs() < 1e-6)
            .map(|(gain, _)| gain)
            .ok_or_else(|| format!("invalid gain {}, expected one of 2/3, 1, 2, 4, 8, 16", value))
    }
}

impl std::fmt::Display for Gain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gain::TwoThirds => write!(f, "2/3"),
            other => write!(f, "{}", other.as_f64()),
        }
    }
}

/// One ADC input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[allow(missing_docs)]
pub enum Pin {
    P0,
    P1,
    P2,
    P3,
}

impl std::fmt::Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Pin::P0 => "P0",
            Pin::P1 => "P1",
            Pin::P2 => "P2",
            Pin::P3 => "P3",
        };
        write!(f, "{}", label)
    }
}

/// One configured ADC channel.
///
/// In TOML: `{ single = "P2" }` or `{ differential = ["P0", "P1"] }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSpec {
    /// Single-ended channel on one pin.
    Single(Pin),
    /// Differential channel across a (+, −) pin pair.
    Differential(Pin, Pin),
}

impl ChannelSpec {
    /// Column label for this channel (`sP2`, `dP0P1`); the volts column
    /// appends `_v`.
    pub fn label(&self) -> String {
        match self {
            ChannelSpec::Single(pin) => format!("s{}", pin),
            ChannelSpec::Differential(plus, minus) => format!("d{}{}", plus, minus),
        }
    }
}

/// Settings of the ADC protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdcSettings {
    /// Programmable gain applied to every channel.
    #[serde(default = "default_gain")]
    pub gain: Gain,
    /// Sweeps averaged into one logged sample. At least 1.
    #[serde(default = "default_smoothing")]
    pub smoothing: u32,
    /// Channels sampled each sweep, in column order.
    pub channels: Vec<ChannelSpec>,
}

impl AdcSettings {
    /// Semantic validation, run before `init()`.
    pub fn validate(&self) -> DaqResult<()> {
        if self.smoothing < 1 {
            return Err(DaqError::Configuration(
                "smoothing must be at least 1 sweep".into(),
            ));
        }
        if self.channels.is_empty() {
            return Err(DaqError::Configuration(
                "at least one channel must be configured".into(),
            ));
        }
        let mut labels = HashSet::new();
        for channel in &self.channels {
            if !labels.insert(channel.label()) {
                return Err(DaqError::Configuration(format!(
                    "duplicate channel '{}'",
                    channel.label()
                )));
            }
        }
        Ok(())
    }
}

/// Complete configuration of a pressure gauge run, as loaded from a TOML
/// settings file with `[logger]` and `[gauge]` tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureRunConfig {
    /// Logger core settings.
    pub logger: LoggerSettings,
    /// Gauge protocol settings.
    pub gauge: PressureGaugeSettings,
}

impl PressureRunConfig {
    /// Load and validate a settings file.
    pub fn load(path: &Path) -> DaqResult<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let run: Self = cfg.try_deserialize()?;
        run.validate()?;
        Ok(run)
    }

    /// Semantic validation of both sections.
    pub fn validate(&self) -> DaqResult<()> {
        self.logger.validate()?;
        self.gauge.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn logger_settings_validate_bounds() {
        let mut settings = LoggerSettings::new("PG", ".");
        settings.validate().unwrap();

        settings.buffer_size = 0;
        assert!(settings.validate().is_err());

        settings.buffer_size = 1;
        settings.sample_rate = 0.0;
        assert!(settings.validate().is_err());

        settings.sample_rate = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
            [logger]
            name = "PG"
            extra_knob = 1

            [gauge]
            port = "/dev/ttyUSB0"
        "#;
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let parsed = cfg.try_deserialize::<PressureRunConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn pressure_run_config_parses_with_defaults() {
        let toml = r#"
            [logger]
            name = "PG"
            buffer_size = 20
            sample_rate = 10.0

            [gauge]
            port = "/dev/ttyUSB0"
            smoothing = 4
        "#;
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let run: PressureRunConfig = cfg.try_deserialize().unwrap();
        run.validate().unwrap();
        assert_eq!(run.gauge.baud, 9600);
        assert_eq!(run.gauge.timeout_ms, 1000);
        assert_eq!(run.logger.buffer_size, 20);
    }

    #[test]
    fn gain_accepts_the_supported_steps() {
        assert_eq!(Gain::try_from(0.666_666_666_666_666_6), Ok(Gain::TwoThirds));
        assert_eq!(Gain::try_from(1.0), Ok(Gain::One));
        assert_eq!(Gain::try_from(16.0), Ok(Gain::Sixteen));
        assert!(Gain::try_from(3.0).is_err());
    }

    #[test]
    fn channel_labels_match_the_column_convention() {
        assert_eq!(ChannelSpec::Single(Pin::P2).label(), "sP2");
        assert_eq!(
            ChannelSpec::Differential(Pin::P0, Pin::P1).label(),
            "dP0P1"
        );
    }

    #[test]
    fn adc_settings_parse_channel_specs() {
        let toml = r#"
            gain = 1.0
            smoothing = 10
            channels = [
                { differential = ["P0", "P1"] },
                { single = "P2" },
                { single = "P3" },
            ]
        "#;
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let settings: AdcSettings = cfg.try_deserialize().unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.channels.len(), 3);
        assert_eq!(
            settings.channels[0],
            ChannelSpec::Differential(Pin::P0, Pin::P1)
        );
    }

    #[test]
    fn adc_settings_reject_duplicate_channels() {
        let settings = AdcSettings {
            gain: Gain::One,
            smoothing: 1,
            channels: vec![ChannelSpec::Single(Pin::P2), ChannelSpec::Single(Pin::P2)],
        };
        assert!(settings.validate().is_err());
    }
}
