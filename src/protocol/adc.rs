//! ADC protocol with a channel-derived schema.
//!
//! The I2C converter driver is an external collaborator; this protocol
//! consumes it as an opaque [`AnalogSource`] capability. `init()` applies
//! the configured gain and builds the instance-owned schema from the
//! channel list: `timestamp`, then a counts column and a volts column per
//! channel, then `gain`. `read()` averages `smoothing` sweeps across all
//! channels into one sample.

use async_trait::async_trait;
use tracing::info;

use super::{epoch_seconds, transpose, Protocol, Sample};
use crate::config::{AdcSettings, ChannelSpec, Gain};
use crate::storage::{Columns, Schema};
use crate::DaqResult;

/// One raw conversion from the ADC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogReading {
    /// Raw converter counts.
    pub counts: f64,
    /// Converted input voltage.
    pub volts: f64,
}

/// Raw-sample capability of an analog-to-digital converter.
pub trait AnalogSource: Send {
    /// Apply a programmable gain setting.
    fn set_gain(&mut self, gain: Gain) -> DaqResult<()>;

    /// Convert one channel. A differential channel samples exactly the
    /// configured pin pair.
    fn sample(&mut self, channel: &ChannelSpec) -> DaqResult<AnalogReading>;
}

/// ADC protocol over an injected source.
pub struct Adc {
    settings: AdcSettings,
    source: Box<dyn AnalogSource>,
    schema: Schema,
}

impl Adc {
    /// New protocol instance; the schema is built during `init()`.
    pub fn new(settings: AdcSettings, source: Box<dyn AnalogSource>) -> Self {
        Self {
            settings,
            source,
            schema: Schema::new(),
        }
    }
}

#[async_trait]
impl Protocol for Adc {
    fn name(&self) -> &str {
        "adc"
    }

    /// Empty until `init()` has derived the columns from the channel list.
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn init(&mut self) -> DaqResult<()> {
        info!("initializing ADC");
        self.settings.validate()?;
        self.source.set_gain(self.settings.gain)?;
        info!(gain = %self.settings.gain, "gain set");

        let mut schema = Schema::new().with_f64("timestamp");
        for channel in &self.settings.channels {
            let label = channel.label();
            info!(channel = %label, "declaring channel");
            schema = schema.with_f64(&label).with_f64(format!("{}_v", label));
        }
        self.schema = schema.with_f64("gain");
        Ok(())
    }

    async fn read(&mut self) -> DaqResult<Sample> {
        let smoothing = f64::from(self.settings.smoothing);
        let mut averaged = vec![0.0; 2 * self.settings.channels.len()];
        for _ in 0..self.settings.smoothing {
            for (index, channel) in self.settings.channels.iter().enumerate() {
                let reading = self.source.sample(channel)?;
                averaged[2 * index] += reading.counts / smoothing;
                averaged[2 * index + 1] += reading.volts / smoothing;
            }
        }

        let mut sample = Vec::with_capacity(self.schema.len());
        sample.push(epoch_seconds());
        sample.extend(averaged);
        sample.push(self.settings.gain.as_f64());
        Ok(sample)
    }

    fn parse(&self, samples: &[Sample]) -> DaqResult<Columns> {
        transpose(&self.schema, samples)
    }

    async fn close(&mut self) -> DaqResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pin;
    use crate::storage::ColumnData;
    use std::sync::{Arc, Mutex};

    /// Source that records the channels it was asked to convert and returns
    /// a fixed reading per channel label.
    struct ScriptedSource {
        gain: Option<Gain>,
        sampled: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedSource {
        fn new(sampled: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                gain: None,
                sampled,
            }
        }
    }

    impl AnalogSource for ScriptedSource {
        fn set_gain(&mut self, gain: Gain) -> DaqResult<()> {
            self.gain = Some(gain);
            Ok(())
        }

        fn sample(&mut self, channel: &ChannelSpec) -> DaqResult<AnalogReading> {
            self.sampled.lock().unwrap().push(channel.label());
            let base = match channel {
                ChannelSpec::Single(Pin::P2) => 200.0,
                ChannelSpec::Single(_) => 300.0,
                ChannelSpec::Differential(_, _) => 100.0,
            };
            Ok(AnalogReading {
                counts: base,
                volts: base / 1000.0,
            })
        }
    }

    fn settings() -> AdcSettings {
        AdcSettings {
            gain: Gain::One,
            smoothing: 2,
            channels: vec![
                ChannelSpec::Differential(Pin::P0, Pin::P1),
                ChannelSpec::Single(Pin::P2),
            ],
        }
    }

    #[tokio::test]
    async fn init_builds_channel_derived_schema() {
        let sampled = Arc::default();
        let mut adc = Adc::new(settings(), Box::new(ScriptedSource::new(sampled)));
        assert!(adc.schema().is_empty());

        adc.init().await.unwrap();
        let names: Vec<_> = adc
            .schema()
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["timestamp", "dP0P1", "dP0P1_v", "sP2", "sP2_v", "gain"]
        );
    }

    #[tokio::test]
    async fn schemas_are_instance_owned() {
        // Two loggers of the same type must not share column maps.
        let mut one = Adc::new(settings(), Box::new(ScriptedSource::new(Arc::default())));
        one.init().await.unwrap();

        let mut narrow = settings();
        narrow.channels = vec![ChannelSpec::Single(Pin::P3)];
        let two = Adc::new(narrow, Box::new(ScriptedSource::new(Arc::default())));

        assert_eq!(one.schema().len(), 6);
        assert!(two.schema().is_empty());
    }

    #[tokio::test]
    async fn read_averages_sweeps_and_samples_configured_pins() {
        let sampled: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut adc = Adc::new(settings(), Box::new(ScriptedSource::new(sampled.clone())));
        adc.init().await.unwrap();

        let sample = adc.read().await.unwrap();
        assert_eq!(sample.len(), adc.schema().len());
        assert_eq!(sample[1], 100.0); // dP0P1 counts
        assert_eq!(sample[2], 0.1); // dP0P1 volts
        assert_eq!(sample[3], 200.0); // sP2 counts
        assert_eq!(sample[5], 1.0); // gain

        // smoothing=2 sweeps over both channels, differential pair included.
        let sampled = sampled.lock().unwrap().clone();
        assert_eq!(sampled, vec!["dP0P1", "sP2", "dP0P1", "sP2"]);
    }

    #[tokio::test]
    async fn parse_covers_every_channel_column() {
        let mut adc = Adc::new(settings(), Box::new(ScriptedSource::new(Arc::default())));
        adc.init().await.unwrap();

        let samples = vec![
            adc.read().await.unwrap(),
            adc.read().await.unwrap(),
        ];
        let columns = adc.parse(&samples).unwrap();
        assert_eq!(columns.len(), 6);
        assert_eq!(
            columns.get("gain"),
            Some(&ColumnData::F64(vec![1.0, 1.0]))
        );
    }
}
