//! Resistance thermometer protocol.
//!
//! The SPI driver for the RTD amplifier is an external collaborator; this
//! protocol consumes it as an opaque [`RtdSensor`] capability and logs one
//! `(timestamp, resistance, temperature)` sample per tick.

use async_trait::async_trait;
use tracing::info;

use super::{epoch_seconds, transpose, Protocol, Sample};
use crate::storage::{Columns, Schema};
use crate::DaqResult;

/// Raw-sample capability of a resistance thermometer.
pub trait RtdSensor: Send {
    /// Element resistance in ohms.
    fn resistance(&mut self) -> DaqResult<f64>;
    /// Converted temperature in degrees Celsius.
    fn temperature(&mut self) -> DaqResult<f64>;
}

/// RTD protocol over an injected sensor.
pub struct Rtd {
    sensor: Box<dyn RtdSensor>,
    schema: Schema,
}

impl Rtd {
    /// New protocol instance over an already-configured sensor.
    pub fn new(sensor: Box<dyn RtdSensor>) -> Self {
        Self {
            sensor,
            schema: Schema::new()
                .with_f64("timestamp")
                .with_f64("resistance")
                .with_f64("temperature"),
        }
    }
}

#[async_trait]
impl Protocol for Rtd {
    fn name(&self) -> &str {
        "rtd"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn init(&mut self) -> DaqResult<()> {
        info!("initializing RTD");
        Ok(())
    }

    async fn read(&mut self) -> DaqResult<Sample> {
        Ok(vec![
            epoch_seconds(),
            self.sensor.resistance()?,
            self.sensor.temperature()?,
        ])
    }

    fn parse(&self, samples: &[Sample]) -> DaqResult<Columns> {
        transpose(&self.schema, samples)
    }

    async fn close(&mut self) -> DaqResult<()> {
        Ok(())
    }
}
