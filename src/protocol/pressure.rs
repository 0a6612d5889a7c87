//! Serial pressure gauge protocol.
//!
//! Request/response state machine over a byte-oriented serial transport.
//! Commands are fixed ASCII strings terminated by a carriage return;
//! responses are read up to the next carriage return and decoded as text.
//! A read timeout yields the partial (possibly empty) response rather than
//! an error — the subsequent value parse fails loudly on it instead of
//! defaulting to zero.
//!
//! One `read()` cycle: enable streaming, drain stale input, average
//! `smoothing` streamed lines (pressure and temperature are the two leading
//! comma-delimited fields; each line contributes `value/smoothing`, and the
//! wall clock is accumulated the same way), disable streaming, then query
//! the device's running maximum and minimum and reset its min/max
//! accumulators.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, warn};

use super::{epoch_seconds, transpose, Protocol, Sample};
use crate::config::PressureGaugeSettings;
use crate::serial::{drain_input, DynSerial};
use crate::storage::{Columns, Schema};
use crate::{DaqError, DaqResult};

const AUTO_SHUTDOWN_OFF: &[u8] = b"HC_AUTO_OFF\r";
const AUTO_SHUTDOWN_ON: &[u8] = b"HC_AUTO_ON\r";
const STREAM_ON: &[u8] = b"STREAM_ON\r";
const STREAM_OFF: &[u8] = b"STREAM_OFF\r";
const QUERY_UNIT_PRES: &[u8] = b"PRES_UNIT?\r";
const QUERY_UNIT_TEMP: &[u8] = b"TEMP_UNIT?\r";
const QUERY_FAULT: &[u8] = b"FAULT?\r";
const QUERY_TARE: &[u8] = b"TARE?\r";
const QUERY_ID: &[u8] = b"*IDN?\r";
const QUERY_MIN: &[u8] = b"MIN?\r";
const QUERY_MAX: &[u8] = b"MAX?\r";
const RESET_MINMAX: &[u8] = b"MINMAX_RST\r";
const RESET_FAULT: &[u8] = b"*CLS\r";

const TERMINATOR: u8 = b'\r';

/// How long the input side may stay busy before a drain gives up.
const DRAIN_WINDOW: Duration = Duration::from_millis(25);

/// Pressure gauge protocol over a serial transport.
pub struct PressureGauge {
    settings: PressureGaugeSettings,
    schema: Schema,
    port: Option<BufReader<DynSerial>>,
}

impl PressureGauge {
    /// New protocol instance; the port opens during `init()`.
    pub fn new(settings: PressureGaugeSettings) -> Self {
        Self {
            settings,
            schema: Schema::new()
                .with_f64("timestamp")
                .with_f64("pressure")
                .with_f64("temperature")
                .with_f64("pressure_max")
                .with_f64("pressure_min"),
            port: None,
        }
    }

    /// Instance over an already-open transport, for tests and mocks.
    #[cfg(test)]
    fn with_port(settings: PressureGaugeSettings, port: DynSerial) -> Self {
        let mut gauge = Self::new(settings);
        gauge.port = Some(BufReader::new(port));
        gauge
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    fn port(&mut self) -> DaqResult<&mut BufReader<DynSerial>> {
        self.port
            .as_mut()
            .ok_or_else(|| DaqError::Instrument("serial port not connected".into()))
    }

    /// Send a command; no response is expected.
    async fn command(&mut self, command: &'static [u8]) -> DaqResult<()> {
        let port = self.port()?;
        port.get_mut()
            .write_all(command)
            .await
            .map_err(|e| DaqError::Instrument(format!("serial write failed: {}", e)))?;
        port.get_mut()
            .flush()
            .await
            .map_err(|e| DaqError::Instrument(format!("serial flush failed: {}", e)))?;
        Ok(())
    }

    /// Send a query and return its response.
    async fn query(&mut self, command: &'static [u8]) -> DaqResult<String> {
        self.command(command).await?;
        self.read_response().await
    }

    /// Read up to the next carriage return and strip it.
    ///
    /// A timeout returns whatever arrived so far — possibly nothing — and
    /// leaves it to the caller's value parse to reject it.
    async fn read_response(&mut self) -> DaqResult<String> {
        let timeout = self.timeout();
        let port = self.port()?;
        let mut raw = Vec::new();
        match tokio::time::timeout(timeout, port.read_until(TERMINATOR, &mut raw)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(DaqError::Instrument(format!("serial read failed: {}", e)))
            }
            Err(_) => {} // timed out; keep the partial response
        }
        if raw.last() == Some(&TERMINATOR) {
            raw.pop();
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn drain(&mut self) {
        if let Some(port) = self.port.as_mut() {
            let discarded = drain_input(port, DRAIN_WINDOW).await;
            if discarded > 0 {
                debug!(discarded, "discarded stale serial input");
            }
        }
    }
}

#[async_trait]
impl Protocol for PressureGauge {
    fn name(&self) -> &str {
        "pressure_gauge"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    #[instrument(skip(self), err)]
    async fn init(&mut self) -> DaqResult<()> {
        self.settings.validate()?;
        if self.port.is_none() {
            self.port = Some(BufReader::new(open_port(&self.settings).await?));
        }
        self.drain().await;

        // Identification is the one step that must succeed.
        let id = self.query(QUERY_ID).await?;
        if id.is_empty() {
            return Err(DaqError::Instrument(
                "pressure gauge did not respond to identification query".into(),
            ));
        }
        info!(device = %id, "serial device found");

        let fault = self.query(QUERY_FAULT).await?;
        if !fault.is_empty() {
            warn!(fault = %fault, "device reports fault");
        }
        self.command(RESET_FAULT).await?;

        let unit = self.query(QUERY_UNIT_TEMP).await?;
        info!(unit = %unit, "temperature unit");
        let unit = self.query(QUERY_UNIT_PRES).await?;
        info!(unit = %unit, "pressure unit");
        let tare = self.query(QUERY_TARE).await?;
        info!(tare = %tare, "tare");

        self.command(AUTO_SHUTDOWN_OFF).await?;
        Ok(())
    }

    async fn read(&mut self) -> DaqResult<Sample> {
        let smoothing = f64::from(self.settings.smoothing);

        self.command(STREAM_ON).await?;
        self.drain().await;

        let (mut timestamp, mut pressure, mut temperature) = (0.0, 0.0, 0.0);
        for _ in 0..self.settings.smoothing {
            let line = self.read_response().await?;
            let (p, t) = stream_fields(&line)?;
            timestamp += epoch_seconds() / smoothing;
            pressure += p / smoothing;
            temperature += t / smoothing;
        }

        self.command(STREAM_OFF).await?;
        self.drain().await;

        let response = self.query(QUERY_MAX).await?;
        let pressure_max = leading_field(&response)?;
        let response = self.query(QUERY_MIN).await?;
        let pressure_min = leading_field(&response)?;
        self.command(RESET_MINMAX).await?;

        Ok(vec![
            timestamp,
            pressure,
            temperature,
            pressure_max,
            pressure_min,
        ])
    }

    fn parse(&self, samples: &[Sample]) -> DaqResult<Columns> {
        transpose(&self.schema, samples)
    }

    async fn close(&mut self) -> DaqResult<()> {
        if self.port.is_none() {
            return Ok(());
        }
        debug!("closing pressure gauge");
        // Best effort: a dead transport must not stop teardown.
        let _ = self.command(STREAM_OFF).await;
        let _ = self.command(AUTO_SHUTDOWN_ON).await;
        self.drain().await;
        self.port = None;
        Ok(())
    }
}

#[cfg(feature = "instrument_serial")]
async fn open_port(settings: &PressureGaugeSettings) -> DaqResult<DynSerial> {
    crate::serial::open_serial(&settings.port, settings.baud).await
}

#[cfg(not(feature = "instrument_serial"))]
async fn open_port(_settings: &PressureGaugeSettings) -> DaqResult<DynSerial> {
    Err(DaqError::SerialFeatureDisabled)
}

/// Split a streamed line into its pressure and temperature fields.
fn stream_fields(response: &str) -> DaqResult<(f64, f64)> {
    let mut fields = response.split(',');
    let pressure = fields
        .next()
        .ok_or_else(|| DaqError::malformed(response, "empty response"))?;
    let temperature = fields.next().ok_or_else(|| {
        DaqError::malformed(response, "expected two comma-delimited fields")
    })?;
    Ok((
        parse_value(pressure, response)?,
        parse_value(temperature, response)?,
    ))
}

/// Parse the field before the first comma (`MAX?`/`MIN?` responses carry a
/// trailing unit field).
fn leading_field(response: &str) -> DaqResult<f64> {
    let field = response.split(',').next().unwrap_or(response);
    parse_value(field, response)
}

fn parse_value(field: &str, response: &str) -> DaqResult<f64> {
    field
        .trim()
        .parse()
        .map_err(|_| DaqError::malformed(response, format!("'{}' is not a number", field)))
}
