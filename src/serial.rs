//! Serial port abstractions for the acquisition protocols.
//!
//! The pressure gauge protocol talks to a byte-oriented serial transport but
//! never names a concrete port type: anything implementing
//! `AsyncRead + AsyncWrite` can stand in, which is how the protocol tests
//! substitute an in-memory [`tokio::io::duplex`] pair for real hardware.
//!
//! - [`SerialPortIO`]: trait alias combining the async I/O traits
//! - [`DynSerial`]: type-erased boxed serial port
//! - [`open_serial`]: open a real port via `tokio-serial` (feature-gated)
//! - [`drain_input`]: discard stale buffered input before a fresh exchange

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};

/// Trait alias for async serial port I/O.
///
/// Satisfied by `tokio_serial::SerialStream` (real hardware) and by
/// `tokio::io::DuplexStream` (tests).
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Open a serial port with standard settings (8N1, no flow control).
///
/// The blocking open call runs on a `spawn_blocking` thread so it cannot
/// stall the acquisition runtime.
///
/// # Errors
///
/// Returns [`crate::DaqError::Instrument`] if the port cannot be opened —
/// for the logger this is a fatal startup failure.
#[cfg(feature = "instrument_serial")]
pub async fn open_serial(port_path: &str, baud_rate: u32) -> crate::DaqResult<DynSerial> {
    use crate::DaqError;
    use tokio_serial::SerialPortBuilderExt;

    let path = port_path.to_string();
    let port = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                DaqError::Instrument(format!("failed to open serial port {}: {}", path, e))
            })
    })
    .await
    .map_err(|e| DaqError::Instrument(format!("serial open task failed: {}", e)))??;

    Ok(Box::new(port))
}

/// Discard whatever input is already buffered or arrives within `window`.
///
/// Reads and throws away data until the port goes quiet for one full
/// `window`. Used after enabling or disabling streaming mode so the next
/// framed read starts on a fresh line rather than on a stale fragment.
///
/// Returns the number of bytes discarded.
pub async fn drain_input<R: AsyncBufRead + Unpin>(port: &mut R, window: Duration) -> usize {
    let mut discarded = 0usize;
    loop {
        let filled = match tokio::time::timeout(window, port.fill_buf()).await {
            Ok(Ok(buf)) => buf.len(),
            Ok(Err(_)) | Err(_) => break, // I/O error or port went quiet
        };
        if filled == 0 {
            break; // EOF
        }
        port.consume(filled);
        discarded += filled;
    }
    discarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn drain_discards_stale_bytes() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut port = BufReader::new(device);

        host.write_all(b"stale data 12345").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let discarded = drain_input(&mut port, Duration::from_millis(25)).await;
        assert_eq!(discarded, 16);
    }

    #[tokio::test]
    async fn drain_on_quiet_port_returns_zero() {
        let (_host, device) = tokio::io::duplex(64);
        let mut port = BufReader::new(device);

        let discarded = drain_input(&mut port, Duration::from_millis(10)).await;
        assert_eq!(discarded, 0);
    }
}
