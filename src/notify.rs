//! Outbound event notification: one ASCII line per finished event over a
//! best-effort byte transport.

use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

use crate::detector::SoundEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The outbound transport collaborator (serial link, socket, ...). One
/// short write per event; implementations supply their own non-blocking
/// or short-timeout semantics.
pub trait Transport {
    fn send(&mut self, line: &[u8]) -> Result<(), NotifyError>;
}

/// Transport over any byte sink — a serial device file like
/// `/dev/ttyUSB0`, or stdout.
pub struct WriterTransport<W: Write>(pub W);

impl<W: Write> Transport for WriterTransport<W> {
    fn send(&mut self, line: &[u8]) -> Result<(), NotifyError> {
        self.0.write_all(line)?;
        self.0.flush()?;
        Ok(())
    }
}

/// Wire format: `NOISE <duration_ms> <peak_dbfs two-decimal>\n`.
pub fn format_line(event: &SoundEvent) -> String {
    format!("NOISE {} {:.2}\n", event.duration_ms, event.peak_dbfs)
}

/// Formats and attempts a single delivery. Transport failure is logged
/// and swallowed; it never reaches the detection loop and is never
/// retried.
pub struct Notifier<T: Transport> {
    transport: T,
}

impl<T: Transport> Notifier<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn notify(&mut self, event: &SoundEvent) {
        let line = format_line(event);
        match self.transport.send(line.as_bytes()) {
            Ok(()) => debug!(line = line.trim_end(), "event notified"),
            Err(e) => warn!("event notification failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_is_exact() {
        let event = SoundEvent { duration_ms: 1234, peak_dbfs: -12.345 };
        assert_eq!(format_line(&event), "NOISE 1234 -12.35\n");
    }

    #[test]
    fn line_format_pads_decimals() {
        let event = SoundEvent { duration_ms: 40, peak_dbfs: -3.0 };
        assert_eq!(format_line(&event), "NOISE 40 -3.00\n");
    }

    #[test]
    fn failing_transport_is_absorbed() {
        struct Broken;
        impl Transport for Broken {
            fn send(&mut self, _line: &[u8]) -> Result<(), NotifyError> {
                Err(NotifyError::Io(std::io::Error::other("line down")))
            }
        }
        let mut notifier = Notifier::new(Broken);
        // Must not panic or propagate.
        notifier.notify(&SoundEvent { duration_ms: 10, peak_dbfs: -20.0 });
    }
}
