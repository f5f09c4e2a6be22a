//! Control-surface collaborators: the recalibrate signal and the status
//! indicator. Both are externally owned hardware on the reference device;
//! here they are a shared flag and a trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Level signal from the recalibrate control (a debounced button on the
/// reference hardware). The driver `request()`s; the detection loop
/// `take()`s once per iteration.
#[derive(Clone, Debug, Default)]
pub struct RecalibrateSignal(Arc<AtomicBool>);

impl RecalibrateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read-and-clear. Returns true at most once per request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Best-effort visual status output (an LED on the reference hardware).
/// No feedback, no failure surface.
pub trait StatusIndicator {
    fn set(&mut self, on: bool);
}

/// Indicator that just logs state changes; a GPIO-backed implementation
/// is a driver concern.
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn set(&mut self, on: bool) {
        debug!(on, "status indicator");
    }
}
