//! The detection loop: one synchronous control flow pulling blocks,
//! aggregating loudness, stepping the detector, and executing its
//! transitions. All recoverable conditions are absorbed here; the loop
//! never returns an error during normal operation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::level::block_rms;
use crate::audio::BlockSource;
use crate::config::DetectorConfig;
use crate::control::{RecalibrateSignal, StatusIndicator};
use crate::detector::{run_calibration, Detector, DetectorSignal, Thresholds};
use crate::notify::{Notifier, Transport};

const BLOCK_TIMEOUT: Duration = Duration::from_millis(50);
const UNDERRUN_BACKOFF: Duration = Duration::from_millis(5);

pub struct Engine<S, T, I>
where
    S: BlockSource,
    T: Transport,
    I: StatusIndicator,
{
    source: S,
    notifier: Notifier<T>,
    indicator: I,
    recalibrate: RecalibrateSignal,
    config: DetectorConfig,
    detector: Detector,
}

impl<S, T, I> Engine<S, T, I>
where
    S: BlockSource,
    T: Transport,
    I: StatusIndicator,
{
    pub fn new(
        source: S,
        transport: T,
        indicator: I,
        recalibrate: RecalibrateSignal,
        config: DetectorConfig,
    ) -> Self {
        // Conservative floor pair until the first calibration runs.
        let detector = Detector::new(&config, Thresholds::floor(config.min_rms));
        Self {
            source,
            notifier: Notifier::new(transport),
            indicator,
            recalibrate,
            config,
            detector,
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Run until cancelled. Calibrates once up front, then cycles:
    /// poll the recalibrate signal, pull a block (bounded wait), skip
    /// no-data and underrun blocks, step the detector, execute its
    /// transitions. Persistent no-data is tolerated indefinitely.
    pub fn run(&mut self, cancel: CancellationToken) {
        self.recalibrate_now();
        info!("listening");

        while !cancel.is_cancelled() {
            if self.recalibrate.take() {
                info!("recalibrate requested");
                self.recalibrate_now();
                continue;
            }

            let Some(block) = self.source.next_block(BLOCK_TIMEOUT) else {
                continue;
            };

            let rms = block_rms(&block);
            if rms == 0 {
                // Underrun; yield briefly rather than spin.
                std::thread::sleep(UNDERRUN_BACKOFF);
                continue;
            }

            match self.detector.step(rms) {
                Some(DetectorSignal::Started) => {
                    let t = self.detector.thresholds();
                    info!(enter = t.enter, exit = t.exit, "sound event started");
                    self.indicator.set(true);
                }
                Some(DetectorSignal::Ended(event)) => {
                    info!(
                        duration_ms = event.duration_ms,
                        peak_dbfs = event.peak_dbfs,
                        "sound event ended"
                    );
                    self.indicator.set(false);
                    // Delivery failure is absorbed by the notifier; the
                    // detector is already back in Idle either way.
                    self.notifier.notify(&event);
                }
                None => {}
            }
        }
        info!("engine stopped");
    }

    /// Replace the active thresholds with a freshly calibrated pair. Any
    /// in-progress event is discarded without emission first, so no event
    /// straddles a threshold change. The indicator doubles as a busy cue
    /// for the duration of the capture.
    fn recalibrate_now(&mut self) {
        if self.detector.is_active() {
            warn!("recalibrating mid-event; in-progress event discarded");
        }
        self.detector.reset();

        self.indicator.set(true);
        let thresholds = run_calibration(&mut self.source, &self.config);
        self.indicator.set(false);

        self.detector.set_thresholds(thresholds);
    }
}
