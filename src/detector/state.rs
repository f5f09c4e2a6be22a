//! Hysteresis state machine over the smoothed loudness track.

use tracing::debug;

use crate::audio::level::dbfs;
use crate::config::DetectorConfig;
use crate::detector::calibrate::Thresholds;

/// One finished sound event, reported on the block where it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub duration_ms: u64,
    pub peak_dbfs: f64,
}

/// Transition reported to the caller. `Started` maps to indicator-on;
/// `Ended` carries the event to notify.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorSignal {
    Started,
    Ended(SoundEvent),
}

/// Detector state as an explicit tagged variant: all in-event bookkeeping
/// lives inside `InEvent`, so a transition resets everything at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle {
        /// Accumulated time the smoothed track has held >= ENTER.
        above_ms: u64,
    },
    InEvent {
        started_at_ms: u64,
        /// Running peak of the smoothed track.
        peak: u32,
        /// Accumulated time the smoothed track has held < EXIT.
        below_exit_ms: u64,
        last_heartbeat_ms: u64,
    },
}

/// Consumes one loudness metric per block and walks Idle <-> InEvent per
/// the hysteresis/debounce/timeout rules. Owns its thresholds; the engine
/// replaces them wholesale between iterations, never piecewise.
pub struct Detector {
    thresholds: Thresholds,
    state: DetectorState,
    /// EMA of the per-block RMS, seeded at 0.
    smooth: u32,
    /// Monotonic clock advanced one nominal block duration per step.
    clock_ms: u64,

    alpha: f64,
    block_ms: u64,
    min_duration_ms: u64,
    end_debounce_ms: u64,
    heartbeat_ms: u64,
    max_event_ms: u64,
}

impl Detector {
    pub fn new(config: &DetectorConfig, thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: DetectorState::Idle { above_ms: 0 },
            smooth: 0,
            clock_ms: 0,
            alpha: config.smoothing_alpha,
            block_ms: config.block_ms(),
            min_duration_ms: config.min_duration_ms,
            end_debounce_ms: config.end_debounce_ms,
            heartbeat_ms: config.heartbeat_ms,
            max_event_ms: config.max_event_ms,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Install a freshly derived threshold pair. Single assignment: a step
    /// sees either the old pair or the new one, never a mix.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DetectorState::InEvent { .. })
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn smoothed(&self) -> u32 {
        self.smooth
    }

    /// Force back to Idle, discarding any in-progress event without
    /// emission. Used before recalibration so no event straddles a
    /// threshold change.
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle { above_ms: 0 };
        self.smooth = 0;
    }

    /// Advance one block. Returns the transition that fired, if any.
    pub fn step(&mut self, rms: u32) -> Option<DetectorSignal> {
        self.smooth =
            (self.alpha * rms as f64 + (1.0 - self.alpha) * self.smooth as f64).round() as u32;
        self.clock_ms += self.block_ms;

        let now = self.clock_ms;
        let smooth = self.smooth;

        match self.state {
            DetectorState::Idle { above_ms } => {
                let above_ms = if smooth >= self.thresholds.enter {
                    above_ms + self.block_ms
                } else {
                    0
                };

                if above_ms >= self.min_duration_ms {
                    self.state = DetectorState::InEvent {
                        started_at_ms: now,
                        peak: smooth,
                        below_exit_ms: 0,
                        last_heartbeat_ms: now,
                    };
                    Some(DetectorSignal::Started)
                } else {
                    self.state = DetectorState::Idle { above_ms };
                    None
                }
            }
            DetectorState::InEvent {
                started_at_ms,
                peak,
                below_exit_ms,
                mut last_heartbeat_ms,
            } => {
                let peak = peak.max(smooth);

                if self.heartbeat_ms > 0 && now - last_heartbeat_ms >= self.heartbeat_ms {
                    debug!(elapsed_ms = now - started_at_ms, smooth, "event heartbeat");
                    last_heartbeat_ms = now;
                }

                let below_exit_ms = if smooth < self.thresholds.exit {
                    below_exit_ms + self.block_ms
                } else {
                    0
                };

                // Natural end (debounced). Checked before the timeout so a
                // block satisfying both emits exactly once.
                if below_exit_ms >= self.end_debounce_ms {
                    return Some(self.finish(now, started_at_ms, peak));
                }

                // Safety timeout, prevents getting stuck in very loud rooms.
                if self.max_event_ms > 0 && now - started_at_ms >= self.max_event_ms {
                    return Some(self.finish(now, started_at_ms, peak));
                }

                self.state = DetectorState::InEvent {
                    started_at_ms,
                    peak,
                    below_exit_ms,
                    last_heartbeat_ms,
                };
                None
            }
        }
    }

    fn finish(&mut self, now: u64, started_at_ms: u64, peak: u32) -> DetectorSignal {
        self.state = DetectorState::Idle { above_ms: 0 };
        DetectorSignal::Ended(SoundEvent {
            duration_ms: now - started_at_ms,
            peak_dbfs: dbfs(peak),
        })
    }
}
