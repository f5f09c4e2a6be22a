use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tuning for the whole detection pipeline. Defaults match the reference
/// hardware setup (44.1 kHz I2S mic, 1024-sample blocks).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Nominal capture rate in Hz.
    pub sample_rate_hz: u32,
    /// Samples per capture block. 1024 at 44.1 kHz is ~23 ms.
    pub block_samples: usize,

    /// Quiet-baseline capture time for calibration.
    pub calibration_ms: u64,
    /// Absolute floor applied to both thresholds.
    pub min_rms: u32,
    /// ENTER candidate: baseline mean * this.
    pub enter_multiplier: f64,
    /// ENTER candidate: mean + this many standard deviations.
    pub enter_k_sigma: f64,
    /// EXIT candidate: ENTER * this.
    pub exit_ratio: f64,
    /// EXIT candidate floor: mean + this many standard deviations.
    /// Keeps EXIT above the noise floor so events end promptly.
    pub exit_k_sigma_min: f64,

    /// EMA coefficient for the smoothed loudness track.
    pub smoothing_alpha: f64,
    /// Loudness must stay above ENTER this long before an event starts.
    pub min_duration_ms: u64,
    /// Loudness must stay below EXIT this long before an event ends.
    pub end_debounce_ms: u64,
    /// Cosmetic in-event heartbeat period. 0 disables.
    pub heartbeat_ms: u64,
    /// Safety timeout forcing an event to end. 0 disables.
    pub max_event_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            sample_rate_hz: 44_100,
            block_samples: 1024,
            calibration_ms: 5_000,
            min_rms: 600,
            enter_multiplier: 1.20,
            enter_k_sigma: 4.0,
            exit_ratio: 0.85,
            exit_k_sigma_min: 1.0,
            smoothing_alpha: 0.25,
            min_duration_ms: 1_000,
            end_debounce_ms: 200,
            heartbeat_ms: 1_000,
            max_event_ms: 6_000,
        }
    }
}

impl DetectorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Nominal duration of one block in milliseconds (integer, like the
    /// accumulators that consume it).
    pub fn block_ms(&self) -> u64 {
        (self.block_samples as u64 * 1000) / self.sample_rate_hz as u64
    }
}
