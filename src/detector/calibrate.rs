//! Quiet-baseline calibration and threshold derivation.

use std::time::{Duration, Instant};
use tracing::info;

use crate::audio::level::block_rms;
use crate::audio::BlockSource;
use crate::config::DetectorConfig;

const BLOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Mean and sample standard deviation of the per-block loudness observed
/// during one calibration run. Produced whole, never updated in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub stddev: f64,
}

/// Hysteresis pair derived from a `Baseline`. `exit <= enter` is not
/// guaranteed by construction (see `derive_thresholds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub enter: u32,
    pub exit: u32,
}

impl Thresholds {
    /// The conservative pair used before any calibration has run: both
    /// thresholds pinned at the absolute floor.
    pub fn floor(min_rms: u32) -> Self {
        Thresholds { enter: min_rms, exit: min_rms }
    }
}

/// Mean and sample standard deviation (n-1 denominator, or 1 when a
/// single metric was collected). Zero metrics yields the degenerate
/// zero baseline, which pins the thresholds at the floor downstream.
pub fn baseline_of(metrics: &[u32]) -> Baseline {
    if metrics.is_empty() {
        return Baseline { mean: 0.0, stddev: 0.0 };
    }
    let n = metrics.len() as f64;
    let mean = metrics.iter().map(|&m| m as f64).sum::<f64>() / n;
    let denom = if metrics.len() > 1 { n - 1.0 } else { 1.0 };
    let variance = metrics
        .iter()
        .map(|&m| {
            let d = m as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / denom;
    Baseline { mean, stddev: variance.sqrt() }
}

/// Derive the hysteresis pair from a baseline.
///
/// ENTER is the strictest of: the floor, mean scaled by the multiplier,
/// and mean + k_sigma deviations. EXIT is the strictest of: the floor, a
/// ratio of ENTER, and mean + exit_k_sigma_min deviations (the sigma
/// clamp keeps EXIT above the noise floor so events end promptly).
/// Exotic tuning can put EXIT above ENTER; the pair is reported as
/// derived, not silently reordered.
pub fn derive_thresholds(baseline: &Baseline, config: &DetectorConfig) -> Thresholds {
    let enter_by_ratio = (baseline.mean * config.enter_multiplier).floor() as u32;
    let enter_by_sigma = (baseline.mean + config.enter_k_sigma * baseline.stddev).floor() as u32;
    let enter = config.min_rms.max(enter_by_ratio).max(enter_by_sigma);

    let exit_by_ratio = (enter as f64 * config.exit_ratio).floor() as u32;
    let exit_by_sigma =
        (baseline.mean + config.exit_k_sigma_min * baseline.stddev).floor() as u32;
    let exit = config.min_rms.max(exit_by_ratio).max(exit_by_sigma);

    Thresholds { enter, exit }
}

/// Capture the quiet baseline and derive fresh thresholds.
///
/// Blocks the caller for up to `calibration_ms`, or until the target
/// metric count (duration / block duration, minimum 1) is reached,
/// whichever comes first. Zero-RMS blocks (underrun) are skipped and do
/// not count toward the target.
pub fn run_calibration<S: BlockSource>(source: &mut S, config: &DetectorConfig) -> Thresholds {
    info!(duration_ms = config.calibration_ms, "calibrating quiet-room baseline");

    let block_ms = config.block_ms().max(1);
    let target = ((config.calibration_ms / block_ms) as usize).max(1);
    let deadline = Instant::now() + Duration::from_millis(config.calibration_ms);

    let mut metrics: Vec<u32> = Vec::with_capacity(target);
    while Instant::now() < deadline && metrics.len() < target {
        let Some(block) = source.next_block(BLOCK_TIMEOUT) else {
            continue;
        };
        let rms = block_rms(&block);
        if rms > 0 {
            metrics.push(rms);
        }
    }

    let baseline = baseline_of(&metrics);
    let thresholds = derive_thresholds(&baseline, config);
    info!(
        blocks = metrics.len(),
        mean = baseline.mean,
        std = baseline.stddev,
        "baseline captured"
    );
    info!(enter = thresholds.enter, exit = thresholds.exit, "thresholds derived");
    thresholds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_of_empty_is_degenerate() {
        let b = baseline_of(&[]);
        assert_eq!(b.mean, 0.0);
        assert_eq!(b.stddev, 0.0);
    }

    #[test]
    fn baseline_of_single_metric_has_zero_spread() {
        let b = baseline_of(&[250]);
        assert_eq!(b.mean, 250.0);
        assert_eq!(b.stddev, 0.0);
    }

    #[test]
    fn baseline_uses_sample_stddev() {
        // mean 600, squared deviations 100^2 + 100^2, n-1 = 1
        let b = baseline_of(&[500, 700]);
        assert_eq!(b.mean, 600.0);
        assert!((b.stddev - 20_000f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn quiet_room_pins_thresholds_at_floor() {
        // Constant metric 100: candidates 120 and 100 both lose to the floor.
        let config = DetectorConfig::default();
        let t = derive_thresholds(&Baseline { mean: 100.0, stddev: 0.0 }, &config);
        assert_eq!(t, Thresholds { enter: 600, exit: 600 });
    }

    #[test]
    fn sigma_candidate_dominates_noisy_baseline() {
        let config = DetectorConfig::default();
        let b = baseline_of(&[500, 700]);
        let t = derive_thresholds(&b, &config);
        // enter = max(600, floor(720), floor(600 + 4 * 141.42..)) = 1165
        assert_eq!(t.enter, 1165);
        // exit = max(600, floor(1165 * 0.85), floor(600 + 141.42..)) = 990
        assert_eq!(t.exit, 990);
    }

    #[test]
    fn degenerate_baseline_yields_floor_pair() {
        let config = DetectorConfig::default();
        let t = derive_thresholds(&baseline_of(&[]), &config);
        assert_eq!(t, Thresholds::floor(config.min_rms));
    }

    #[test]
    fn inverted_pair_is_not_silently_reordered() {
        // exit_k_sigma_min above enter_k_sigma produces EXIT > ENTER; the
        // derivation reports it as-is.
        let config = DetectorConfig {
            min_rms: 10,
            enter_multiplier: 1.0,
            enter_k_sigma: 1.0,
            exit_ratio: 0.85,
            exit_k_sigma_min: 3.0,
            ..DetectorConfig::default()
        };
        let t = derive_thresholds(&Baseline { mean: 100.0, stddev: 50.0 }, &config);
        assert_eq!(t.enter, 150);
        assert_eq!(t.exit, 250);
        assert!(t.exit > t.enter);
    }
}
