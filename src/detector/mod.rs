pub mod calibrate;
pub mod state;

pub use calibrate::{run_calibration, Baseline, Thresholds};
pub use state::{Detector, DetectorSignal, DetectorState, SoundEvent};
