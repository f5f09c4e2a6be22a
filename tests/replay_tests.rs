//! Drives the full pipeline from a real WAV file: silence, a two-second
//! burst, silence — expecting exactly one event line on the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use noisegate::audio::convert::sample_to_frame;
use noisegate::audio::{AudioBlock, BlockSource};
use noisegate::control::{RecalibrateSignal, StatusIndicator};
use noisegate::notify::{NotifyError, Transport};
use noisegate::{DetectorConfig, Engine};

struct WavSource {
    blocks: VecDeque<AudioBlock>,
    cancel: CancellationToken,
}

impl WavSource {
    /// Load a mono 16-bit WAV and encode it into mic frame blocks.
    fn load(path: &std::path::Path, block_samples: usize, cancel: CancellationToken) -> Self {
        let mut reader = hound::WavReader::open(path).expect("open replay wav");
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let blocks = samples
            .chunks(block_samples)
            .filter(|c| c.len() == block_samples)
            .map(|c| c.iter().map(|&s| sample_to_frame(s)).collect())
            .collect();
        Self { blocks, cancel }
    }
}

impl BlockSource for WavSource {
    fn next_block(&mut self, _timeout: Duration) -> Option<AudioBlock> {
        match self.blocks.pop_front() {
            Some(block) => Some(block),
            None => {
                self.cancel.cancel();
                None
            }
        }
    }
}

#[derive(Clone, Default)]
struct SharedTransport(Arc<Mutex<Vec<String>>>);

impl Transport for SharedTransport {
    fn send(&mut self, line: &[u8]) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(String::from_utf8(line.to_vec()).unwrap());
        Ok(())
    }
}

struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn set(&mut self, _on: bool) {}
}

/// Square wave at the given magnitude: RMS equals the magnitude exactly.
fn write_segment(writer: &mut hound::WavWriter<std::io::BufWriter<std::fs::File>>, amplitude: i16, seconds: f64, rate: u32) {
    let samples = (seconds * rate as f64) as usize;
    for i in 0..samples {
        let s = if i % 2 == 0 { amplitude } else { -amplitude };
        writer.write_sample(s).unwrap();
    }
}

#[test]
fn wav_burst_produces_one_event() {
    let rate = 44_100;
    let path = std::env::temp_dir().join("noisegate_replay_burst.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    write_segment(&mut writer, 100, 0.6, rate); // quiet room
    write_segment(&mut writer, 8000, 2.0, rate); // the burst
    write_segment(&mut writer, 100, 0.6, rate); // quiet tail
    writer.finalize().unwrap();

    // Short calibration window (20 blocks) leaves the default smoothing
    // and debounce behavior in place.
    let config = DetectorConfig {
        calibration_ms: 460,
        heartbeat_ms: 0,
        ..DetectorConfig::default()
    };

    let cancel = CancellationToken::new();
    let source = WavSource::load(&path, config.block_samples, cancel.clone());
    let transport = SharedTransport::default();
    let mut engine = Engine::new(
        source,
        transport.clone(),
        NullIndicator,
        RecalibrateSignal::new(),
        config,
    );
    engine.run(cancel);
    std::fs::remove_file(&path).ok();

    let lines = transport.0.lock().unwrap().clone();
    assert_eq!(lines.len(), 1, "expected exactly one event, got {lines:?}");

    let line = &lines[0];
    assert!(line.starts_with("NOISE ") && line.ends_with('\n'), "malformed line {line:?}");
    let fields: Vec<&str> = line.trim_end().split(' ').collect();
    assert_eq!(fields.len(), 3);

    // The burst sustains 2 s; the event fires after the 1 s minimum and
    // ends shortly after the burst stops, so the reported duration is a
    // bit over 1 s.
    let duration_ms: u64 = fields[1].parse().unwrap();
    assert!(
        (1000..=2000).contains(&duration_ms),
        "implausible duration {duration_ms}"
    );

    // Peak of the smoothed track approaches the burst RMS of 8000:
    // dbfs(8000) = -12.25.
    let peak_dbfs: f64 = fields[2].parse().unwrap();
    assert!(
        (-13.0..=-11.5).contains(&peak_dbfs),
        "implausible peak {peak_dbfs}"
    );
}
