use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer;
use tracing::{error, info, warn};

use super::convert::sample_to_frame;
use crate::config::DetectorConfig;

/// Desktop stand-in for the I2S capture driver. Pulls mono samples from
/// the default input device and pushes them into the ring buffer encoded
/// in the mic's 24-bit-in-32 frame layout, so the downstream decode path
/// runs against the same wire format the hardware produces.
pub struct AudioCapture {
    _stream: cpal::Stream,
    pub sample_rate: u32,
}

impl AudioCapture {
    pub fn new<P>(mut producer: P, detector_config: &DetectorConfig) -> Result<Self, anyhow::Error>
    where
        P: Producer<Item = u32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

        info!("Audio Input Device: {}", device.name().unwrap_or_default());

        let target_rate = detector_config.sample_rate_hz;
        let mut selected_config = None;
        for config_range in device.supported_input_configs()? {
            if config_range.min_sample_rate().0 <= target_rate
                && config_range.max_sample_rate().0 >= target_rate
            {
                selected_config = Some(config_range.with_sample_rate(cpal::SampleRate(target_rate)));
                break;
            }
        }

        let config = selected_config
            .ok_or_else(|| anyhow::anyhow!("Input device does not support {} Hz", target_rate))?;

        let channels = config.channels() as usize;
        info!("Audio Config Selected: Rate={}Hz, Channels={}", target_rate, channels);
        if channels > 1 {
            warn!("Multi-channel input; keeping channel 0 only");
        }

        let err_fn = |err| error!("an error occurred on stream: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| write_input_data(data, channels, &mut producer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| write_input_data_i16(data, channels, &mut producer),
                err_fn,
                None,
            )?,
            _ => return Err(anyhow::anyhow!("Unsupported sample format")),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate: target_rate,
        })
    }
}

fn write_input_data<P>(input: &[f32], channels: usize, producer: &mut P)
where
    P: Producer<Item = u32>,
{
    // If the producer is full we drop frames (lossy); the loop treats the
    // resulting short block as an underrun.
    for &sample in input.iter().step_by(channels) {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        let _ = producer.try_push(sample_to_frame(s));
    }
}

fn write_input_data_i16<P>(input: &[i16], channels: usize, producer: &mut P)
where
    P: Producer<Item = u32>,
{
    for &sample in input.iter().step_by(channels) {
        let _ = producer.try_push(sample_to_frame(sample));
    }
}
