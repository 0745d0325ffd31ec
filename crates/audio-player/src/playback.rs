//! Output stage (CPAL stream).
//!
//! The callback refills a local buffer from the shared queue without blocking, maps
//! channels, applies the volume gain and converts to the device sample format.
//! Underruns are filled with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SharedAudio;

/// Knobs shared between the engine and the output callback.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Max frames pulled from the queue per refill.
    pub refill_max_frames: usize,
    /// Incremented by the number of frames written to the device.
    pub played_frames: Arc<AtomicU64>,
    /// Volume level in `0..=max_volume`.
    pub volume: Arc<AtomicU8>,
    pub max_volume: u8,
}

/// Build an output stream draining `queue`. The caller starts it with `play()`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    cfg: OutputConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    cfg: OutputConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels).max(1);
    let mut local = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };
    let queue = queue.clone();
    let refill_max_frames = cfg.refill_max_frames.max(1);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let gain = volume_gain(cfg.volume.load(Ordering::Relaxed), cfg.max_volume);
            let frames = data.len() / channels_out;
            let mut filled = 0usize;

            for frame in 0..frames {
                if local.pos >= local.src.len() {
                    local.pos = 0;
                    match queue.pop_nonblocking(refill_max_frames) {
                        Some(v) => local.src = v,
                        None => {
                            local.src.clear();
                            data[frame * channels_out..]
                                .fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = local.mapped_sample(channels_out, ch) * gain;
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                filled += 1;
            }

            if filled > 0 {
                cfg.played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

/// Linear gain for a knob level; levels above `max_volume` clamp to unity.
pub fn volume_gain(level: u8, max_volume: u8) -> f32 {
    if max_volume == 0 {
        return 0.0;
    }
    f32::from(level.min(max_volume)) / f32::from(max_volume)
}

/// Samples fetched from the queue but not yet written, owned by the callback.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl LocalBuffer {
    /// Sample for output channel `dst_ch` of the current frame; advances after the last channel.
    ///
    /// mono→stereo duplicates, stereo→mono averages, anything else clamps to the last
    /// available source channel.
    fn mapped_sample(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        let start = self.pos;
        let get = |ch: usize| self.src.get(start + ch).copied().unwrap_or(0.0);
        let out = match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get(0) + get(1)),
            (src, _) => get(dst_ch.min(src.saturating_sub(1))),
        };
        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_gain_scales_linearly_and_clamps() {
        assert_eq!(volume_gain(0, 21), 0.0);
        assert_eq!(volume_gain(21, 21), 1.0);
        assert_eq!(volume_gain(30, 21), 1.0);
        assert!((volume_gain(10, 20) - 0.5).abs() < f32::EPSILON);
        assert_eq!(volume_gain(5, 0), 0.0);
    }

    #[test]
    fn mono_source_is_duplicated_to_stereo() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 1,
            src: vec![0.25, 0.75],
        };
        assert_eq!(buf.mapped_sample(2, 0), 0.25);
        assert_eq!(buf.mapped_sample(2, 1), 0.25);
        assert_eq!(buf.mapped_sample(2, 0), 0.75);
    }

    #[test]
    fn stereo_source_is_averaged_to_mono() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![0.2, 0.4],
        };
        assert!((buf.mapped_sample(1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(buf.pos, 2);
    }
}
