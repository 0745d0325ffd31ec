//! Output device discovery and selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when no needle is given.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Output config running at exactly `rate` Hz, preferring float formats.
///
/// There is no resampling stage, so a device that cannot run at the source rate is rejected.
pub fn output_config_for_rate(
    device: &cpal::Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let best = device
        .supported_output_configs()?
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .min_by_key(|range| sample_format_rank(range.sample_format()))
        .ok_or_else(|| anyhow!("device does not support {rate} Hz"))?;
    Ok(best.with_sample_rate(rate))
}

/// Prefer a fixed buffer size if the device advertises a range, capped to keep latency sane.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 4096;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout (`--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
