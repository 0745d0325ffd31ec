//! Audio engine facade used by the playback controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Sender;
use thiserror::Error;

use crate::config::PlaybackConfig;
use crate::decode::{self, DecodeControl};
use crate::device;
use crate::playback::{self, OutputConfig};
use crate::queue::{SharedAudio, calc_max_buffered_samples};

/// Why a track could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported or corrupt media: {0}")]
    Media(#[from] symphonia::core::errors::Error),
    #[error("no audio track")]
    NoAudioTrack,
    #[error("unknown sample rate or channel layout")]
    UnknownSpec,
    #[error("output device: {0}")]
    Output(String),
}

/// Details of an opened track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub duration: Option<Duration>,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: Option<String>,
}

/// Result of a relative seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Playback continues from this position.
    Moved(Duration),
    /// The target lies at or beyond the end of the track; the track is now finished.
    PastEnd,
    /// Nothing is loaded.
    Idle,
}

/// Operations the playback controller needs from an audio backend.
pub trait AudioEngine {
    /// Open `path` and start playing it, replacing whatever was loaded.
    fn open(&mut self, path: &Path) -> Result<TrackInfo, OpenError>;
    /// Stop and unload the current track. No-op when idle.
    fn stop(&mut self);
    /// Apply a volume level in `0..=max_volume`.
    fn set_volume(&mut self, level: u8);
    /// Jump by `delta_secs` (negative rewinds). Clamps at the start of the track.
    fn seek(&mut self, delta_secs: i64) -> SeekOutcome;
    /// Elapsed position of the current track.
    fn position(&self) -> Duration;
    /// True once the current track played out (or nothing is loaded).
    fn is_finished(&self) -> bool;
}

/// Compute where a relative seek lands.
pub fn seek_target(position: Duration, duration: Option<Duration>, delta_secs: i64) -> SeekOutcome {
    let delta = Duration::from_secs(delta_secs.unsigned_abs());
    let target = if delta_secs >= 0 {
        position.saturating_add(delta)
    } else {
        position.saturating_sub(delta)
    };
    match duration {
        Some(total) if target >= total => SeekOutcome::PastEnd,
        _ => SeekOutcome::Moved(target),
    }
}

struct Session {
    // Dropping the stream stops output.
    _stream: cpal::Stream,
    queue: Arc<SharedAudio>,
    control_tx: Sender<DecodeControl>,
    played_frames: Arc<AtomicU64>,
    sample_rate: u32,
    duration: Option<Duration>,
}

impl Session {
    fn position(&self) -> Duration {
        let frames = self.played_frames.load(Ordering::Relaxed);
        Duration::from_millis(frames.saturating_mul(1000) / u64::from(self.sample_rate.max(1)))
    }

    fn finish(&self) {
        let _ = self.control_tx.send(DecodeControl::Stop);
        self.queue.close();
        self.queue.clear();
    }
}

/// Symphonia + CPAL engine. Must stay on the thread that created it (CPAL streams are not `Send`
/// on every host).
pub struct CpalEngine {
    host: cpal::Host,
    config: PlaybackConfig,
    volume: Arc<AtomicU8>,
    max_volume: u8,
    session: Option<Session>,
}

impl CpalEngine {
    pub fn new(config: PlaybackConfig, initial_volume: u8, max_volume: u8) -> Self {
        Self {
            host: cpal::default_host(),
            config,
            volume: Arc::new(AtomicU8::new(initial_volume.min(max_volume))),
            max_volume,
            session: None,
        }
    }

    fn start_session(&mut self, path: &Path) -> Result<(Session, TrackInfo), OpenError> {
        let source = decode::open_file(path)?;
        let output_err = |e: anyhow::Error| OpenError::Output(format!("{e:#}"));

        let device = device::pick_device(&self.host, self.config.device.as_deref())
            .map_err(output_err)?;
        let supported =
            device::output_config_for_rate(&device, source.sample_rate).map_err(output_err)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }

        let info = TrackInfo {
            duration: source.duration,
            sample_rate: source.sample_rate,
            channels: u16::try_from(source.channels).unwrap_or(u16::MAX),
            codec: source.codec.clone(),
        };
        let capacity = calc_max_buffered_samples(
            source.sample_rate,
            source.channels,
            self.config.buffer_seconds,
        );
        let queue = Arc::new(SharedAudio::new(source.channels, capacity));
        let played_frames = Arc::new(AtomicU64::new(0));

        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            &queue,
            OutputConfig {
                refill_max_frames: self.config.refill_max_frames,
                played_frames: played_frames.clone(),
                volume: self.volume.clone(),
                max_volume: self.max_volume,
            },
        )
        .map_err(output_err)?;

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        decode::spawn_decoder(source, queue.clone(), control_rx);
        stream
            .play()
            .map_err(|e| OpenError::Output(e.to_string()))?;

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            rate_hz = info.sample_rate,
            channels = info.channels,
            codec = info.codec.as_deref().unwrap_or("?"),
            "output started"
        );

        let session = Session {
            _stream: stream,
            queue,
            control_tx,
            played_frames,
            sample_rate: info.sample_rate,
            duration: info.duration,
        };
        Ok((session, info))
    }
}

impl AudioEngine for CpalEngine {
    fn open(&mut self, path: &Path) -> Result<TrackInfo, OpenError> {
        self.stop();
        let (session, info) = self.start_session(path)?;
        self.session = Some(session);
        Ok(info)
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.finish();
        }
    }

    fn set_volume(&mut self, level: u8) {
        self.volume
            .store(level.min(self.max_volume), Ordering::Relaxed);
    }

    fn seek(&mut self, delta_secs: i64) -> SeekOutcome {
        let Some(session) = self.session.as_ref() else {
            return SeekOutcome::Idle;
        };
        let outcome = seek_target(session.position(), session.duration, delta_secs);
        match outcome {
            SeekOutcome::Moved(to) => {
                let _ = session.control_tx.send(DecodeControl::Seek(to));
                session.queue.clear();
                let frames = to.as_millis() as u64 * u64::from(session.sample_rate) / 1000;
                session.played_frames.store(frames, Ordering::Relaxed);
            }
            SeekOutcome::PastEnd => session.finish(),
            SeekOutcome::Idle => {}
        }
        outcome
    }

    fn position(&self) -> Duration {
        self.session
            .as_ref()
            .map(Session::position)
            .unwrap_or_default()
    }

    fn is_finished(&self) -> bool {
        self.session
            .as_ref()
            .is_none_or(|s| s.queue.is_drained())
    }
}
