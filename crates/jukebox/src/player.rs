//! Playback controller.
//!
//! Owns the audio engine and the [`PlaybackState`]. Only the main control loop drives it: play
//! requests from the NFC task arrive as [`PlayerCommand`]s, seeks come from the buttons and the
//! volume from the knob. Every change is mirrored into the shared status read by `/status`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use audio_player::{AudioEngine, SeekOutcome};
use jukebox_types::PlaybackEndReason;

use crate::error::PlaybackError;
use crate::input::InputEvent;
use crate::power::PowerControl;
use crate::status::SharedPlayerStatus;

/// Commands sent to the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play {
        path: PathBuf,
        /// Tag that requested the track, for logging.
        tag_id: Option<String>,
    },
}

/// Seek distance per button press, in seconds (backward is negative).
#[derive(Debug, Clone, Copy)]
pub struct SeekSteps {
    pub forward_secs: i64,
    pub backward_secs: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_track: Option<PathBuf>,
    pub volume: u8,
    pub position: Duration,
}

pub struct PlaybackController<E, P> {
    engine: E,
    power: P,
    steps: SeekSteps,
    state: PlaybackState,
    duration: Option<Duration>,
    end_reason: Option<PlaybackEndReason>,
    power_requested: bool,
    status: SharedPlayerStatus,
}

impl<E: AudioEngine, P: PowerControl> PlaybackController<E, P> {
    pub(crate) fn new(
        mut engine: E,
        power: P,
        steps: SeekSteps,
        initial_volume: u8,
        status: SharedPlayerStatus,
    ) -> Self {
        engine.set_volume(initial_volume);
        let controller = Self {
            engine,
            power,
            steps,
            state: PlaybackState {
                volume: initial_volume,
                ..PlaybackState::default()
            },
            duration: None,
            end_reason: None,
            power_requested: false,
            status,
        };
        controller.publish();
        controller
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Switch to `path`. A track that cannot be opened leaves the controller idle.
    pub fn play(&mut self, path: &Path) -> Result<(), PlaybackError> {
        self.state.current_track = Some(path.to_path_buf());
        self.state.position = Duration::ZERO;
        self.end_reason = None;

        let result = match self.engine.open(path) {
            Ok(info) => {
                self.state.is_playing = true;
                self.duration = info.duration;
                tracing::info!(
                    path = %path.display(),
                    duration_ms = info.duration.map(|d| d.as_millis() as u64),
                    codec = info.codec.as_deref().unwrap_or("?"),
                    "playing"
                );
                Ok(())
            }
            Err(source) => {
                self.state.is_playing = false;
                self.duration = None;
                self.end_reason = Some(PlaybackEndReason::Error);
                Err(PlaybackError::TrackUnavailable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        self.publish();
        result
    }

    pub fn stop(&mut self) {
        if self.state.current_track.is_none() && !self.state.is_playing {
            return;
        }
        self.engine.stop();
        self.finish(PlaybackEndReason::Stopped);
    }

    /// Relative seek; ignored while nothing plays. Seeking past the end finishes the track.
    pub fn seek(&mut self, delta_secs: i64) -> SeekOutcome {
        if !self.state.is_playing {
            return SeekOutcome::Idle;
        }
        let outcome = self.engine.seek(delta_secs);
        match outcome {
            SeekOutcome::Moved(to) => {
                tracing::debug!(delta_secs, position_ms = to.as_millis() as u64, "seek");
                self.state.position = to;
                self.publish();
            }
            SeekOutcome::PastEnd => {
                self.engine.stop();
                self.finish(PlaybackEndReason::Eof);
            }
            SeekOutcome::Idle => {}
        }
        outcome
    }

    pub fn handle_input(&mut self, event: InputEvent) -> SeekOutcome {
        match event {
            InputEvent::Forward => self.seek(self.steps.forward_secs),
            InputEvent::Backward => self.seek(self.steps.backward_secs),
        }
    }

    /// Returns false when `level` is already applied.
    pub fn set_volume(&mut self, level: u8) -> bool {
        if level == self.state.volume {
            return false;
        }
        self.engine.set_volume(level);
        self.state.volume = level;
        tracing::debug!(volume = level, "volume");
        self.publish();
        true
    }

    /// Track position and natural end of track.
    pub fn tick(&mut self) {
        if !self.state.is_playing {
            return;
        }
        self.state.position = self.engine.position();
        if self.engine.is_finished() {
            self.engine.stop();
            self.finish(PlaybackEndReason::Eof);
        } else {
            self.publish();
        }
    }

    pub fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play { path, tag_id } => {
                if let Err(PlaybackError::TrackUnavailable { path, source }) = self.play(&path) {
                    tracing::warn!(
                        tag_id = tag_id.as_deref().unwrap_or("-"),
                        path = %path.display(),
                        error = %source,
                        "track unavailable"
                    );
                }
            }
        }
    }

    /// Ask the platform to power off. Only the first call has an effect.
    pub fn request_power_down(&mut self) -> bool {
        if self.power_requested {
            return false;
        }
        self.power_requested = true;
        self.power.request_shutdown();
        true
    }

    fn finish(&mut self, reason: PlaybackEndReason) {
        if let Some(track) = self.state.current_track.take() {
            tracing::info!(path = %track.display(), reason = ?reason, "playback ended");
        }
        self.state.is_playing = false;
        self.state.position = Duration::ZERO;
        self.duration = None;
        self.end_reason = Some(reason);
        self.publish();
    }

    fn publish(&self) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        match &self.state.current_track {
            Some(track) => {
                status.now_playing = Some(track.display().to_string());
                status.is_playing = self.state.is_playing;
                status.elapsed_ms = Some(self.state.position.as_millis() as u64);
                status.duration_ms = self.duration.map(|d| d.as_millis() as u64);
            }
            None => status.clear_playback(),
        }
        status.volume = self.state.volume;
        status.end_reason = self.end_reason;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeEngine;
    use super::*;
    use crate::power::testing::CountingPower;
    use crate::status::PlayerStatus;

    const STEPS: SeekSteps = SeekSteps {
        forward_secs: 30,
        backward_secs: -10,
    };

    fn controller(
        engine: &FakeEngine,
    ) -> (
        PlaybackController<FakeEngine, CountingPower>,
        CountingPower,
        SharedPlayerStatus,
    ) {
        let power = CountingPower::default();
        let status = PlayerStatus::shared(10, 21);
        let c = PlaybackController::new(engine.clone(), power.clone(), STEPS, 10, status.clone());
        (c, power, status)
    }

    #[test]
    fn play_switches_track_and_publishes_status() {
        let engine = FakeEngine::with_duration(180);
        let (mut c, _, status) = controller(&engine);
        c.play(Path::new("/music/song1.mp3")).unwrap();
        assert!(c.state().is_playing);
        assert_eq!(
            c.state().current_track.as_deref(),
            Some(Path::new("/music/song1.mp3"))
        );
        let s = status.lock().unwrap();
        assert_eq!(s.now_playing.as_deref(), Some("/music/song1.mp3"));
        assert_eq!(s.duration_ms, Some(180_000));
        assert!(s.is_playing);
    }

    #[test]
    fn unavailable_track_is_reported_and_leaves_controller_idle() {
        let engine = FakeEngine::default();
        engine
            .inspect()
            .missing
            .push(PathBuf::from("/music/gone.mp3"));
        let (mut c, _, status) = controller(&engine);
        let err = c.play(Path::new("/music/gone.mp3")).unwrap_err();
        assert!(matches!(err, PlaybackError::TrackUnavailable { .. }));
        assert!(!c.state().is_playing);
        assert_eq!(
            status.lock().unwrap().end_reason,
            Some(PlaybackEndReason::Error)
        );

        // A later command still works.
        c.apply(PlayerCommand::Play {
            path: PathBuf::from("/music/ok.mp3"),
            tag_id: None,
        });
        assert!(c.state().is_playing);
    }

    #[test]
    fn buttons_seek_and_clamp_at_start() {
        let engine = FakeEngine::with_duration(300);
        let (mut c, _, _) = controller(&engine);
        c.play(Path::new("a.mp3")).unwrap();
        assert_eq!(
            c.handle_input(InputEvent::Forward),
            SeekOutcome::Moved(Duration::from_secs(30))
        );
        c.handle_input(InputEvent::Backward);
        c.handle_input(InputEvent::Backward);
        c.handle_input(InputEvent::Backward);
        assert_eq!(c.state().position, Duration::ZERO);
    }

    #[test]
    fn seeking_past_end_ends_the_track() {
        let engine = FakeEngine::with_duration(40);
        let (mut c, _, status) = controller(&engine);
        c.play(Path::new("a.mp3")).unwrap();
        c.seek(30);
        assert_eq!(c.seek(30), SeekOutcome::PastEnd);
        assert!(!c.state().is_playing);
        assert_eq!(
            status.lock().unwrap().end_reason,
            Some(PlaybackEndReason::Eof)
        );
    }

    #[test]
    fn seek_while_idle_is_ignored() {
        let engine = FakeEngine::default();
        let (mut c, _, _) = controller(&engine);
        assert_eq!(c.handle_input(InputEvent::Forward), SeekOutcome::Idle);
    }

    #[test]
    fn unchanged_volume_is_not_reapplied() {
        let engine = FakeEngine::default();
        let (mut c, _, _) = controller(&engine);
        assert!(!c.set_volume(10));
        assert!(c.set_volume(12));
        assert_eq!(engine.inspect().volume, Some(12));
        assert!(!c.set_volume(12));
    }

    #[test]
    fn tick_detects_end_of_track() {
        let engine = FakeEngine::with_duration(60);
        let (mut c, _, _) = controller(&engine);
        c.play(Path::new("a.mp3")).unwrap();
        engine.inspect().position = Duration::from_secs(12);
        c.tick();
        assert_eq!(c.state().position, Duration::from_secs(12));
        engine.inspect().finished = true;
        c.tick();
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_track, None);
    }

    #[test]
    fn power_down_is_requested_once() {
        let engine = FakeEngine::default();
        let (mut c, power, _) = controller(&engine);
        assert!(c.request_power_down());
        assert!(!c.request_power_down());
        assert_eq!(power.count(), 1);
    }

    #[test]
    fn stop_unloads_engine() {
        let engine = FakeEngine::with_duration(60);
        let (mut c, _, _) = controller(&engine);
        c.play(Path::new("a.mp3")).unwrap();
        c.stop();
        assert!(!c.state().is_playing);
        assert_eq!(engine.inspect().stops, 1);
        c.stop();
        assert_eq!(engine.inspect().stops, 1);
    }
}
