use std::sync::{Arc, Mutex};

use jukebox_types::{JukeboxStatus, PlaybackEndReason};

use crate::watchdog::{ActivityClock, remaining_ms};

/// Playback fields published by the controller.
#[derive(Debug, Default, Clone)]
pub(crate) struct PlayerStatus {
    pub(crate) now_playing: Option<String>,
    pub(crate) is_playing: bool,
    pub(crate) elapsed_ms: Option<u64>,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) volume: u8,
    pub(crate) max_volume: u8,
    pub(crate) end_reason: Option<PlaybackEndReason>,
}

pub(crate) type SharedPlayerStatus = Arc<Mutex<PlayerStatus>>;

impl PlayerStatus {
    pub(crate) fn shared(volume: u8, max_volume: u8) -> SharedPlayerStatus {
        Arc::new(Mutex::new(Self {
            volume,
            max_volume,
            ..Self::default()
        }))
    }

    pub(crate) fn clear_playback(&mut self) {
        self.now_playing = None;
        self.is_playing = false;
        self.elapsed_ms = None;
        self.duration_ms = None;
    }
}

/// Tag currently on the reader, as last seen by the NFC task.
#[derive(Debug, Clone, Default)]
pub struct TagPresence(Arc<Mutex<Option<String>>>);

impl TagPresence {
    pub fn set(&self, tag_id: Option<String>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = tag_id;
    }

    pub fn current(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Everything `/status` reports, gathered from the owning components.
#[derive(Clone)]
pub(crate) struct StatusSources {
    pub(crate) player: SharedPlayerStatus,
    pub(crate) presence: TagPresence,
    pub(crate) activity: ActivityClock,
    pub(crate) shutdown_timeout_ms: u64,
}

impl StatusSources {
    pub(crate) fn snapshot(&self) -> JukeboxStatus {
        let player = self
            .player
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let shutdown_in_ms = remaining_ms(
            self.activity.last_activity_ms(),
            self.shutdown_timeout_ms,
            self.activity.now_ms(),
        );
        JukeboxStatus {
            now_playing: player.now_playing,
            is_playing: player.is_playing,
            elapsed_ms: player.elapsed_ms,
            duration_ms: player.duration_ms,
            volume: player.volume,
            max_volume: player.max_volume,
            tag_id: self.presence.current(),
            shutdown_in_ms: Some(shutdown_in_ms),
            end_reason: player.end_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;

    #[test]
    fn snapshot_reports_time_until_shutdown_and_visible_tag() {
        let clock = ManualClock::at(1_000);
        let sources = StatusSources {
            player: PlayerStatus::shared(10, 21),
            presence: TagPresence::default(),
            activity: ActivityClock::new(clock.clone()),
            shutdown_timeout_ms: 120_000,
        };
        sources.presence.set(Some("04A1".to_string()));
        clock.advance(20_000);

        let snap = sources.snapshot();
        assert_eq!(snap.shutdown_in_ms, Some(100_000));
        assert_eq!(snap.tag_id.as_deref(), Some("04A1"));
        assert_eq!(snap.volume, 10);
        assert!(!snap.is_playing);
    }
}
