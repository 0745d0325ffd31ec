//! NFC poll and resolve task.
//!
//! Polls the reader on its own thread. Playback is started on the edge where a new tag appears;
//! a tag that stays on the reader is looked up once. Removing the tag leaves playback running.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::error::ReaderError;
use crate::player::PlayerCommand;
use crate::status::TagPresence;
use crate::store::SharedStore;
use crate::watchdog::ActivityClock;

/// Non-blocking access to the tag reader.
pub trait TagReader: Send {
    /// UID of the tag on the reader, `None` when the field is empty.
    fn try_read_tag(&mut self) -> Result<Option<String>, ReaderError>;
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No tag, none tracked.
    Idle,
    /// The tracked tag is still present.
    Held,
    Started { tag_id: String, path: PathBuf },
    UnknownTag(String),
    /// The tracked tag left the reader.
    Removed(String),
}

pub struct NfcPoller<R> {
    reader: R,
    tracked: Option<String>,
    store: SharedStore,
    music_dir: PathBuf,
    commands: Sender<PlayerCommand>,
    activity: ActivityClock,
    presence: TagPresence,
}

impl<R: TagReader> NfcPoller<R> {
    pub fn new(
        reader: R,
        store: SharedStore,
        music_dir: PathBuf,
        commands: Sender<PlayerCommand>,
        activity: ActivityClock,
        presence: TagPresence,
    ) -> Self {
        Self {
            reader,
            tracked: None,
            store,
            music_dir,
            commands,
            activity,
            presence,
        }
    }

    pub fn poll_once(&mut self) -> PollOutcome {
        let seen = match self.reader.try_read_tag() {
            Ok(seen) => seen,
            Err(e) => {
                tracing::debug!(error = %e, "tag read failed");
                None
            }
        };
        self.presence.set(seen.clone());

        let Some(tag_id) = seen else {
            return match self.tracked.take() {
                Some(prev) => {
                    tracing::info!(tag_id = %prev, "tag removed");
                    PollOutcome::Removed(prev)
                }
                None => PollOutcome::Idle,
            };
        };
        if self.tracked.as_deref() == Some(tag_id.as_str()) {
            return PollOutcome::Held;
        }
        self.tracked = Some(tag_id.clone());

        let Some(track) = self.store.resolve(&tag_id) else {
            tracing::info!(tag_id = %tag_id, "unknown tag");
            return PollOutcome::UnknownTag(tag_id);
        };
        let path = resolve_track_path(&self.music_dir, &track);
        tracing::info!(tag_id = %tag_id, path = %path.display(), "tag mapped");
        self.activity.touch();
        let command = PlayerCommand::Play {
            path: path.clone(),
            tag_id: Some(tag_id.clone()),
        };
        if self.commands.send(command).is_err() {
            tracing::warn!("control loop gone; play request dropped");
        }
        PollOutcome::Started { tag_id, path }
    }
}

/// Mapped paths are relative to the music folder unless absolute.
pub fn resolve_track_path(music_dir: &Path, track: &str) -> PathBuf {
    let path = Path::new(track);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        music_dir.join(path)
    }
}

/// Running poll thread.
pub struct NfcTaskHandle {
    stop_tx: Sender<()>,
    join: thread::JoinHandle<()>,
}

impl NfcTaskHandle {
    /// Halt the thread and wait for it; an in-flight poll completes first.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.join.join().is_err() {
            tracing::warn!("nfc thread panicked");
        }
    }
}

pub fn spawn_nfc_task<R: TagReader + 'static>(
    mut poller: NfcPoller<R>,
    interval: Duration,
) -> std::io::Result<NfcTaskHandle> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let join = thread::Builder::new()
        .name("nfc-poll".to_string())
        .spawn(move || {
            tracing::info!(interval_ms = interval.as_millis() as u64, "nfc polling started");
            loop {
                poller.poll_once();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::info!("nfc polling stopped");
        })?;
    Ok(NfcTaskHandle { stop_tx, join })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::TagReader;
    use crate::error::ReaderError;

    /// Replays scripted reads; `None` once the script runs out.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedReader {
        pub(crate) script: Arc<Mutex<VecDeque<Result<Option<String>, ReaderError>>>>,
    }

    impl ScriptedReader {
        pub(crate) fn push_tag(&self, tag: Option<&str>) {
            self.script
                .lock()
                .unwrap()
                .push_back(Ok(tag.map(str::to_string)));
        }

        pub(crate) fn push_error(&self) {
            self.script
                .lock()
                .unwrap()
                .push_back(Err(ReaderError::Malformed("??".to_string())));
        }
    }

    impl TagReader for ScriptedReader {
        fn try_read_tag(&mut self) -> Result<Option<String>, ReaderError> {
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }
}
