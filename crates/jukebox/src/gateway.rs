//! Configuration gateway: the only writer of the mapping store besides startup.
//!
//! Writers take `write_lock` for the whole mutate-then-save sequence so saves land in mutation
//! order. The store mutex is held only for the in-memory change and the snapshot that gets saved,
//! so the NFC task keeps resolving while a save is in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use jukebox_types::TagMapping;

use crate::error::MappingError;
use crate::persist::MappingPersistence;
use crate::store::{MappingStore, SharedStore, TagId, TrackPath, Upserted};
use crate::watchdog::ActivityClock;

/// Result of an accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOutcome<T> {
    pub value: T,
    /// Listing after the mutation.
    pub mappings: Vec<TagMapping>,
    /// Set when the mutation could not be saved; the in-memory table still has it.
    pub persist_warning: Option<String>,
}

pub struct ConfigGateway {
    store: SharedStore,
    persistence: Arc<dyn MappingPersistence>,
    activity: ActivityClock,
    write_lock: Mutex<()>,
}

impl ConfigGateway {
    pub fn new(
        store: SharedStore,
        persistence: Arc<dyn MappingPersistence>,
        activity: ActivityClock,
    ) -> Self {
        Self {
            store,
            persistence,
            activity,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Vec<TagMapping> {
        self.store.list()
    }

    /// Hold off every mapping change while a music file is renamed or deleted.
    pub fn lock_files(&self) -> FileGuard<'_> {
        FileGuard {
            gateway: self,
            _writer: self.writer(),
        }
    }

    /// Record a user action that did not go through the table (file operations).
    pub fn note_activity(&self) {
        self.activity.touch();
    }

    pub fn upsert(
        &self,
        tag_id: &str,
        track_path: &str,
    ) -> Result<GatewayOutcome<Upserted>, MappingError> {
        let tag = TagId::parse(tag_id)?;
        let track = TrackPath::parse(track_path)?;
        self.mutate(|store| {
            let tag_id = tag.as_str().to_string();
            let upserted = store.upsert(tag, track)?;
            tracing::info!(tag_id = %tag_id, ?upserted, "mapping saved");
            Ok(upserted)
        })
    }

    /// `value` is false when the tag had no mapping; nothing is saved then.
    pub fn remove(&self, tag_id: &str) -> GatewayOutcome<bool> {
        let _writer = self.writer();
        let (removed, mappings) = {
            let mut store = self.store.lock();
            let removed = store.remove(tag_id);
            (removed, store.list())
        };
        if !removed {
            return GatewayOutcome {
                value: false,
                mappings,
                persist_warning: None,
            };
        }
        tracing::info!(tag_id = %tag_id.trim(), "mapping removed");
        self.finish(true, mappings)
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut MappingStore) -> Result<T, MappingError>,
    ) -> Result<GatewayOutcome<T>, MappingError> {
        let _writer = self.writer();
        self.mutate_locked(apply)
    }

    // Called with the write lock held.
    fn mutate_locked<T>(
        &self,
        apply: impl FnOnce(&mut MappingStore) -> Result<T, MappingError>,
    ) -> Result<GatewayOutcome<T>, MappingError> {
        let (value, mappings) = {
            let mut store = self.store.lock();
            let value = apply(&mut *store)?;
            (value, store.list())
        };
        Ok(self.finish(value, mappings))
    }

    // Called with the write lock held.
    fn finish<T>(&self, value: T, mappings: Vec<TagMapping>) -> GatewayOutcome<T> {
        self.activity.touch();
        let persist_warning = match self.persistence.save(&mappings) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "mappings not persisted; keeping in-memory table");
                Some(e.to_string())
            }
        };
        GatewayOutcome {
            value,
            mappings,
            persist_warning,
        }
    }
}

/// Writer lock held across a file operation and the mapping update that follows it.
pub struct FileGuard<'a> {
    gateway: &'a ConfigGateway,
    _writer: MutexGuard<'a, ()>,
}

impl FileGuard<'_> {
    pub fn references(&self, track: &str) -> bool {
        self.gateway.store.references(track)
    }

    /// Re-point mappings after a file rename. Returns how many mappings changed.
    pub fn rename_track(
        &self,
        old: &str,
        new: &str,
    ) -> Result<GatewayOutcome<usize>, MappingError> {
        let new = TrackPath::parse(new)?;
        self.gateway
            .mutate_locked(|store| Ok(store.rename_track(old, &new)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::persist::testing::MemoryPersistence;
    use std::sync::atomic::Ordering;

    fn gateway(max_slots: usize) -> (ConfigGateway, Arc<MemoryPersistence>, ActivityClock) {
        let persistence = Arc::new(MemoryPersistence::default());
        let activity = ActivityClock::new(ManualClock::at(0));
        let gw = ConfigGateway::new(
            SharedStore::new(MappingStore::new(max_slots)),
            persistence.clone(),
            activity.clone(),
        );
        (gw, persistence, activity)
    }

    #[test]
    fn upsert_touches_activity_and_saves_listing() {
        let (gw, persistence, activity) = gateway(20);
        let out = gw.upsert("04a1", "song1.mp3").unwrap();
        assert_eq!(out.value, Upserted::Inserted);
        assert_eq!(out.mappings, vec![TagMapping::new("04A1", "song1.mp3")]);
        assert_eq!(out.persist_warning, None);
        assert_eq!(activity.touch_count(), 1);
        assert_eq!(persistence.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn rejected_mutations_neither_save_nor_touch() {
        let (gw, persistence, activity) = gateway(1);
        gw.upsert("A1", "a.mp3").unwrap();
        let err = gw.upsert("B2", "b.mp3").unwrap_err();
        assert_eq!(err, MappingError::SlotsExhausted { max_slots: 1 });
        assert!(matches!(
            gw.upsert("", "b.mp3"),
            Err(MappingError::InvalidTagId(_))
        ));
        assert!(!gw.remove("ZZ").value);
        assert_eq!(activity.touch_count(), 1);
        assert_eq!(persistence.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_save_keeps_in_memory_change() {
        let (gw, persistence, _) = gateway(20);
        persistence.fail_saves.store(true, Ordering::SeqCst);
        let out = gw.upsert("A1", "a.mp3").unwrap();
        assert!(out.persist_warning.unwrap().contains("disk full"));
        assert_eq!(gw.list().len(), 1);
    }

    #[test]
    fn remove_saves_the_shrunk_listing() {
        let (gw, persistence, _) = gateway(20);
        gw.upsert("A1", "a.mp3").unwrap();
        gw.upsert("B2", "b.mp3").unwrap();
        let out = gw.remove("A1");
        assert!(out.value);
        let saved = persistence.saved.lock().unwrap();
        assert_eq!(saved.last().unwrap(), &vec![TagMapping::new("B2", "b.mp3")]);
    }

    #[test]
    fn rename_track_reports_changed_count() {
        let (gw, _, _) = gateway(20);
        gw.upsert("A1", "old.mp3").unwrap();
        let files = gw.lock_files();
        let out = files.rename_track("old.mp3", "new.mp3").unwrap();
        assert_eq!(out.value, 1);
        assert!(files.references("new.mp3"));
        assert!(!files.references("old.mp3"));
    }

    #[test]
    fn file_guard_holds_off_new_mappings() {
        let (gw, _, _) = gateway(20);
        let gw = Arc::new(gw);
        let files = gw.lock_files();
        assert!(!files.references("song.mp3"));

        let writer = {
            let gw = gw.clone();
            std::thread::spawn(move || gw.upsert("A1", "song.mp3").unwrap())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(gw.list().is_empty());
        assert!(!files.references("song.mp3"));

        drop(files);
        writer.join().unwrap();
        assert_eq!(gw.list(), vec![TagMapping::new("A1", "song.mp3")]);
    }

    #[test]
    fn concurrent_writers_save_in_mutation_order() {
        let (gw, persistence, _) = gateway(20);
        let gw = Arc::new(gw);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gw = gw.clone();
                std::thread::spawn(move || {
                    gw.upsert(&format!("T{i}"), "x.mp3").unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let saved = persistence.saved.lock().unwrap();
        assert_eq!(saved.len(), 8);
        for (n, listing) in saved.iter().enumerate() {
            assert_eq!(listing.len(), n + 1);
        }
    }
}
