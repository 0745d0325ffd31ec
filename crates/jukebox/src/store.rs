//! Bounded tag-to-track mapping table.
//!
//! All access goes through [`SharedStore`], a single mutex shared by the NFC task and the
//! configuration gateway, so a reader never observes a half-applied mutation.

use std::sync::{Arc, Mutex, MutexGuard};

use jukebox_types::TagMapping;

use crate::error::MappingError;

pub const MAX_TAG_ID_LEN: usize = 32;
pub const MAX_TRACK_PATH_LEN: usize = 255;

/// Canonical tag form shared with the reader: separators and whitespace dropped, upper-cased.
pub fn canonical_tag_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validated tag identifier in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagId(String);

impl TagId {
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let valid_char = |c: char| c.is_ascii_alphanumeric() || c == ':' || c == '-';
        if !raw.trim().chars().all(valid_char) {
            return Err(MappingError::InvalidTagId(raw.to_string()));
        }
        let id = canonical_tag_id(raw);
        if id.is_empty() || id.len() > MAX_TAG_ID_LEN {
            return Err(MappingError::InvalidTagId(raw.to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated track path, relative to the music folder or absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPath(String);

impl TrackPath {
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let path = raw.trim();
        if path.is_empty()
            || path.len() > MAX_TRACK_PATH_LEN
            || path.contains(['\n', '\r'])
        {
            return Err(MappingError::InvalidTrackPath(raw.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Replaced { previous: String },
}

#[derive(Debug)]
pub struct MappingStore {
    entries: Vec<TagMapping>,
    max_slots: usize,
}

impl MappingStore {
    pub fn new(max_slots: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_slots,
        }
    }

    /// Build from persisted rows, skipping invalid rows and rows past `max_slots`.
    pub fn from_rows(max_slots: usize, rows: Vec<TagMapping>) -> Self {
        let mut store = Self::new(max_slots);
        for row in rows {
            let parsed = TagId::parse(&row.tag_id)
                .and_then(|tag| TrackPath::parse(&row.track_path).map(|track| (tag, track)));
            let result = parsed.and_then(|(tag, track)| store.upsert(tag, track));
            if let Err(e) = result {
                tracing::warn!(tag_id = %row.tag_id, error = %e, "skipping stored mapping");
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, tag_id: &str) -> Option<usize> {
        let tag_id = canonical_tag_id(tag_id);
        self.entries.iter().position(|m| m.tag_id == tag_id)
    }

    pub fn resolve(&self, tag_id: &str) -> Option<String> {
        self.position(tag_id)
            .map(|i| self.entries[i].track_path.clone())
    }

    /// Replace in place when the tag is known, otherwise append.
    pub fn upsert(&mut self, tag: TagId, track: TrackPath) -> Result<Upserted, MappingError> {
        if let Some(i) = self.position(tag.as_str()) {
            let previous = std::mem::replace(&mut self.entries[i].track_path, track.0);
            return Ok(Upserted::Replaced { previous });
        }
        if self.entries.len() >= self.max_slots {
            return Err(MappingError::SlotsExhausted {
                max_slots: self.max_slots,
            });
        }
        self.entries.push(TagMapping::new(tag.0, track.0));
        Ok(Upserted::Inserted)
    }

    pub fn remove(&mut self, tag_id: &str) -> bool {
        match self.position(tag_id) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<TagMapping> {
        self.entries.clone()
    }

    /// Point every mapping of `old` at `new`. Returns how many changed.
    pub fn rename_track(&mut self, old: &str, new: &TrackPath) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|m| m.track_path == old) {
            entry.track_path = new.0.clone();
            changed += 1;
        }
        changed
    }

    pub fn references(&self, track: &str) -> bool {
        self.entries.iter().any(|m| m.track_path == track)
    }
}

/// Cloneable handle to the one store instance.
#[derive(Clone, Debug)]
pub struct SharedStore {
    inner: Arc<Mutex<MappingStore>>,
}

impl SharedStore {
    pub fn new(store: MappingStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Lock for a compound operation (mutate then snapshot).
    pub fn lock(&self) -> MutexGuard<'_, MappingStore> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resolve(&self, tag_id: &str) -> Option<String> {
        self.lock().resolve(tag_id)
    }

    pub fn upsert(&self, tag_id: &str, track_path: &str) -> Result<Upserted, MappingError> {
        let tag = TagId::parse(tag_id)?;
        let track = TrackPath::parse(track_path)?;
        self.lock().upsert(tag, track)
    }

    pub fn remove(&self, tag_id: &str) -> bool {
        self.lock().remove(tag_id)
    }

    pub fn list(&self) -> Vec<TagMapping> {
        self.lock().list()
    }

    pub fn references(&self, track: &str) -> bool {
        self.lock().references(track)
    }
}
