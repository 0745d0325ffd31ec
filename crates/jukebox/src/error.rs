//! Error taxonomy of the jukebox core.

use std::path::PathBuf;

use audio_player::OpenError;
use thiserror::Error;

/// Rejected mapping mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("all {max_slots} mapping slots are in use")]
    SlotsExhausted { max_slots: usize },
    #[error("invalid tag id {0:?}")]
    InvalidTagId(String),
    #[error("invalid track path {0:?}")]
    InvalidTrackPath(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("track unavailable: {}", .path.display())]
    TrackUnavailable {
        path: PathBuf,
        #[source]
        source: OpenError,
    },
}

/// Transient reader failure; the next poll retries.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("tag reader io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tag uid {0:?}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("read mappings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write mappings {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
