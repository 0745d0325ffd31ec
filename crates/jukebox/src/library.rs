//! Music folder listing and file management for the web UI.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use jukebox_types::SongEntry;
use thiserror::Error;

use crate::error::MappingError;
use crate::gateway::ConfigGateway;

/// Extensions offered in the song list (decodable by the engine).
pub const SONG_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "aac"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Exists(String),
    #[error("{0} is mapped to a tag")]
    InUse(String),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub mappings_updated: bool,
    pub persist_warning: Option<String>,
}

fn io_err<'a>(
    op: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> LibraryError + 'a {
    move |source| LibraryError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

pub fn is_song(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SONG_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// A plain file name inside the music folder (no separators, no dot-dirs).
fn checked_name(name: &str) -> Result<&str, LibraryError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\n', '\r', '\0'])
        || !is_song(trimmed);
    if bad {
        return Err(LibraryError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

/// Songs in `music_dir`, sorted by name. A missing folder lists as empty.
pub fn list_songs(music_dir: &Path) -> Result<Vec<SongEntry>, LibraryError> {
    let entries = match fs::read_dir(music_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err("list", music_dir)(e)),
    };
    let mut songs = Vec::new();
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !meta.is_file() || !is_song(&name) {
            continue;
        }
        let timestamp = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        songs.push(SongEntry {
            name,
            size: meta.len(),
            timestamp,
        });
    }
    songs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(songs)
}

/// Rename a song and re-point any mappings that referenced it.
pub fn rename_song(
    music_dir: &Path,
    gateway: &ConfigGateway,
    old_name: &str,
    new_name: &str,
) -> Result<Renamed, LibraryError> {
    let old_name = checked_name(old_name)?;
    let new_name = checked_name(new_name)?;
    let files = gateway.lock_files();
    let from = music_dir.join(old_name);
    let to = music_dir.join(new_name);
    if !from.is_file() {
        return Err(LibraryError::NotFound(old_name.to_string()));
    }
    if to.exists() {
        return Err(LibraryError::Exists(new_name.to_string()));
    }
    fs::rename(&from, &to).map_err(io_err("rename", &from))?;
    tracing::info!(from = %old_name, to = %new_name, "song renamed");

    if !files.references(old_name) {
        drop(files);
        gateway.note_activity();
        return Ok(Renamed {
            mappings_updated: false,
            persist_warning: None,
        });
    }
    let outcome = files.rename_track(old_name, new_name)?;
    Ok(Renamed {
        mappings_updated: outcome.value > 0,
        persist_warning: outcome.persist_warning,
    })
}

/// Delete a song unless a mapping still points at it.
pub fn delete_song(
    music_dir: &Path,
    gateway: &ConfigGateway,
    name: &str,
) -> Result<(), LibraryError> {
    let name = checked_name(name)?;
    let files = gateway.lock_files();
    if files.references(name) {
        return Err(LibraryError::InUse(name.to_string()));
    }
    let path = music_dir.join(name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        Err(e) => return Err(io_err("delete", &path)(e)),
    }
    drop(files);
    tracing::info!(name = %name, "song deleted");
    gateway.note_activity();
    Ok(())
}
