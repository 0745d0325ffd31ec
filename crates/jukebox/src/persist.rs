//! Mapping persistence.
//!
//! File format: one `tag_id,track_path` per line, split at the first comma so track paths may
//! contain commas. Blank lines and `#` comments are ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use jukebox_types::TagMapping;

use crate::error::PersistenceError;

pub trait MappingPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<TagMapping>, PersistenceError>;
    fn save(&self, mappings: &[TagMapping]) -> Result<(), PersistenceError>;
}

/// Text file on local storage.
#[derive(Debug, Clone)]
pub struct MappingFile {
    path: PathBuf,
    max_rows: usize,
}

impl MappingFile {
    pub fn new(path: impl Into<PathBuf>, max_rows: usize) -> Self {
        Self {
            path: path.into(),
            max_rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

impl MappingPersistence for MappingFile {
    /// A missing file is an empty table. Lines that are not UTF-8 are skipped, and the file is
    /// copied to `<name>.bak` first so the next save cannot lose them.
    fn load(&self) -> Result<Vec<TagMapping>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let parsed = parse_mappings(&bytes, self.max_rows);
        if parsed.undecodable_lines > 0 {
            let backup = self.sibling_path("bak");
            fs::copy(&self.path, &backup).map_err(|source| PersistenceError::Write {
                path: backup.clone(),
                source,
            })?;
            tracing::warn!(
                lines = parsed.undecodable_lines,
                backup = %backup.display(),
                "mappings: undecodable lines skipped, original kept as backup"
            );
        }
        Ok(parsed.rows)
    }

    fn save(&self, mappings: &[TagMapping]) -> Result<(), PersistenceError> {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.sibling_path("tmp");
        fs::write(&tmp, format_mappings(mappings)).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedMappings {
    pub rows: Vec<TagMapping>,
    pub undecodable_lines: usize,
}

/// Each line is decoded on its own; one bad byte costs only that line.
pub fn parse_mappings(bytes: &[u8], max_rows: usize) -> ParsedMappings {
    let mut parsed = ParsedMappings::default();
    let rows = &mut parsed.rows;
    for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!(line = idx + 1, "mappings: not UTF-8, line skipped");
            parsed.undecodable_lines += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((tag_id, track_path)) = line.split_once(',') else {
            tracing::warn!(line = idx + 1, "mappings: missing comma, line skipped");
            continue;
        };
        let (tag_id, track_path) = (tag_id.trim(), track_path.trim());
        if tag_id.is_empty() || track_path.is_empty() {
            tracing::warn!(line = idx + 1, "mappings: empty field, line skipped");
            continue;
        }
        if rows.len() >= max_rows {
            tracing::warn!(line = idx + 1, max_rows, "mappings: table full, line skipped");
            continue;
        }
        rows.push(TagMapping::new(tag_id, track_path));
    }
    parsed
}

pub fn format_mappings(mappings: &[TagMapping]) -> String {
    mappings
        .iter()
        .map(|m| format!("{},{}\n", m.tag_id, m.track_path))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("jukebox-{label}-{nanos}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parse_splits_at_first_comma_and_skips_noise() {
        let text = "# tags\n\n04A1,song1.mp3\nbroken line\n04B2, live, at home.mp3 \n,x.mp3\n";
        let rows = parse_mappings(text.as_bytes(), 20).rows;
        assert_eq!(
            rows,
            vec![
                TagMapping::new("04A1", "song1.mp3"),
                TagMapping::new("04B2", "live, at home.mp3"),
            ]
        );
    }

    #[test]
    fn parse_stops_at_max_rows() {
        let text = "A,a.mp3\nB,b.mp3\nC,c.mp3\n";
        assert_eq!(parse_mappings(text.as_bytes(), 2).rows.len(), 2);
    }

    #[test]
    fn bad_bytes_cost_one_line_and_keep_a_backup() {
        let dir = temp_dir("utf8");
        let path = dir.join("mappings.txt");
        let original = b"04A1,song1.mp3\r\n04B2,song2.mp3\n04C3,Mot\xF6rhead.mp3\n".to_vec();
        fs::write(&path, &original).unwrap();
        let file = MappingFile::new(&path, 20);

        let rows = file.load().unwrap();
        assert_eq!(
            rows,
            vec![
                TagMapping::new("04A1", "song1.mp3"),
                TagMapping::new("04B2", "song2.mp3"),
            ]
        );
        assert_eq!(fs::read(dir.join("mappings.txt.bak")).unwrap(), original);

        file.save(&rows).unwrap();
        assert_eq!(file.load().unwrap().len(), 2);
        assert_eq!(fs::read(dir.join("mappings.txt.bak")).unwrap(), original);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = temp_dir("unreadable");
        let file = MappingFile::new(&dir, 20);
        assert!(matches!(file.load(), Err(PersistenceError::Read { .. })));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_loads_empty() {

        let dir = temp_dir("missing");
        let file = MappingFile::new(dir.join("mappings.txt"), 20);
        assert!(file.load().unwrap().is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_replaces_file_and_leaves_no_temp() {
        let dir = temp_dir("save");
        let file = MappingFile::new(dir.join("mappings.txt"), 20);
        file.save(&[TagMapping::new("A1", "a.mp3")]).unwrap();
        file.save(&[
            TagMapping::new("A1", "a.mp3"),
            TagMapping::new("B2", "b.mp3"),
        ])
        .unwrap();
        let text = fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "A1,a.mp3\nB2,b.mp3\n");
        assert!(!dir.join("mappings.txt.tmp").exists());
        assert_eq!(file.load().unwrap().len(), 2);
        let _ = fs::remove_dir_all(dir);
    }
}
