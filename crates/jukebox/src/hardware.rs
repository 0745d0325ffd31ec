//! Linux adapters for the reader, buttons and volume knob.
//!
//! The NFC reader is driven by an external daemon that writes the UID of the tag in the field to
//! a file (and empties or removes it when the field is clear). Buttons are sysfs GPIO value files
//! wired active-low; the knob is an IIO raw ADC channel.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::ReaderError;
use crate::input::{ButtonLevels, InputPins};
use crate::nfc::TagReader;
use crate::store::{MAX_TAG_ID_LEN, canonical_tag_id};

pub struct FileTagReader {
    path: PathBuf,
}

impl FileTagReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TagReader for FileTagReader {
    fn try_read_tag(&mut self) -> Result<Option<String>, ReaderError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => normalize_uid(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReaderError::Io(e)),
        }
    }
}

/// `"04 a1:B2"` -> `"04A1B2"`; empty input means no tag.
pub fn normalize_uid(raw: &str) -> Result<Option<String>, ReaderError> {
    let uid = canonical_tag_id(raw);
    if uid.is_empty() {
        return Ok(None);
    }
    if !uid.chars().all(|c| c.is_ascii_hexdigit()) || uid.len() > MAX_TAG_ID_LEN {
        return Err(ReaderError::Malformed(raw.trim().to_string()));
    }
    Ok(Some(uid))
}

/// GPIO/IIO value files. Unconfigured or unreadable inputs read as released / unsampled.
#[derive(Debug, Clone, Default)]
pub struct SysfsInputs {
    pub forward: Option<PathBuf>,
    pub backward: Option<PathBuf>,
    pub volume: Option<PathBuf>,
}

impl SysfsInputs {
    fn pressed(path: Option<&PathBuf>) -> bool {
        let Some(path) = path else {
            return false;
        };
        match fs::read_to_string(path) {
            // Active-low: a pressed button pulls the line to 0.
            Ok(v) => v.trim() == "0",
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "gpio read failed");
                false
            }
        }
    }
}

impl InputPins for SysfsInputs {
    fn read_buttons(&mut self) -> ButtonLevels {
        ButtonLevels {
            forward: Self::pressed(self.forward.as_ref()),
            backward: Self::pressed(self.backward.as_ref()),
        }
    }

    fn read_volume_raw(&mut self) -> Option<u16> {
        let path = self.volume.as_ref()?;
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}
