use serde::{Deserialize, Serialize};

/// One tag-to-track association.
///
/// Field names on the wire follow the web UI (`tagid`, `song`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagMapping {
    /// Tag identifier as reported by the reader (hex UID).
    #[serde(rename = "tagid")]
    pub tag_id: String,
    /// Track path, absolute or relative to the music folder.
    #[serde(rename = "song")]
    pub track_path: String,
}

impl TagMapping {
    pub fn new(tag_id: impl Into<String>, track_path: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            track_path: track_path.into(),
        }
    }
}

/// Reason why the last track stopped playing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of file, including seeking past the end.
    Eof,
    /// The engine could not open or decode the track.
    Error,
    /// Playback was stopped explicitly (shutdown or stop command).
    Stopped,
}

/// Result code returned by every mutating API call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultCode {
    Ok,
    /// The mapping store has no free slot.
    Full,
    /// Request failed boundary validation.
    Invalid,
    NotFound,
    /// File is still referenced by a mapping.
    InUse,
    Exists,
    Error,
}

/// Body of `POST /addmapping`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddMappingRequest {
    pub tagid: String,
    pub song: String,
}

/// Body of `POST /delmapping`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveMappingRequest {
    pub tagid: String,
}

/// Body of `POST /renamefile`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameFileRequest {
    pub oldname: String,
    pub newname: String,
}

/// Body of `POST /deletefile`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub filename: String,
}

/// Generic response for mutating calls.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub result: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the change was applied in memory but could not be saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Current mapping listing after the change, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Vec<TagMapping>>,
    /// Set by `/renamefile` when mappings were rewritten to the new name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings_updated: Option<bool>,
}

impl MutationResponse {
    pub fn ok() -> Self {
        Self {
            result: ResultCode::Ok,
            message: None,
            warning: None,
            mappings: None,
            mappings_updated: None,
        }
    }

    pub fn failed(result: ResultCode, message: impl Into<String>) -> Self {
        Self {
            result,
            message: Some(message.into()),
            ..Self::ok()
        }
    }
}

/// Response of `GET /tagid`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagIdResponse {
    pub tagid: Option<String>,
}

/// One entry of `GET /songs`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SongEntry {
    /// File name relative to the music folder.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as unix seconds (0 when unknown).
    pub timestamp: u64,
}

/// Playback status reported by `GET /status`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JukeboxStatus {
    /// Track currently loaded, if any.
    pub now_playing: Option<String>,
    pub is_playing: bool,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Total track duration in milliseconds, when the container reports it.
    pub duration_ms: Option<u64>,
    /// Smoothed knob volume in `0..=max_volume`.
    pub volume: u8,
    pub max_volume: u8,
    /// Tag currently tracked by the poll task.
    pub tag_id: Option<String>,
    /// Milliseconds left before the inactivity shutdown.
    pub shutdown_in_ms: Option<u64>,
    /// Why the previous track ended.
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_mapping_uses_web_ui_field_names() {
        let json = serde_json::to_value(TagMapping::new("A1B2", "song1.mp3")).unwrap();
        assert_eq!(json["tagid"], "A1B2");
        assert_eq!(json["song"], "song1.mp3");
    }

    #[test]
    fn mutation_response_omits_empty_fields() {
        let json = serde_json::to_string(&MutationResponse::ok()).unwrap();
        assert_eq!(json, r#"{"result":"OK"}"#);
    }

    #[test]
    fn result_codes_are_uppercase() {
        let resp = MutationResponse::failed(ResultCode::InUse, "mapped");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"], "INUSE");
        assert_eq!(json["message"], "mapped");
    }

    #[test]
    fn rename_response_reports_mappings_updated_in_camel_case() {
        let resp = MutationResponse {
            mappings_updated: Some(true),
            ..MutationResponse::ok()
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["mappingsUpdated"], true);
    }
}
