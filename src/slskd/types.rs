use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/* ---------- Searches ---------- */

/// A search as reported by `GET searches` or `GET searches/{id}`.
///
/// Notes
/// - `responses` is only populated when `includeResponses=true` was asked for.
/// - `startedAt` is emitted without an offset by some server versions; it is
///   always UTC.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnapshot {
    pub id: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub locked_file_count: u64,
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "deserialize_utc")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responses: Vec<PeerResponse>,
}

impl SearchSnapshot {
    /// Files that could actually be requested (total minus locked).
    pub fn net_file_count(&self) -> u64 {
        self.file_count.saturating_sub(self.locked_file_count)
    }
}

/// One peer's answer to a search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    pub username: String,
    #[serde(default)]
    pub has_free_upload_slot: bool,
    #[serde(default)]
    pub upload_speed: u64,
    #[serde(default)]
    pub queue_length: u64,
    #[serde(default)]
    pub files: Vec<PeerFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerFile {
    /// Full remote path, usually backslash separated.
    pub filename: String,
    pub size: u64,
    #[serde(default)]
    pub is_locked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSearch<'a> {
    pub search_text: &'a str,
}

/* ---------- Users ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UserPresence {
    Online,
    Away,
    Offline,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserStatus {
    pub presence: UserPresence,
}

/* ---------- Transfers ---------- */

/// Body item for `POST transfers/downloads/{user}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub filename: String,
    pub size: u64,
}

/// Response of `GET transfers/downloads/{user}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTransfers {
    pub username: String,
    #[serde(default)]
    pub directories: Vec<TransferDirectory>,
}

impl UserTransfers {
    /// Find the download entry for an exact remote filename.
    ///
    /// A retried file can be listed twice, the finished attempt next to the
    /// re-enqueued one. An unfinished entry wins, otherwise the last listed.
    pub fn find_download(&self, filename: &str) -> Option<&TransferFile> {
        let mut latest = None;
        for file in self
            .directories
            .iter()
            .flat_map(|directory| directory.files.iter())
            .filter(|file| file.direction == "Download" && file.filename == filename)
        {
            if file.outcome() == TransferOutcome::InProgress {
                return Some(file);
            }
            latest = Some(file);
        }
        latest
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDirectory {
    pub directory: String,
    #[serde(default)]
    pub files: Vec<TransferFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFile {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub direction: String,
    /// Comma separated flags such as `Completed, Succeeded` or
    /// `Completed, Errored`.
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    InProgress,
    Succeeded,
    Failed,
}

impl TransferFile {
    pub fn outcome(&self) -> TransferOutcome {
        if self.state == "Completed, Succeeded" {
            TransferOutcome::Succeeded
        } else if self.state.contains("Completed") {
            TransferOutcome::Failed
        } else {
            TransferOutcome::InProgress
        }
    }
}

fn deserialize_utc<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_snapshot_parses_list_shape() {
        let json = r#"{
            "id": "0f5a3c1e",
            "isComplete": false,
            "fileCount": 42,
            "lockedFileCount": 2,
            "searchText": "The Beatles Let It Be",
            "state": "InProgress",
            "startedAt": "2024-05-01T10:00:00.1234567"
        }"#;
        let snapshot: SearchSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.id, "0f5a3c1e");
        assert_eq!(snapshot.net_file_count(), 40);
        assert!(snapshot.responses.is_empty());
        assert_eq!(
            snapshot.started_at.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00.123456700+00:00"
        );
    }

    #[test]
    fn test_search_snapshot_parses_responses() {
        let json = r#"{
            "id": "abc",
            "isComplete": true,
            "fileCount": 1,
            "lockedFileCount": 0,
            "searchText": "q",
            "startedAt": "2024-05-01T10:00:00Z",
            "responses": [{
                "username": "peer",
                "fileCount": 1,
                "lockedFileCount": 0,
                "hasFreeUploadSlot": true,
                "uploadSpeed": 1000,
                "files": [{"filename": "@@a\\b.flac", "size": 10, "isLocked": false}]
            }]
        }"#;
        let snapshot: SearchSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.responses.len(), 1);
        assert!(snapshot.responses[0].has_free_upload_slot);
        assert_eq!(snapshot.responses[0].files[0].filename, "@@a\\b.flac");
    }

    #[test]
    fn test_net_file_count_never_underflows() {
        let snapshot: SearchSnapshot =
            serde_json::from_str(r#"{"id":"x","fileCount":1,"lockedFileCount":3}"#).unwrap();
        assert_eq!(snapshot.net_file_count(), 0);
    }

    #[test]
    fn test_unknown_presence_is_tolerated() {
        let status: UserStatus = serde_json::from_str(r#"{"presence":"Dancing"}"#).unwrap();
        assert_eq!(status.presence, UserPresence::Unknown);
        let status: UserStatus = serde_json::from_str(r#"{"presence":"Offline"}"#).unwrap();
        assert_eq!(status.presence, UserPresence::Offline);
    }

    #[test]
    fn test_transfer_outcome() {
        let mut file = TransferFile {
            id: "1".to_string(),
            filename: "f".to_string(),
            size: 0,
            direction: "Download".to_string(),
            state: "Completed, Succeeded".to_string(),
        };
        assert_eq!(file.outcome(), TransferOutcome::Succeeded);

        file.state = "Completed, Errored".to_string();
        assert_eq!(file.outcome(), TransferOutcome::Failed);

        file.state = "Completed, Cancelled".to_string();
        assert_eq!(file.outcome(), TransferOutcome::Failed);

        file.state = "InProgress".to_string();
        assert_eq!(file.outcome(), TransferOutcome::InProgress);
    }

    #[test]
    fn test_find_download_matches_direction_and_filename() {
        let transfers: UserTransfers = serde_json::from_str(
            r#"{
                "username": "peer",
                "directories": [{
                    "directory": "@@a",
                    "fileCount": 2,
                    "files": [
                        {"id": "1", "filename": "@@a\\x.flac", "direction": "Upload", "state": "Queued"},
                        {"id": "2", "filename": "@@a\\x.flac", "direction": "Download", "state": "Queued"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(transfers.find_download("@@a\\x.flac").unwrap().id, "2");
        assert!(transfers.find_download("@@a\\y.flac").is_none());
    }

    #[test]
    fn test_find_download_prefers_retried_entry() {
        let transfers: UserTransfers = serde_json::from_str(
            r#"{
                "username": "peer",
                "directories": [{
                    "directory": "@@a",
                    "files": [
                        {"id": "old", "filename": "@@a\\x.flac", "direction": "Download", "state": "Completed, Errored"},
                        {"id": "new", "filename": "@@a\\x.flac", "direction": "Download", "state": "Queued, Remotely"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(transfers.find_download("@@a\\x.flac").unwrap().id, "new");

        let transfers: UserTransfers = serde_json::from_str(
            r#"{
                "username": "peer",
                "directories": [{
                    "directory": "@@a",
                    "files": [
                        {"id": "old", "filename": "@@a\\x.flac", "direction": "Download", "state": "Completed, Errored"},
                        {"id": "new", "filename": "@@a\\x.flac", "direction": "Download", "state": "Completed, Succeeded"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(transfers.find_download("@@a\\x.flac").unwrap().id, "new");
    }
}
