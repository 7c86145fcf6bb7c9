use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One track being sought, keyed by the peer service's search id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub search_id: String,
    pub track_name: String,
    /// Performing artists, primary artist first.
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    pub album_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub state: AcquisitionState,
}

impl AcquisitionRequest {
    pub fn new(search_id: impl Into<String>, submission: TrackSubmission) -> Self {
        Self {
            search_id: search_id.into(),
            track_name: submission.track_name,
            artists: submission.artists,
            album_artists: submission.album_artists,
            album_name: submission.album_name,
            image_url: submission.image_url,
            state: AcquisitionState::Searching,
        }
    }

    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    /// Text used both for the peer search and the fallback search.
    pub fn search_text(&self) -> String {
        search_text(self.primary_artist(), &self.track_name)
    }
}

fn search_text(artist: &str, track_name: &str) -> String {
    format!("{} {}", artist, track_name).trim().to_string()
}

/// Where a request is in its lifecycle.
///
/// A request pursues either a peer transfer or a fallback extraction job,
/// never both, so the transfer details live on the variant rather than on
/// the request itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Searching,
    AwaitingPeerDownload(PeerTransfer),
    AwaitingFallbackDownload {
        job_id: String,
    },
    Finalizing {
        staged_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTransfer {
    pub username: String,
    /// Full remote path as advertised by the uploader.
    pub filename: String,
    pub size: u64,
    pub attempts: u32,
}

/// Caller-facing description of a wanted track, before a search exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSubmission {
    pub track_name: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub album_artists: Vec<String>,
    pub album_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Track name must not be empty")]
    MissingTrackName,

    #[error("The primary (first) performing artist is required")]
    MissingArtist,
}

impl TrackSubmission {
    pub fn search_text(&self) -> String {
        let artist = self.artists.first().map(String::as_str).unwrap_or_default();
        search_text(artist, &self.track_name)
    }

    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.track_name.trim().is_empty() {
            return Err(SubmissionError::MissingTrackName);
        }
        if self.artists.first().is_none_or(|artist| artist.trim().is_empty()) {
            return Err(SubmissionError::MissingArtist);
        }
        Ok(())
    }
}

/// Pending creation of an artist directory and its metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistBootstrapJob {
    pub artist_id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Image URLs, primary image first.
    #[serde(default)]
    pub images: Vec<String>,
}

impl ArtistBootstrapJob {
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}
