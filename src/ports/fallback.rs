use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};

/// A song found on the fallback catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackSong {
    /// Platform video id; doubles as the extraction job id.
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
}

/// An extraction job that left the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackJob {
    pub id: String,
    pub title: String,
    /// File name relative to the extraction service's download directory.
    pub filename: Option<String>,
    pub status: FallbackJobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackJobStatus {
    Finished,
    Failed,
}

/// Port trait for the audio-extraction fallback used when no peer file fits.
///
/// Implementations live in `fallback` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FallbackService: Send + Sync {
    async fn search_songs(&self, query: &str) -> Result<Vec<FallbackSong>>;

    /// Queue a song for extraction and return the job id to poll for.
    async fn enqueue(&self, song: &FallbackSong) -> Result<String>;

    /// Jobs the service has finished with, successful or not.
    async fn finished_jobs(&self) -> Result<Vec<FallbackJob>>;
}
