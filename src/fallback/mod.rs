pub mod metube;
pub mod ytmusic;

use color_eyre::Result;
use reqwest::Client;

use crate::config::MetubeConfig;
use crate::fallback::metube::MetubeClient;
use crate::fallback::ytmusic::YtMusicSearch;
use crate::ports::fallback::{FallbackJob, FallbackService, FallbackSong};

/// YouTube Music for finding the song, MeTube for extracting its audio.
pub struct MetubeFallback {
    search: YtMusicSearch,
    metube: MetubeClient,
    quality: String,
    format: String,
}

impl MetubeFallback {
    pub fn new(config: &MetubeConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &MetubeConfig) -> Self {
        Self {
            search: YtMusicSearch::new(client.clone(), config.region.clone()),
            metube: MetubeClient::new(client, config.urls.clone()),
            quality: config.quality.clone(),
            format: config.format.clone(),
        }
    }
}

#[async_trait::async_trait]
impl FallbackService for MetubeFallback {
    async fn search_songs(&self, query: &str) -> Result<Vec<FallbackSong>> {
        self.search.search_songs(query).await
    }

    /// MeTube keys its history by video id, so that is the job id.
    async fn enqueue(&self, song: &FallbackSong) -> Result<String> {
        self.metube
            .add(&song.id, &self.quality, &self.format)
            .await?;
        Ok(song.id.clone())
    }

    async fn finished_jobs(&self) -> Result<Vec<FallbackJob>> {
        self.metube.finished_jobs().await
    }
}
