use color_eyre::eyre::Result;

use crate::slskd::{DownloadRequest, SearchSnapshot, UserPresence, UserTransfers};

/// Port trait wrapping the peer search/download service used by the
/// orchestrator and the HTTP layer.
///
/// Implementations live in `slskd::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PeerService: Send + Sync {
    /// Start a search and return its snapshot (the id becomes the request key).
    async fn create_search(&self, search_text: &str) -> Result<SearchSnapshot>;

    /// All known searches, without responses.
    async fn list_searches(&self) -> Result<Vec<SearchSnapshot>>;

    async fn get_search_with_responses(&self, search_id: &str) -> Result<SearchSnapshot>;

    /// Stop a running search so its responses become final.
    async fn complete_search(&self, search_id: &str) -> Result<()>;

    async fn user_presence(&self, username: &str) -> Result<UserPresence>;

    async fn list_downloads(&self, username: &str) -> Result<UserTransfers>;

    async fn enqueue_download(&self, username: &str, file: &DownloadRequest) -> Result<()>;

    async fn cancel_download(&self, username: &str, transfer_id: &str) -> Result<()>;
}
