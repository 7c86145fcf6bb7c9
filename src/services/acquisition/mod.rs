pub mod background_task;

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};

use crate::models::{AcquisitionRequest, ArtistBootstrapJob, TrackSubmission};
use crate::ports::peer::PeerService;
use crate::store::PendingStore;

/// Entry point for callers that want tracks acquired or artists prepared.
///
/// Shares the store and the peer client with the orchestrator; everything
/// here returns as soon as the work is registered.
pub struct AcquisitionService<P> {
    store: Arc<PendingStore>,
    peer: Arc<P>,
}

impl<P: PeerService> AcquisitionService<P> {
    pub fn new(store: Arc<PendingStore>, peer: Arc<P>) -> Self {
        Self { store, peer }
    }

    /// Start a peer search for the submission and register it.
    pub async fn request_track(&self, submission: TrackSubmission) -> Result<AcquisitionRequest> {
        submission.validate()?;

        let search = self
            .peer
            .create_search(&submission.search_text())
            .await
            .wrap_err_with(|| format!("Failed to start search for {}", submission.track_name))?;

        let request = AcquisitionRequest::new(search.id, submission);
        self.submit_request(request.clone());
        tracing::info!(
            "Searching for {} by {} (search {})",
            request.track_name,
            request.primary_artist(),
            request.search_id
        );
        Ok(request)
    }

    /// Register a request whose search already exists. A search id that is
    /// already pending is left untouched.
    pub fn submit_request(&self, request: AcquisitionRequest) -> bool {
        self.store.add_request(request)
    }

    pub fn submit_artist(&self, job: ArtistBootstrapJob) -> bool {
        self.store.add_artist(job)
    }

    pub fn pending_requests(&self) -> Vec<AcquisitionRequest> {
        self.store.get_all_requests()
    }
}
