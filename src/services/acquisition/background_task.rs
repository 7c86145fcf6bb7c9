use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::library::Library;
use crate::matcher::{pick_fallback_song, rank_candidates};
use crate::models::{AcquisitionRequest, AcquisitionState, PeerTransfer};
use crate::ports::fallback::{FallbackJobStatus, FallbackService};
use crate::ports::peer::PeerService;
use crate::slskd::{DownloadRequest, SearchSnapshot, TransferOutcome, UserPresence};
use crate::store::PendingStore;

/// Failed transfer observations tolerated before a request is dropped.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
/// A running search is stopped early once it has more usable files than this...
pub const FORCE_COMPLETE_MIN_FILES: u64 = 20;
/// ...and has been running for at least this long.
pub const FORCE_COMPLETE_MIN_AGE: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    /// Directory the peer service writes completed downloads into.
    pub peer_download_dir: PathBuf,
    /// Directory the fallback extractor writes into, when one is configured.
    pub fallback_download_dir: Option<PathBuf>,
}

/// What a request should become after one step.
#[derive(Debug)]
enum Transition {
    Stay,
    Update(AcquisitionRequest),
    Remove(String),
}

/// Drives every pending request through search, download and finalization.
///
/// One instance runs as a single background task; network calls are made
/// one at a time so peers and the fallback service see a bounded load.
pub struct AcquisitionOrchestrator<P, F> {
    store: Arc<PendingStore>,
    peer: Arc<P>,
    fallback: Option<F>,
    library: Library,
    settings: OrchestratorSettings,
}

/// Spawn the orchestrator loop. It stops once `cancel` fires.
pub fn spawn_acquisition_orchestrator<P, F>(
    orchestrator: AcquisitionOrchestrator<P, F>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    P: PeerService + 'static,
    F: FallbackService + 'static,
{
    tokio::spawn(orchestrator.run(cancel))
}

/// Whether a search that is still running already has enough to choose from.
pub fn should_force_complete(search: &SearchSnapshot, now: DateTime<Utc>) -> bool {
    let Some(started_at) = search.started_at else {
        return false;
    };
    let Ok(min_age) = chrono::Duration::from_std(FORCE_COMPLETE_MIN_AGE) else {
        return false;
    };
    search.net_file_count() > FORCE_COMPLETE_MIN_FILES && now - started_at >= min_age
}

/// Local path of a finished peer download: the peer service keeps only the
/// remote parent directory and file name.
pub fn peer_staged_path(download_dir: &std::path::Path, remote_filename: &str) -> PathBuf {
    let mut components = remote_filename
        .rsplit(['\\', '/'])
        .filter(|component| !component.is_empty());
    let file_name = components.next().unwrap_or(remote_filename);
    match components.next() {
        Some(parent) => download_dir.join(parent).join(file_name),
        None => download_dir.join(file_name),
    }
}

impl<P, F> AcquisitionOrchestrator<P, F>
where
    P: PeerService,
    F: FallbackService,
{
    pub fn new(
        store: Arc<PendingStore>,
        peer: Arc<P>,
        fallback: Option<F>,
        library: Library,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            peer,
            fallback,
            library,
            settings,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("Acquisition orchestrator started");

        while !cancel.is_cancelled() {
            if self.store.is_idle() {
                tracing::debug!("Nothing pending, waiting for work");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.store.wait_for_requests(&cancel) => {}
                    _ = self.store.wait_for_artists(&cancel) => {}
                }
                continue;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        tracing::info!("Acquisition orchestrator stopped");
    }

    /// One pass over artist jobs and every pending request. Errors never
    /// escape: the affected item is simply looked at again next cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) {
        self.process_artists().await;

        let requests = self.store.get_all_requests();
        if requests.is_empty() {
            return;
        }

        let searches = match self.peer.list_searches().await {
            Ok(searches) => searches,
            Err(e) => {
                tracing::warn!("Failed to list searches, skipping cycle: {:?}", e);
                return;
            }
        };
        let searches: HashMap<&str, &SearchSnapshot> = searches
            .iter()
            .map(|search| (search.id.as_str(), search))
            .collect();

        for request in requests {
            let search_id = request.search_id.clone();
            let Some(search) = searches.get(search_id.as_str()) else {
                tracing::info!(
                    "Search {} no longer exists, dropping request for {}",
                    search_id,
                    request.track_name
                );
                self.store.try_remove_request(&search_id);
                continue;
            };

            match self.advance(request, search).await {
                Ok(transition) => self.apply(&search_id, transition),
                Err(e) => tracing::warn!("Failed to advance request {}: {:?}", search_id, e),
            }
        }
    }

    fn apply(&self, search_id: &str, transition: Transition) {
        match transition {
            Transition::Stay => {}
            Transition::Update(request) => {
                self.store.update_request(request);
            }
            Transition::Remove(reason) => {
                tracing::info!("Request {} finished: {}", search_id, reason);
                self.store.try_remove_request(search_id);
            }
        }
    }

    async fn process_artists(&self) {
        for job in self.store.get_all_artists() {
            match self.library.bootstrap_artist(&job).await {
                Ok(dir) => {
                    tracing::info!("Prepared artist directory {}", dir.display());
                    self.store.try_remove_artist(&job.artist_id);
                }
                Err(e) => tracing::warn!("Failed to prepare artist {}: {:?}", job.name, e),
            }
        }
    }

    async fn advance(
        &self,
        request: AcquisitionRequest,
        search: &SearchSnapshot,
    ) -> Result<Transition> {
        match request.state.clone() {
            AcquisitionState::Searching if !search.is_complete => {
                if should_force_complete(search, Utc::now()) {
                    tracing::debug!(
                        "Search {} has {} usable files, completing it early",
                        search.id,
                        search.net_file_count()
                    );
                    self.peer.complete_search(&search.id).await?;
                }
                Ok(Transition::Stay)
            }
            AcquisitionState::Searching => self.evaluate(request).await,
            AcquisitionState::AwaitingPeerDownload(transfer) => {
                self.poll_peer_download(request, transfer).await
            }
            AcquisitionState::AwaitingFallbackDownload { job_id } => {
                self.poll_fallback_download(request, &job_id).await
            }
            AcquisitionState::Finalizing { staged_path } => {
                Ok(self.finalize(&request, &staged_path).await)
            }
        }
    }

    /// Pick a peer file for a finished search, or hand over to the fallback.
    #[instrument(skip(self, request), fields(search_id = %request.search_id))]
    async fn evaluate(&self, mut request: AcquisitionRequest) -> Result<Transition> {
        let search = self
            .peer
            .get_search_with_responses(&request.search_id)
            .await?;

        // Nothing requestable came back; don't bother ranking.
        if search.net_file_count() > 0
            && let Some(transfer) = self.dispatch_peer_download(&request, &search).await?
        {
            tracing::info!(
                "Downloading {} from {} for {}",
                transfer.filename,
                transfer.username,
                request.track_name
            );
            request.state = AcquisitionState::AwaitingPeerDownload(transfer);
            return Ok(Transition::Update(request));
        }

        self.dispatch_fallback(request).await
    }

    async fn dispatch_peer_download(
        &self,
        request: &AcquisitionRequest,
        search: &SearchSnapshot,
    ) -> Result<Option<PeerTransfer>> {
        for candidate in rank_candidates(&search.responses, request) {
            match self.peer.user_presence(&candidate.username).await {
                Ok(UserPresence::Offline) => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Skipping {}: {:?}", candidate.username, e);
                    continue;
                }
            }

            let file = DownloadRequest {
                filename: candidate.filename.clone(),
                size: candidate.size,
            };
            self.peer
                .enqueue_download(&candidate.username, &file)
                .await?;

            return Ok(Some(PeerTransfer {
                username: candidate.username,
                filename: candidate.filename,
                size: candidate.size,
                attempts: 0,
            }));
        }
        Ok(None)
    }

    async fn dispatch_fallback(&self, mut request: AcquisitionRequest) -> Result<Transition> {
        let Some(fallback) = &self.fallback else {
            return Ok(Transition::Remove(format!(
                "no suitable peer files for {}",
                request.track_name
            )));
        };

        let songs = fallback.search_songs(&request.search_text()).await?;
        let Some(song) = pick_fallback_song(&songs, &request) else {
            return Ok(Transition::Remove(format!(
                "no fallback match for {}",
                request.track_name
            )));
        };

        let job_id = fallback.enqueue(song).await?;
        tracing::info!(
            "Fallback extraction queued for {}: {} by {}",
            request.track_name,
            song.title,
            song.artists.join(", ")
        );
        request.state = AcquisitionState::AwaitingFallbackDownload { job_id };
        Ok(Transition::Update(request))
    }

    async fn poll_peer_download(
        &self,
        mut request: AcquisitionRequest,
        transfer: PeerTransfer,
    ) -> Result<Transition> {
        let transfers = self.peer.list_downloads(&transfer.username).await?;
        let Some(entry) = transfers.find_download(&transfer.filename) else {
            return Ok(Transition::Remove(format!(
                "transfer of {} from {} disappeared",
                transfer.filename, transfer.username
            )));
        };

        match entry.outcome() {
            TransferOutcome::InProgress => Ok(Transition::Stay),
            TransferOutcome::Succeeded => {
                let staged = peer_staged_path(&self.settings.peer_download_dir, &transfer.filename);
                Ok(self.begin_finalizing(request, staged).await)
            }
            TransferOutcome::Failed => {
                let attempts = transfer.attempts + 1;
                request.state = AcquisitionState::AwaitingPeerDownload(PeerTransfer {
                    attempts,
                    ..transfer.clone()
                });
                // Count the attempt even if the retry below fails.
                self.store.update_request(request.clone());

                if attempts >= MAX_DOWNLOAD_ATTEMPTS {
                    return Ok(Transition::Remove(format!(
                        "download of {} failed {} times ({})",
                        transfer.filename, attempts, entry.state
                    )));
                }

                tracing::info!(
                    "Retrying download of {} from {} (attempt {})",
                    transfer.filename,
                    transfer.username,
                    attempts + 1
                );
                self.peer
                    .cancel_download(&transfer.username, &entry.id)
                    .await?;
                self.peer
                    .enqueue_download(
                        &transfer.username,
                        &DownloadRequest {
                            filename: transfer.filename.clone(),
                            size: transfer.size,
                        },
                    )
                    .await?;
                Ok(Transition::Stay)
            }
        }
    }

    async fn poll_fallback_download(
        &self,
        request: AcquisitionRequest,
        job_id: &str,
    ) -> Result<Transition> {
        let Some(fallback) = &self.fallback else {
            return Ok(Transition::Remove(
                "fallback job pending but no fallback is configured".to_string(),
            ));
        };

        let jobs = fallback.finished_jobs().await?;
        let Some(job) = jobs.into_iter().find(|job| job.id == job_id) else {
            return Ok(Transition::Stay);
        };

        match (job.status, job.filename, &self.settings.fallback_download_dir) {
            (FallbackJobStatus::Failed, _, _) => Ok(Transition::Remove(format!(
                "fallback extraction of {} failed",
                job.title
            ))),
            (FallbackJobStatus::Finished, Some(filename), Some(dir)) => {
                let staged = dir.join(filename);
                Ok(self.begin_finalizing(request, staged).await)
            }
            (FallbackJobStatus::Finished, _, _) => Ok(Transition::Remove(format!(
                "fallback extraction of {} finished without a usable file",
                job.title
            ))),
        }
    }

    async fn begin_finalizing(
        &self,
        mut request: AcquisitionRequest,
        staged: PathBuf,
    ) -> Transition {
        request.state = AcquisitionState::Finalizing {
            staged_path: staged.clone(),
        };
        if !self.store.update_request(request.clone()) {
            return Transition::Stay;
        }
        self.finalize(&request, &staged).await
    }

    async fn finalize(&self, request: &AcquisitionRequest, staged: &std::path::Path) -> Transition {
        match self.library.finalize_track(request, staged).await {
            Ok(destination) => Transition::Remove(format!(
                "{} saved to {}",
                request.track_name,
                destination.display()
            )),
            Err(e) => {
                tracing::error!(
                    "Failed to finalize {} from {}: {}",
                    request.track_name,
                    staged.display(),
                    e
                );
                Transition::Stay
            }
        }
    }
}
