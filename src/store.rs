use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::models::{AcquisitionRequest, ArtistBootstrapJob};

/// Registry of in-flight acquisition requests and pending artist bootstrap
/// jobs, shared between the orchestrator and any number of submitters.
///
/// Each registry has its own wake signal so artist work and track work can
/// wake an idle orchestrator independently. Locks are never held across an
/// `.await`.
#[derive(Default)]
pub struct PendingStore {
    requests: Mutex<HashMap<String, AcquisitionRequest>>,
    artists: Mutex<HashMap<String, ArtistBootstrapJob>>,
    requests_added: Notify,
    artists_added: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Track requests ----

    /// Insert a request unless its search id is already registered.
    /// Returns whether the request was inserted.
    pub fn add_request(&self, request: AcquisitionRequest) -> bool {
        let inserted = {
            let mut requests = lock(&self.requests);
            if requests.contains_key(&request.search_id) {
                false
            } else {
                requests.insert(request.search_id.clone(), request);
                true
            }
        };
        if inserted {
            self.requests_added.notify_waiters();
        }
        inserted
    }

    pub fn try_get_request(&self, search_id: &str) -> Option<AcquisitionRequest> {
        lock(&self.requests).get(search_id).cloned()
    }

    pub fn get_all_requests(&self) -> Vec<AcquisitionRequest> {
        lock(&self.requests).values().cloned().collect()
    }

    /// Replace the stored copy of a request. A request that was removed in
    /// the meantime stays removed.
    pub fn update_request(&self, request: AcquisitionRequest) -> bool {
        match lock(&self.requests).get_mut(&request.search_id) {
            Some(existing) => {
                *existing = request;
                true
            }
            None => false,
        }
    }

    pub fn try_remove_request(&self, search_id: &str) -> bool {
        lock(&self.requests).remove(search_id).is_some()
    }

    pub fn has_requests(&self) -> bool {
        !lock(&self.requests).is_empty()
    }

    /// Wait until at least one request is registered.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait_for_requests(&self, cancel: &CancellationToken) -> bool {
        wait_until(&self.requests_added, cancel, || self.has_requests()).await
    }

    // ---- Artist bootstrap jobs ----

    pub fn add_artist(&self, job: ArtistBootstrapJob) -> bool {
        let inserted = {
            let mut artists = lock(&self.artists);
            if artists.contains_key(&job.artist_id) {
                false
            } else {
                artists.insert(job.artist_id.clone(), job);
                true
            }
        };
        if inserted {
            self.artists_added.notify_waiters();
        }
        inserted
    }

    pub fn try_get_artist(&self, artist_id: &str) -> Option<ArtistBootstrapJob> {
        lock(&self.artists).get(artist_id).cloned()
    }

    pub fn get_all_artists(&self) -> Vec<ArtistBootstrapJob> {
        lock(&self.artists).values().cloned().collect()
    }

    pub fn try_remove_artist(&self, artist_id: &str) -> bool {
        lock(&self.artists).remove(artist_id).is_some()
    }

    pub fn has_artists(&self) -> bool {
        !lock(&self.artists).is_empty()
    }

    pub async fn wait_for_artists(&self, cancel: &CancellationToken) -> bool {
        wait_until(&self.artists_added, cancel, || self.has_artists()).await
    }

    /// True when neither tracks nor artists are waiting.
    pub fn is_idle(&self) -> bool {
        !self.has_requests() && !self.has_artists()
    }
}

/// Interest in `signal` is registered before `ready` is checked, so an
/// insertion landing between the check and the await still wakes us.
async fn wait_until(
    signal: &Notify,
    cancel: &CancellationToken,
    ready: impl Fn() -> bool,
) -> bool {
    loop {
        let notified = signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if ready() {
            return true;
        }

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut notified => {}
        }
    }
}
