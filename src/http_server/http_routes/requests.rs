use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::http_server::{error::Report, state::AppState};
use crate::models::{AcquisitionRequest, TrackSubmission};
use crate::ports::peer::PeerService;

pub async fn list_requests<P: PeerService>(
    State(app_state): State<Arc<AppState<P>>>,
) -> Json<Vec<AcquisitionRequest>> {
    let mut requests = app_state.acquisition.pending_requests();
    requests.sort_by(|a, b| a.search_id.cmp(&b.search_id));
    Json(requests)
}

pub async fn submit_track<P: PeerService>(
    State(app_state): State<Arc<AppState<P>>>,
    Json(submission): Json<TrackSubmission>,
) -> Result<(StatusCode, Json<AcquisitionRequest>), Report> {
    let request = app_state.acquisition.request_track(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(request)))
}
