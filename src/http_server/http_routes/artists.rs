use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::http_server::state::AppState;
use crate::models::ArtistBootstrapJob;
use crate::ports::peer::PeerService;

pub async fn submit_artist<P: PeerService>(
    State(app_state): State<Arc<AppState<P>>>,
    Json(job): Json<ArtistBootstrapJob>,
) -> (StatusCode, Json<Value>) {
    let artist_id = job.artist_id.clone();
    let queued = app_state.acquisition.submit_artist(job);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "artistId": artist_id, "queued": queued })),
    )
}
