use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, eyre};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    http_server::{
        http_routes::{artists, health, requests},
        state::AppState,
    },
    ports::peer::PeerService,
};

pub fn router<P>(app_state: Arc<AppState<P>>) -> Router
where
    P: PeerService + 'static,
{
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/requests",
            get(requests::list_requests::<P>).post(requests::submit_track::<P>),
        )
        .route("/api/artists", post(artists::submit_artist::<P>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

/// Serve until `shutdown` fires, then drain in-flight requests.
pub async fn start<P>(
    port: u16,
    app_state: Arc<AppState<P>>,
    shutdown: CancellationToken,
) -> color_eyre::Result<()>
where
    P: PeerService + 'static,
{
    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", port))?;
    tracing::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    use super::*;
    use crate::ports::peer::MockPeerService;
    use crate::services::acquisition::AcquisitionService;
    use crate::slskd::SearchSnapshot;
    use crate::store::PendingStore;

    fn app(peer: MockPeerService) -> (Router, Arc<PendingStore>) {
        let store = Arc::new(PendingStore::new());
        let state = Arc::new(AppState {
            acquisition: AcquisitionService::new(store.clone(), Arc::new(peer)),
        });
        (router(state), store)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn extract_json(body: Body) -> Value {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(MockPeerService::new());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_submit_track_accepted() {
        let mut peer = MockPeerService::new();
        peer.expect_create_search().returning(|_| {
            Ok(serde_json::from_value::<SearchSnapshot>(json!({ "id": "search-1" })).unwrap())
        });
        let (app, store) = app(peer);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/requests",
                json!({
                    "track_name": "Let It Be",
                    "artists": ["The Beatles"],
                    "album_name": "Let It Be"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["search_id"], "search-1");
        assert_eq!(body["state"]["state"], "searching");
        assert!(store.try_get_request("search-1").is_some());
    }

    #[tokio::test]
    async fn test_submit_track_without_artist_is_bad_request() {
        let mut peer = MockPeerService::new();
        peer.expect_create_search().never();
        let (app, store) = app(peer);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/requests",
                json!({
                    "track_name": "Let It Be",
                    "artists": [],
                    "album_name": "Let It Be"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!store.has_requests());
    }

    #[tokio::test]
    async fn test_submit_track_peer_failure_is_server_error() {
        let mut peer = MockPeerService::new();
        peer.expect_create_search()
            .returning(|_| Err(eyre!("connection refused")));
        let (app, _) = app(peer);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/requests",
                json!({
                    "track_name": "Let It Be",
                    "artists": ["The Beatles"],
                    "album_name": "Let It Be"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_submit_artist_and_list_requests() {
        let (app, store) = app(MockPeerService::new());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/artists",
                json!({ "artist_id": "artist-1", "name": "The Beatles", "genres": ["rock"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(store.try_get_artist("artist-1").is_some());

        let response = app
            .oneshot(Request::builder().uri("/api/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(extract_json(response.into_body()).await, json!([]));
    }
}
