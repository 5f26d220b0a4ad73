use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::stats::{PipelineStats, StatsSnapshot};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// 200 only while the ingestion loop is connected to the inbound channel.
async fn ready(Extension(stats): Extension<Arc<PipelineStats>>) -> impl IntoResponse {
    let snapshot = stats.snapshot();
    let code = if stats.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(HealthResponse { status: snapshot.state }))
}

async fn stats(Extension(stats): Extension<Arc<PipelineStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

pub fn router(stats: Arc<PipelineStats>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/stats", get(self::stats))
        .layer(Extension(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(router(Arc::new(PipelineStats::default())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_connection_state() {
        let stats = Arc::new(PipelineStats::default());

        let (status, _) = get(router(stats.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        stats.set_state(ConnectionState::Connected);
        let (status, body) = get(router(stats), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "connected");
    }

    #[tokio::test]
    async fn stats_exposes_counters() {
        let stats = Arc::new(PipelineStats::default());
        stats.record_received();
        stats.record_unprofiled();

        let (_, body) = get(router(stats), "/stats").await;
        assert_eq!(body["received"], 1);
        assert_eq!(body["unprofiled"], 1);
        assert_eq!(body["processed"], 0);
    }
}
