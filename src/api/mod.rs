//! Side-channel HTTP server: liveness, readiness, progress counters and
//! Prometheus metrics. It only reads shared counters and never touches the
//! ingestion write path.

pub mod health;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::stats::PipelineStats;

pub fn app(
    stats: Arc<PipelineStats>,
    prometheus_layer: axum_prometheus::PrometheusMetricLayer<'static>,
    metric_handle: PrometheusHandle,
) -> Router {
    health::router(stats)
        .route(
            "/metrics",
            get(|| async move { metric_handle.render() }),
        )
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(app: Router, port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
