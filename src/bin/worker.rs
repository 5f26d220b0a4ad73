use anyhow::Context;
use plant_care_pipeline::config::Config;
use plant_care_pipeline::dispatcher::AlertDispatcher;
use plant_care_pipeline::notifications::{MqttStatePublisher, PubSubAlertChannel};
use plant_care_pipeline::source::RedisStreamSource;
use plant_care_pipeline::store::PgStore;
use plant_care_pipeline::worker::{Collaborators, IngestionLoop};
use plant_care_pipeline::{api, telemetry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Load .env if present (dotenvy)
    dotenvy::dotenv().ok();

    if let Err(e) = telemetry::init_telemetry("plant-care-pipeline") {
        eprintln!("Failed to initialise telemetry: {:#}", e);
        std::process::exit(1);
    }

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Worker exited with error: {:#}", e);
            1
        }
    };

    telemetry::shutdown_telemetry();
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.log_config();

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    let store = PgStore::open(
        &config.database_url,
        config.connect_timeout,
        config.operation_timeout,
    )
    .await
    .context("failed to connect to PostgreSQL")?;
    store.migrate().await.context("failed to run migrations")?;
    let store = Arc::new(store);

    let source = RedisStreamSource::new(config.stream_settings())
        .context("invalid Redis configuration")?;

    let alerts = PubSubAlertChannel::connect(
        &config.alert_topic,
        config.connect_timeout,
        config.operation_timeout,
    )
    .await
    .context("failed to connect to the alert topic")?;

    let publisher = MqttStatePublisher::connect(
        &config.mqtt_settings(),
        config.connect_timeout,
        config.operation_timeout,
    )
    .await
    .context("failed to connect to the MQTT broker")?;

    let collaborators = Collaborators {
        source: Box::new(source),
        profiles: store.clone(),
        readings: store.clone(),
        dispatcher: AlertDispatcher::new(store, Box::new(alerts))
            .with_timeout(config.operation_timeout),
        publisher: Box::new(publisher),
    };

    let mut ingestion = IngestionLoop::new(collaborators, config.worker_settings());
    ingestion
        .start()
        .await
        .context("failed to connect to the inbound stream")?;

    let shutdown = CancellationToken::new();

    let app = api::app(ingestion.stats(), prometheus_layer, metric_handle);
    let server_shutdown = shutdown.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(app, metrics_port, server_shutdown).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        signal_shutdown.cancel();
    });

    tracing::info!("Starting plant care pipeline worker...");
    ingestion.run(shutdown.clone()).await;
    shutdown.cancel();
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
