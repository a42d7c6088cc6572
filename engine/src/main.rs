use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod classifier;
mod config;
mod detectors;
mod error;
mod feed;
mod history;
mod notify;
mod reputation;
mod routes;
mod storage;
mod types;

use classifier::LinearTextModel;
use config::Config;
use feed::{FeedCache, HttpFeedSource};
use history::HistoryStore;
use notify::HttpEmailRelay;
use reputation::DomainReputation;
use routes::AppState;
use storage::{ClickHouseThreatLog, DisabledThreatLog, ThreatLogSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threatlens_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!(
        "Loaded configuration: listen {}:{}, model {}, feed max age {}s",
        config.host, config.port, config.model_path, config.feed_max_age_secs
    );

    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let model = LinearTextModel::load_from_file(&config.model_path)?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;

    let feed = FeedCache::new(
        Arc::new(HttpFeedSource::new(http.clone(), config.feed_url.clone())),
        &config.feed_cache_path,
        config.feed_max_age(),
    );
    info!("PhishTank cache at {}", feed.path().display());

    let history = HistoryStore::new(&config.history_path);
    history.ensure_initialized().await?;
    info!("Threat history at {}", history.path().display());

    let threat_log: Arc<dyn ThreatLogSink> = match &config.clickhouse_url {
        Some(url) => {
            let sink = ClickHouseThreatLog::new(url, &config);
            sink.ensure_table().await;
            Arc::new(sink)
        }
        None => {
            warn!("CLICKHOUSE_URL not set, remote threat log disabled");
            Arc::new(DisabledThreatLog)
        }
    };

    let mailer = HttpEmailRelay::new(http, config.email_relay_url.clone());
    if config.email_credentials().is_none() {
        warn!("Email credentials not configured, /reportThreat will fail");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state = AppState {
        config: Arc::new(config),
        reputation: Arc::new(DomainReputation::new()),
        feed: Arc::new(feed),
        classifier: Arc::new(model),
        history: Arc::new(history),
        threat_log,
        mailer: Arc::new(mailer),
        metrics: Some(metrics),
    };

    let app = routes::router(state);

    // Start server
    info!("Starting ThreatLens engine on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}
