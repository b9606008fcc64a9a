use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod models;
mod services;

use config::{AppConfig, CacheBackendKind};
use services::aggregator::AnimeAggregator;
use services::cache::{CacheBackend, CacheStore, MemoryCacheBackend, SqliteCacheBackend};
use services::jikan::JikanClient;
use services::kitsu::KitsuClient;
use services::streaming::{ResolverOptions, StreamingResolver, StreamingSource};
use services::watchmode::WatchModeClient;

pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub aggregator: Arc<AnimeAggregator>,
}

/// Open the configured cache backend
async fn open_cache(config: &AppConfig) -> Result<CacheStore> {
    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::Sqlite => {
            let database_url = config.database_url();
            tracing::debug!("Database URL: {}", database_url);

            let pool = db::connect(&database_url).await?;
            db::migrate(&pool).await?;
            Arc::new(SqliteCacheBackend::new(pool))
        }
        CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
    };

    Ok(CacheStore::new(backend).with_defaults(config.cache.ttl(), config.cache.version.clone()))
}

/// Streaming sources in priority order: Kitsu, then WatchMode when a key is set
fn streaming_sources(config: &AppConfig) -> Vec<Arc<dyn StreamingSource>> {
    let sources = &config.sources;
    let timeout = sources.request_timeout();

    let mut list: Vec<Arc<dyn StreamingSource>> = vec![Arc::new(KitsuClient::new(
        sources.kitsu_base_url.clone(),
        timeout,
        std::time::Duration::from_millis(sources.kitsu_delay_ms),
    ))];

    if let Some(ref key) = sources.watchmode_api_key {
        list.push(Arc::new(WatchModeClient::new(
            sources.watchmode_base_url.clone(),
            key.clone(),
            sources.watchmode_region.clone(),
            timeout,
            std::time::Duration::from_millis(sources.watchmode_delay_ms),
        )));
    }

    list
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seasonal_streams=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    let cache = Arc::new(open_cache(&config).await?);

    // One-time expiry sweep per process start
    let removed = cache.cleanup().await;
    if removed > 0 {
        tracing::info!("Removed {} expired cache entries", removed);
    }

    let resolver = Arc::new(StreamingResolver::new(
        streaming_sources(&config),
        ResolverOptions {
            max_candidates: config.resolver.max_candidates,
            expand_variations: config.resolver.expand_variations,
        },
    ));
    tracing::info!("Streaming sources: {}", resolver.source_names().join(" -> "));

    let listing = Arc::new(JikanClient::new(
        config.sources.jikan_base_url.clone(),
        config.sources.request_timeout(),
        std::time::Duration::from_millis(config.sources.jikan_delay_ms),
        config.sources.max_listing_pages,
    ));

    let aggregator = Arc::new(AnimeAggregator::new(
        listing,
        resolver,
        cache.clone(),
        config.aggregator.max_concurrent,
    ));

    let state = Arc::new(AppState { cache, aggregator });

    let app = api::router(state);

    let ip: std::net::IpAddr = config.bind_address.parse().unwrap_or_else(|_| {
        tracing::warn!(
            "Invalid bind address {:?}, falling back to 0.0.0.0",
            config.bind_address
        );
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
