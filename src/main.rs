use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

mod artwork;
mod cache;
mod config;
mod error;
mod fetcher;
mod http;
mod providers;
mod service;
mod storage;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::fetcher::{ApiClient, RateLimiter};
use crate::providers::{CoverArtClient, LastFmClient, LookupCoordinator, MusicBrainzClient};
use crate::service::{AppContext, SubmissionGuard};
use crate::storage::EventStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("now_playing=debug".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .init();

    info!("🎵 Iniciando servicio now-playing v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Inicializar base de datos
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url())
        .await?;
    let store = EventStore::new(pool);
    store.migrate().await?;
    info!("📁 Base de datos inicializada");

    // Cliente saliente con rate limiting por host
    let limiter = RateLimiter::new(
        config.rate_limit_intervals(),
        std::time::Duration::from_secs(config.default_rate_limit),
    );
    let client = Arc::new(ApiClient::new(
        &config.app_name,
        std::time::Duration::from_secs(config.http_timeout_secs),
        limiter,
    )?);

    // Proveedores de metadata: MusicBrainz primario, Last.fm secundario
    let musicbrainz = Arc::new(MusicBrainzClient::new(
        client.clone(),
        config.musicbrainz_base_url.clone(),
    ));
    let lastfm = Arc::new(LastFmClient::new(
        client.clone(),
        config.lastfm_base_url.clone(),
        config.lastfm_api_key.clone(),
    ));
    let coordinator = LookupCoordinator::new(musicbrainz, lastfm, config.lookup_retries);
    let coverart = CoverArtClient::new(client.clone(), config.coverart_base_url.clone());

    let bind_addr = config.bind_addr.clone();
    let ctx = Arc::new(AppContext {
        config,
        cache: ResponseCache::new(),
        client,
        coordinator,
        coverart,
        store,
        dedup: SubmissionGuard::default(),
    });

    let app = http::router(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("🚀 Servicio escuchando en {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("servicio detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("error al registrar Ctrl+C: {}", e);
    }
    info!("⚠️ Señal de shutdown recibida, cerrando...");
}
