#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::time::Duration;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::routing::get;
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio::time::interval_at;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::JwtKeys;
use crate::config::Config;
use crate::service::LinkService;
use crate::storage::Storage;

mod api;
mod config;
mod graceful_shutdown;
mod links;
mod root;
mod service;
mod shortcut;
mod storage;
#[cfg(test)]
mod tests;
mod utils;

const DEFAULT_RUST_LOG: &str = "shortener=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;

    let (app, storage) = setup_app(&config).await?;

    let shutdown = CancellationToken::new();

    let flusher = config.snapshot_interval.map(|period| {
        tokio::spawn(flush_snapshots(storage.clone(), period, shutdown.clone()))
    });

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("Listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler(shutdown.clone()))
        .await?;

    shutdown.cancel();

    if let Some(flusher) = flusher {
        flusher.await?;
    }

    storage.save_snapshot().await?;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// The storage is returned as well, to save its snapshot on shutdown
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Database connection
/// - Snapshot file
pub async fn setup_app(config: &Config) -> Result<(Router, Storage)> {
    let storage = Storage::from_config(config.storage()).await?;

    storage.load_snapshot().await?;

    let service = LinkService::new(
        storage.clone(),
        config.shortcut_length,
        config.base_url.clone(),
    );

    let jwt_keys = JwtKeys::new(config.jwt_secret.as_bytes(), config.token_lifetime);

    Ok((create_router(service, jwt_keys), storage))
}

/// Create the router for the shortener
fn create_router(service: LinkService, jwt_keys: JwtKeys) -> Router {
    Router::new()
        .route("/", post(api::create_plain))
        .route("/ping", get(api::ping))
        .nest("/api", api::router())
        .fallback(get(root::root))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(service))
        .layer(Extension(jwt_keys))
}

/// Save the snapshot every `period` until shutdown
///
/// A failed save is logged, the next tick tries again
async fn flush_snapshots(storage: Storage, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = storage.save_snapshot().await {
                    tracing::error!("Could not save snapshot: {err}");
                }
            }
        }
    }
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}
