mod config;
mod handlers;
mod longpoll;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tidegate_core::{channel, ChannelConfig, LongPollDispatcher, MemoryProvider, ResourceProvider};

use crate::{
    config::{Cli, ServerConfig},
    handlers::{router, AppState},
    longpoll::CookieSettings,
};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::try_from(Cli::parse())?;
    let channels = ChannelConfig::new(config.prefix.clone());
    info!("starting tidegate-server on {}", config.listen_addr);
    info!("thing routes mounted under {}", channel(&channels, &[]));

    // The in-memory provider backs the standalone binary; embedders swap in
    // their own binding.
    let provider: Arc<dyn ResourceProvider> = Arc::new(MemoryProvider::new());
    let dispatcher = LongPollDispatcher::new(config.window);

    {
        let dispatcher = dispatcher.clone();
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { dispatcher.run(provider).await });
    }

    let state = AppState {
        provider,
        dispatcher,
        channels,
        cookie: CookieSettings {
            name: config.cookie_name.clone(),
            max_age: config.cookie_max_age,
        },
    };

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
