mod api;
mod cli;
mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ffctl_task::{MemoryStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(ffmpeg) = cli.ffmpeg {
        config.ffmpeg.path = ffmpeg;
    }

    let ffmpeg = Arc::new(
        ffctl_ffmpeg::FFmpeg::new(ffctl_ffmpeg::Config {
            binary: config.ffmpeg.path.clone(),
            ..Default::default()
        })
        .await
        .with_context(|| format!("probing ffmpeg binary {}", config.ffmpeg.path.display()))?,
    );

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(ffmpeg.clone()));

    let app = api::router(api::AppState {
        store,
        ffmpeg,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    info!(bind = %config.server.bind, "ffctl listening");
    axum::serve(listener, app).await?;

    Ok(())
}
