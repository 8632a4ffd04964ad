mod app;
mod classifier;
mod config;
mod error;
mod messages;
mod overlay;
mod pose;
mod services;
mod video;

use app::App;
use config::Config;
use pose::KeypointTrack;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting swingcam swing analyser");

    let track_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("Usage: swingcam <keypoint-track.json>")?;

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    let track = KeypointTrack::load(&track_path)?;

    App::new(config, Arc::new(track)).run().await
}
