//! Scene-activation validator binary: a thin shell that loads
//! configuration, builds a hub client, and runs the `Validator` until the
//! hub's activation stream ends.

mod hue_bridge;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use scene_sentinel_config::ValidatorConfig;
use scene_sentinel_core::Validator;

use hue_bridge::HueBridgeClient;

#[derive(Debug, Parser)]
#[command(name = "scene-sentinel")]
#[command(about = "Watches hub scene activations and corrects drift against the declared catalog")]
struct Args {
    /// Path to a TOML config file. Defaults plus SCENE_SENTINEL_* env
    /// overrides apply even without one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hue bridge root URL, e.g. https://192.168.1.20
    #[arg(long, env = "SCENE_SENTINEL_HUB_URL")]
    hub_url: String,

    /// Hue bridge application key (the "username" issued at pairing time).
    #[arg(long, env = "SCENE_SENTINEL_HUB_APP_KEY")]
    hub_app_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = ValidatorConfig::load(args.config.as_deref())?;
    tracing::info!(config = ?config.masked_for_logging(), "loaded configuration");

    let hub = HueBridgeClient::new(args.hub_url, args.hub_app_key)?;
    let validator = Validator::new(&config, Arc::new(hub))?;

    validator.run().await;

    error!("hub activation stream ended, shutting down");
    Ok(())
}
