use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::ObsClient;
use orchestrator::{CutOutcome, CutSaga};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Overrides};

/// Cut to the overlay scene, play the clip, cut back to the previous scene.
#[derive(Parser, Debug)]
#[command(name = "takemycutplease")]
struct Args {
    /// OBS WebSocket URL [default: ws://127.0.0.1:4455]
    #[arg(long)]
    url: Option<String>,
    /// OBS WebSocket password
    #[arg(long)]
    password: Option<String>,
    /// File holding the password [default: ~/.config/memen_demon/obs_password]
    #[arg(long)]
    password_file: Option<String>,
    /// Scene to cut to [default: itstinks]
    #[arg(long)]
    itstinks_scene: Option<String>,
    /// Media input to restart and wait on [default: it_stinks_clip]
    #[arg(long)]
    clip_input: Option<String>,
    /// Source inside the overlay scene hidden partway through the clip [default: PreviousScene]
    #[arg(long)]
    prevscene_source: Option<String>,
    /// Source clone input pointed at the previous scene [default: PrevSceneClone]
    #[arg(long)]
    clone_input: Option<String>,
    /// Scene that only wraps the clone input [default: PreviousScene]
    #[arg(long)]
    wrapper_scene: Option<String>,
    /// Seconds into the clip to hide the previous scene [default: 2.7]
    #[arg(long)]
    hide_delay: Option<f64>,
    /// Clip length in ms, used as a hard floor [default: 7500]
    #[arg(long)]
    fallback_ms: Option<u64>,
    /// Restart the clip this many ms before switching scenes [default: 30]
    #[arg(long)]
    preload_ms: Option<u64>,
    /// Leave the current transition alone instead of forcing a cut
    #[arg(long)]
    no_force_cut: bool,
    /// TOML config file [default: ./takemycut.toml when present]
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            password: self.password.clone(),
            password_file: self.password_file.clone(),
            itstinks_scene: self.itstinks_scene.clone(),
            clip_input: self.clip_input.clone(),
            prevscene_source: self.prevscene_source.clone(),
            clone_input: self.clone_input.clone(),
            wrapper_scene: self.wrapper_scene.clone(),
            hide_delay: self.hide_delay,
            fallback_ms: self.fallback_ms,
            preload_ms: self.preload_ms,
            no_force_cut: self.no_force_cut.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = load_settings(args.overrides(), args.config.clone(), |key| {
        std::env::var(key).ok()
    })?;

    let client = Arc::new(
        ObsClient::websocket(settings.url.clone(), settings.password.clone())
            .context("invalid OBS WebSocket URL")?,
    );
    let saga = CutSaga::new(Arc::clone(&client), settings.plan);

    let result = tokio::select! {
        result = saga.run() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, rollback may be incomplete");
            if let Err(error) = client.close().await {
                debug!(%error, "close after interrupt failed");
            }
            return Ok(());
        }
    };

    if let Err(error) = client.close().await {
        debug!(%error, "close failed");
    }

    match result.context("cut failed")? {
        CutOutcome::Completed => info!("cut complete"),
        CutOutcome::AlreadyOnOverlay => info!("nothing to do"),
    }
    Ok(())
}
