//! Fastsync command line.
#![warn(missing_docs)]

mod cli;
mod directory;
mod sync;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use cli::RunCmd;
use directory::DirectoryEngine;
use fc_archive_client::HttpFetcher;
use fc_block_sync::{run_block_sync, CollectorExit, ConsumingEngine, SyncBounds, SyncConfig};
use fc_observability::OtelRequestObserver;
use fp_common::ServiceContext;
use figment::{
    providers::{Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use sync::SyncSource;

const GREET_IMPL_NAME: &str = "Fastsync";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fc_observability::setup_tracing()?;

    // Create config builder.
    let mut config: Figment = Figment::new();

    // Arguments come either from the file given with `--config-file`, or from the command line.
    let cli_args = RunCmd::parse();
    if let Some(config_path) = cli_args.config_file.clone() {
        config = match config_path.extension() {
            None => bail!("Unsupported file type for config file."),
            Some(os_str) => match os_str.to_str() {
                Some("toml") => config.merge(Toml::file(config_path)),
                Some("json") => config.merge(Json::file(config_path)),
                Some("yaml") => config.merge(Yaml::file(config_path)),
                _ => bail!("Unsupported file type for config file."),
            },
        }
    } else {
        config = config.merge(Serialized::defaults(cli_args));
    }

    // Extracts the arguments into the struct
    let run_cmd: RunCmd = config.extract()?;
    run_cmd.check_mode()?;

    let mut engine = DirectoryEngine::open(run_cmd.home()?).context("Opening the local block store")?;
    let source_name = match &run_cmd.source {
        Some(source) => source.clone(),
        None => {
            let chain_id = engine.chain_id()?;
            tracing::info!("📜 Loaded source \"{chain_id}\" from genesis file");
            chain_id
        }
    };

    tracing::info!("🚀 {} {}", GREET_IMPL_NAME, env!("CARGO_PKG_VERSION"));
    tracing::info!("🌐 Source: {source_name} (KYVE chain id `{}`)", run_cmd.chain_id);

    let observer = Arc::new(OtelRequestObserver::register());
    let fetcher = Arc::new(
        HttpFetcher::builder().observer(observer.clone()).build().context("Initializing the http client")?,
    );
    let source = SyncSource::from_cmd(&run_cmd, fetcher)?;

    let continuation_height = engine.next_height()?;
    sync::pre_sync_checks(&source, continuation_height, run_cmd.target_height)
        .await
        .context("Block sync validation checks failed")?;

    let ctx = ServiceContext::new();
    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if let Err(err) = wait_for_shutdown_signal().await {
                tracing::error!("Failed to listen for shutdown signals: {err:#}");
                return;
            }
            ctx.cancel_global();
        }
    });

    let bounds = SyncBounds::new(continuation_height, run_cmd.target_height, run_cmd.must_exit());
    let config = SyncConfig::default().channel_capacity(run_cmd.channel_capacity);
    let res = run_block_sync(&mut engine, source.blocks, bounds, config, ctx).await;

    let stats = observer.snapshot();
    tracing::info!(
        "📊 {} requests, {} failed ({:.2}%)",
        stats.total(),
        stats.failed,
        stats.failure_rate() * 100.0
    );

    let summary = res.inspect_err(|err| {
        if sync::is_integrity_failure(err) {
            tracing::error!("💥 The source served data that failed verification, refusing to apply it");
        }
    })?;
    match summary.exit {
        CollectorExit::Cancelled => {
            tracing::info!("⏸️  Interrupted, resume later from block {}", summary.next_height)
        }
        _ => tracing::info!("✅ Synced {} blocks, next block is {}", summary.applied, summary.next_height),
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
