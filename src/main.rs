//! strata - Collection journal service
//!
//! Opens the configured collections and keeps their journals flushed and
//! rotated until interrupted.

use std::sync::Arc;
use strata_core::{Collection, Collections};
use strata_server::{start_garbage_collector, stop_garbage_collector, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if STRATA_CONFIG is set, then env overrides)
    let config_path = std::env::var("STRATA_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting strata");
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());
    tracing::info!(
        "  Journal size: {} KiB ({} backend)",
        config.storage.journal_size_kb,
        config.storage.backend.as_str()
    );
    tracing::info!("  GC poll interval: {:?}", config.gc.poll_interval());

    let backend = config.storage.backend.backend();
    let collections = Arc::new(Collections::new());

    for entry in &config.collections {
        let journal = config.storage.journal_config(&entry.name);
        std::fs::create_dir_all(&journal.dir)?;
        tracing::info!("  Collection '{}': {}", entry.name, journal.dir.display());

        let collection = Collection::new(entry.name.as_str(), entry.kind, journal, backend.clone())?;
        collections.load(collection)?;
    }

    if collections.is_empty() {
        tracing::warn!("No collections configured; the collector will idle");
    }

    let gc = start_garbage_collector(collections.clone(), config.gc.poll_interval())?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping garbage collector...");

    stop_garbage_collector(&gc);
    let stats = tokio::task::spawn_blocking(move || gc.join()).await??;
    tracing::info!(
        "Collector ran {} ticks, flushed {} bytes, sealed {} journals",
        stats.ticks,
        stats.bytes_flushed,
        stats.segments_sealed
    );

    // Flush journals before exit
    if let Err(e) = collections.flush_all() {
        tracing::error!("Failed to flush journals on shutdown: {}", e);
    }

    tracing::info!("strata stopped");
    Ok(())
}
