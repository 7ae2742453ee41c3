pub mod config;
pub mod feed;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod rate_limit;
pub mod refresh;
pub mod rules;
pub mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::info;

use config::Config;
use models::{AllowEntry, BlockEntry, BlockStatusRow, ListKind};
use pipeline::{IngestionPipeline, RunStats, Sink};
use rules::ClassificationEngine;
use store::ListStore;

/// Core logsift instance: configuration plus the durable list store
pub struct Logsift {
    config: Config,
    store: ListStore,
}

impl Logsift {
    /// Create a new instance, opening the store at the configured path
    pub fn new(config: Config) -> Result<Self> {
        let store = ListStore::open(config.store_path(), config.block_ttl_ms())?;
        Ok(Self { config, store })
    }

    /// Create instance with custom store path
    pub fn with_store_path<P: AsRef<Path>>(config: Config, path: P) -> Result<Self> {
        let store = ListStore::open(path, config.block_ttl_ms())?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ListStore {
        &self.store
    }

    /// Classify every record in a CSV file, persisting results as the run
    /// streams. Loads the suspicious-ASN feed first; a feed failure degrades
    /// to an empty set and the run proceeds.
    pub async fn process_file<S: Sink>(&self, path: &Path, sink: &mut S) -> Result<RunStats> {
        let suspicious_asns = feed::load_or_empty(&self.config.feed).await;

        let engine = ClassificationEngine::new(
            &self.config.rules,
            &self.config.limiter,
            suspicious_asns,
        )?;

        let total_lines = pipeline::count_lines(path).await?;
        info!("Processing {} ({} lines)", path.display(), total_lines);

        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open source file: {}", path.display()))?;

        let mut pipeline = IngestionPipeline::new(
            self.config.pipeline.clone(),
            engine,
            self.store.clone(),
            sink,
        );
        pipeline.run(file, total_lines).await
    }

    /// Whether `ip` has a block event younger than the TTL right now
    pub fn is_currently_blocked(&self, ip: &str) -> Result<bool> {
        self.store
            .is_currently_blocked(ip, Utc::now().timestamp_millis())
    }

    /// Current blocklist view with remaining TTLs
    pub fn block_status(&self) -> Result<Vec<BlockStatusRow>> {
        self.store.block_status(Utc::now().timestamp_millis())
    }

    pub fn allow_snapshot(&self) -> Result<Vec<AllowEntry>> {
        self.store.allow_snapshot()
    }

    pub fn block_snapshot(&self) -> Result<Vec<BlockEntry>> {
        self.store.block_snapshot()
    }

    /// Destructive wipe of one list. The caller confirms intent; the store
    /// does not.
    pub fn clear_list(&self, kind: ListKind) -> Result<()> {
        self.store.clear(kind)
    }
}
