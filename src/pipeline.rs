//! Ingestion pipeline
//!
//! Orchestrates parser -> classification -> store/sink over a chunked byte
//! stream. Classified records accumulate in per-tier buffers; when either
//! buffer reaches the batch size both are flushed (persisted, handed to the
//! sink) and the task yields once so other scheduled work can run. This caps
//! the pipeline's monopolization of the executor to one batch at a time.
//!
//! Watch-tier items are unbatched and unpersisted: they go straight to the
//! sink as they are classified.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::models::{AllowEntry, BlockEntry, Classified, Tier};
use crate::parser::{ParsedLine, RecordParser};
use crate::rules::ClassificationEngine;
use crate::store::ListStore;

/// Consumer of classified output; the rendering layer sits behind this
pub trait Sink {
    /// A flushed batch of records for one tier (High or Low)
    fn on_batch(&mut self, tier: Tier, items: &[Classified]);

    /// A watch-tier record, emitted immediately
    fn on_watch(&mut self, item: &Classified);

    /// Progress percentage with two-decimal precision, e.g. "42.17"
    fn on_progress(&mut self, pct: &str);

    /// End of run
    fn on_complete(&mut self);
}

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    HeaderPending,
    Streaming,
    Draining,
    Done,
    Error,
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub lines_processed: usize,
    pub records_classified: usize,
    pub blocked: usize,
    pub allowed: usize,
    pub watched: usize,
}

/// Single-run ingestion pipeline
///
/// Runs are not cancellable mid-flight and must not execute concurrently
/// against the same store; partially flushed batches stay persisted if the
/// run fails (at-least-once, no rollback).
pub struct IngestionPipeline<'a, S: Sink> {
    config: PipelineConfig,
    engine: ClassificationEngine,
    store: ListStore,
    sink: &'a mut S,
    state: PipelineState,
    block_buffer: Vec<Classified>,
    allow_buffer: Vec<Classified>,
}

impl<'a, S: Sink> IngestionPipeline<'a, S> {
    pub fn new(
        config: PipelineConfig,
        engine: ClassificationEngine,
        store: ListStore,
        sink: &'a mut S,
    ) -> Self {
        Self {
            config,
            engine,
            store,
            sink,
            state: PipelineState::Idle,
            block_buffer: Vec::new(),
            allow_buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the pipeline over `reader`. `total_lines` is the line-terminator
    /// count from a pre-scan of the source, used for progress reporting.
    pub async fn run<R: AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
        total_lines: usize,
    ) -> Result<RunStats> {
        let mut parser = RecordParser::new();
        let mut stats = RunStats::default();
        let mut chunk = vec![0u8; self.config.chunk_size];

        self.state = PipelineState::HeaderPending;

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.state = PipelineState::Error;
                    return Err(e).context("Failed to read from source stream");
                }
            };
            if n == 0 {
                break;
            }

            let parsed = parser.push_chunk(&chunk[..n]);
            if self.state == PipelineState::HeaderPending && parser.header_seen() {
                self.state = PipelineState::Streaming;
            }

            for line in parsed.lines {
                // Malformed or blank lines count toward progress too, in
                // stream position
                let record = match line {
                    ParsedLine::Record(record) => record,
                    ParsedLine::Skipped => {
                        stats.lines_processed += 1;
                        self.report_progress(stats.lines_processed, total_lines);
                        continue;
                    }
                };

                let now_ms = Utc::now().timestamp_millis();
                let score = self.engine.classify(&record, now_ms);
                let item = Classified {
                    record,
                    score,
                    classified_at_ms: now_ms,
                };

                match item.score.tier {
                    Tier::High => {
                        stats.blocked += 1;
                        self.block_buffer.push(item);
                    }
                    Tier::Low => {
                        stats.allowed += 1;
                        self.allow_buffer.push(item);
                    }
                    Tier::Medium => {
                        stats.watched += 1;
                        self.sink.on_watch(&item);
                    }
                }

                stats.records_classified += 1;
                stats.lines_processed += 1;
                self.report_progress(stats.lines_processed, total_lines);

                if self.block_buffer.len() >= self.config.batch_size
                    || self.allow_buffer.len() >= self.config.batch_size
                {
                    self.flush().await;
                }
            }
        }

        self.state = PipelineState::Draining;
        let discarded = parser.finish();
        if discarded > 0 {
            debug!("Discarded {} bytes of unterminated trailing data", discarded);
        }
        self.flush().await;

        self.state = PipelineState::Done;
        self.sink.on_complete();
        info!(
            "Run complete: {} lines, {} blocked, {} allowed, {} watched",
            stats.lines_processed, stats.blocked, stats.allowed, stats.watched
        );

        Ok(stats)
    }

    fn report_progress(&mut self, processed: usize, total: usize) {
        let pct = if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        };
        self.sink.on_progress(&format!("{:.2}", pct));
    }

    /// Persist and emit both buffers, then yield once to the scheduler.
    /// Persistence is best-effort: a write failure is logged and the batch
    /// still reaches the sink.
    async fn flush(&mut self) {
        let flushed = !self.block_buffer.is_empty() || !self.allow_buffer.is_empty();

        if !self.block_buffer.is_empty() {
            for item in &self.block_buffer {
                let entry = BlockEntry::new(&item.record, &item.score, item.classified_at_ms);
                if let Err(e) = self.store.record_block(&entry) {
                    warn!("Failed to persist block entry for {}: {:#}", item.record.ip, e);
                }
            }
            self.sink.on_batch(Tier::High, &self.block_buffer);
            self.block_buffer.clear();
        }

        if !self.allow_buffer.is_empty() {
            for item in &self.allow_buffer {
                let entry = AllowEntry::from_record(&item.record);
                if let Err(e) = self.store.record_allow(&entry) {
                    warn!("Failed to persist allow entry for {}: {:#}", item.record.ip, e);
                }
            }
            self.sink.on_batch(Tier::Low, &self.allow_buffer);
            self.allow_buffer.clear();
        }

        if flushed {
            tokio::task::yield_now().await;
        }
    }
}

/// Count line terminators in a file; the pre-scan for progress reporting
pub async fn count_lines(path: &std::path::Path) -> Result<usize> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open source file: {}", path.display()))?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += buf[..n].iter().filter(|&&b| b == b'\n').count();
    }
    Ok(total)
}
