use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logsift::config::Config;
use logsift::models::{BlockStatusRow, Classified, ListKind, Tier};
use logsift::pipeline::Sink;
use logsift::refresh::BlocklistRefresher;
use logsift::Logsift;

#[derive(Parser)]
#[command(name = "logsift")]
#[command(author, version, about = "Streaming access-log risk classifier")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify every record in a CSV access log
    Process {
        /// Source CSV file
        file: PathBuf,

        /// Suppress per-record output, print only the summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show a persisted list
    List {
        /// Which list (allow, block)
        kind: ListKind,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show current block status for an IP
    Status {
        /// IP address to look up
        ip: String,
    },

    /// Live blocklist view, refreshed every second
    Watch,

    /// Wipe a persisted list
    Clear {
        /// Which list (allow, block)
        kind: ListKind,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Tabled)]
struct AllowRow {
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Scheme")]
    scheme: String,
    #[tabled(rename = "URI")]
    uri: String,
}

#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Scheme")]
    scheme: String,
    #[tabled(rename = "URI")]
    uri: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

impl BlockRow {
    fn from_status(row: &BlockStatusRow) -> Self {
        Self {
            ip: row.entry.ip.clone(),
            method: row.entry.method.clone(),
            scheme: row.entry.scheme.clone(),
            uri: row.entry.uri.clone(),
            reason: row.entry.reason.clone().unwrap_or_else(|| "N/A".to_string()),
            tier: row.entry.tier().to_string(),
            remaining: row.remaining_display(),
        }
    }
}

/// Console sink: classified records to stdout, progress to stderr
struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    fn print_item(&self, item: &Classified) {
        if self.quiet {
            return;
        }
        let tier = match item.score.tier {
            Tier::High => item.score.tier.to_string().red().bold(),
            Tier::Medium => item.score.tier.to_string().yellow(),
            Tier::Low => item.score.tier.to_string().green(),
        };
        let reason = item.score.reason().unwrap_or_default();
        println!(
            "{:<7} {:<16} {:<6} {:<5} {:<30} {}",
            tier, item.record.ip, item.record.method, item.record.scheme, item.record.uri, reason
        );
    }
}

impl Sink for ConsoleSink {
    fn on_batch(&mut self, _tier: Tier, items: &[Classified]) {
        for item in items {
            self.print_item(item);
        }
    }

    fn on_watch(&mut self, item: &Classified) {
        self.print_item(item);
    }

    fn on_progress(&mut self, pct: &str) {
        eprint!("\rProcessing: {}%", pct);
        let _ = std::io::stderr().flush();
    }

    fn on_complete(&mut self) {
        eprintln!();
    }
}

/// Install the tracing subscriber. `--debug` wins over `RUST_LOG`;
/// otherwise the environment decides, falling back to `info`.
pub fn init_logging(debug: bool) {
    let filter = match debug {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    let app = Logsift::new(config)?;

    match cli.command {
        Commands::Process { file, quiet } => {
            let mut sink = ConsoleSink { quiet };
            let stats = app.process_file(&file, &mut sink).await?;

            println!();
            println!(
                "{} lines processed: {} {}, {} {}, {} {}",
                stats.lines_processed,
                stats.blocked.to_string().red().bold(),
                "blocked",
                stats.watched.to_string().yellow(),
                "watched",
                stats.allowed.to_string().green(),
                "allowed"
            );
        }

        Commands::List { kind, format } => match kind {
            ListKind::Allow => {
                let entries = app.allow_snapshot()?;
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("Allowlist is empty");
                } else {
                    let rows: Vec<AllowRow> = entries
                        .iter()
                        .map(|e| AllowRow {
                            ip: e.ip.clone(),
                            method: e.method.clone(),
                            scheme: e.scheme.clone(),
                            uri: e.uri.clone(),
                        })
                        .collect();
                    println!("{}", Table::new(rows));
                }
            }
            ListKind::Block => {
                let entries = app.block_snapshot()?;
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("Blocklist is empty");
                } else {
                    let rows: Vec<BlockRow> =
                        app.block_status()?.iter().map(BlockRow::from_status).collect();
                    println!("{}", Table::new(rows));
                }
            }
        },

        Commands::Status { ip } => {
            if app.is_currently_blocked(&ip)? {
                let newest = app
                    .block_status()?
                    .into_iter()
                    .filter(|r| r.entry.ip == ip)
                    .max_by_key(|r| r.entry.timestamp)
                    .context("Blocklist entry disappeared")?;
                println!(
                    "{} is {} ({} remaining)",
                    ip,
                    "blocked".red().bold(),
                    newest.remaining_display()
                );
            } else {
                println!("{} is {}", ip, "not blocked".green());
            }
        }

        Commands::Watch => {
            println!("Watching blocklist (Ctrl-C to stop)");
            let refresher = BlocklistRefresher::spawn(
                app.store().clone(),
                Duration::from_secs(1),
                Duration::from_millis(500),
                |rows| {
                    let active: Vec<BlockRow> = rows
                        .iter()
                        .filter(|r| r.remaining_ms > 0)
                        .map(BlockRow::from_status)
                        .collect();
                    // Redraw in place
                    print!("\x1B[2J\x1B[H");
                    if active.is_empty() {
                        println!("No active blocks");
                    } else {
                        println!("{}", Table::new(active));
                    }
                },
            );

            tokio::signal::ctrl_c().await?;
            refresher.shutdown().await;
        }

        Commands::Clear { kind, yes } => {
            if !yes && !confirm(&format!("Clear the {}? [y/N] ", kind))? {
                println!("Aborted");
                return Ok(());
            }
            app.clear_list(kind)?;
            println!("Cleared {}", kind);
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
