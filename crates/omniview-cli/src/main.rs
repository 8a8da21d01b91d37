//! Omniview CLI: headless viewer for local files and pasted URLs.
//!
//! Settings come from OMNIVIEW_* environment variables (or a .env file);
//! flags override them.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use omniview_cli::{format_bytes, init_tracing, read_input, summarize, truncate_string};
use omniview_core::config::ViewerConfig;
use omniview_core::constants::DEFAULT_PRUNE_KEEP;
use omniview_core::error::ErrorMetadata;
use omniview_core::models::{MediaRecord, RenderedContent};
use omniview_services::{IngestReport, ViewerSession};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "omniview")]
#[command(about = "Preview local files and pasted URLs without persisting anything")]
struct Args {
    /// Files or URLs to view, in display order
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output format: json or table (default: table)
    #[arg(long, default_value = "table")]
    format: String,

    /// Skip the HEAD request for pasted URLs
    #[arg(long)]
    no_probe: bool,

    /// Override the live set cap
    #[arg(long)]
    max_records: Option<usize>,

    /// After ingesting, keep only the N most recent records (default 5)
    #[arg(long, value_name = "N")]
    keep_recent: Option<Option<usize>>,

    /// List records without materializing them
    #[arg(long)]
    list_only: bool,
}

#[derive(Serialize)]
struct Tile {
    #[serde(flatten)]
    record: MediaRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<RenderedContent>,
}

#[derive(Serialize)]
struct Output {
    tiles: Vec<Tile>,
    dropped: usize,
    failures: Vec<Problem>,
    notices: Vec<Problem>,
}

#[derive(Serialize)]
struct Problem {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
    input: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    let mut config = ViewerConfig::from_env().context("Invalid OMNIVIEW_* configuration")?;
    if args.no_probe {
        config.probe_remote = false;
    }
    if let Some(max_records) = args.max_records {
        config.max_records = max_records;
    }

    let (session, _handles) =
        ViewerSession::with_defaults(config).context("Failed to start viewer session")?;
    let session = Arc::new(session);
    let sweeper = session.start_sweeper();

    let result = tokio::select! {
        result = run(&session, &args) => result,
        _ = shutdown_signal() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };

    session.teardown().await;
    sweeper.abort();
    result
}

async fn run(session: &ViewerSession, args: &Args) -> anyhow::Result<()> {
    let mut inputs = Vec::with_capacity(args.inputs.len());
    for arg in &args.inputs {
        inputs.push(read_input(arg).await?);
    }

    let report = session.ingest(inputs).await;

    if let Some(keep) = args.keep_recent {
        let pruned = session
            .prune_to_recent(keep.unwrap_or(DEFAULT_PRUNE_KEEP))
            .await;
        tracing::info!(pruned, "Pruned older records");
    }

    let mut tiles = Vec::with_capacity(report.records.len());
    for record in session.snapshot().await.iter() {
        let content = if args.list_only {
            None
        } else {
            let materialized = session.materialize(record.id).await?;
            Some(materialized.content.clone())
        };
        // Re-read so the materialized flag and handle are current.
        let record = session.get(record.id).await.unwrap_or_else(|| record.clone());
        tiles.push(Tile { record, content });
    }

    let output = build_output(tiles, &report);
    match args.format.as_str() {
        "json" => {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Serialize output")?
            );
        }
        _ => print_table(&output),
    }

    Ok(())
}

fn build_output(tiles: Vec<Tile>, report: &IngestReport) -> Output {
    Output {
        tiles,
        dropped: report.dropped,
        failures: report
            .failures
            .iter()
            .map(|f| Problem {
                code: f.error.error_code(),
                message: f.error.client_message(),
                action: f.error.suggested_action(),
                input: Some(f.input.clone()),
            })
            .collect(),
        notices: report
            .notices
            .iter()
            .map(|n| Problem {
                code: n.error_code(),
                message: n.client_message(),
                action: n.suggested_action(),
                input: None,
            })
            .collect(),
    }
}

fn print_table(output: &Output) {
    println!("\n=== Live Set ===\n");
    println!(
        "{:>3}  {:<32} {:<12} {:>10}  {}",
        "#", "Name", "Category", "Size", "Preview"
    );

    for tile in &output.tiles {
        let record = &tile.record;
        let category = if record.danger_flag {
            format!("{}!", record.category)
        } else {
            record.category.to_string()
        };
        let preview = tile
            .content
            .as_ref()
            .map(summarize)
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>3}  {:<32} {:<12} {:>10}  {}",
            record.order_index,
            truncate_string(&record.name, 32),
            category,
            format_bytes(record.size_bytes),
            preview
        );
    }

    if output.dropped > 0 {
        println!("\n{} input(s) dropped: live set is full", output.dropped);
    }

    if !output.failures.is_empty() {
        println!("\n--- Skipped ---");
        for failure in &output.failures {
            println!(
                "{}: {} ({})",
                failure.input.as_deref().unwrap_or("?"),
                failure.message,
                failure.code
            );
            if let Some(action) = failure.action {
                println!("    {}", action);
            }
        }
    }

    if !output.notices.is_empty() {
        println!("\n--- Notices ---");
        for notice in &output.notices {
            println!("{} ({})", notice.message, notice.code);
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
