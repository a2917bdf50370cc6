#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # pathxfer
//!
//! Chunked, encrypted file transfer carried entirely in HTTP `GET` request
//! paths.
//!
//! ## Subcommands
//!
//! - `pathxfer serve` (default): run the receiver
//! - `pathxfer send --file <path>`: push one file to a receiver
//!
//! ## API surface
//!
//! | Method | Path                                            | Description            |
//! |--------|-------------------------------------------------|------------------------|
//! | GET    | `/api/health`                                   | Liveness probe         |
//! | GET    | `/init/{fp}/{total}/{size}/{name}/@v/v1.info`   | Open a transfer        |
//! | GET    | `/chunk/{fp}/{index}/{sum}/{hex}/@v/v1.info`    | Deliver one chunk      |
//! | GET    | `/complete/{fp}/{sum}/@v/v1.info`               | Verify and write file  |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          entry point, clap subcommands, server setup, graceful shutdown
//! config.rs        TOML + env-var configuration
//! state.rs         AppState shared by handlers
//! routes/
//!   health.rs      GET /api/health
//!   protocol.rs    fallback handler for protocol paths
//! xfer/
//!   codec.rs       AES-256-GCM payload encoding
//!   chunking.rs    chunk size policy, split/join
//!   request.rs     request path grammar
//!   store.rs       in-memory transfer table
//!   reassembly.rs  verify, decrypt, persist
//!   manager.rs     init/chunk/complete handling
//!   sweeper.rs     idle transfer eviction
//!   sender.rs      sending state machine with retry
//!   transport.rs   HTTP transport for the sender
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pathxfer::util::human_bytes;
use pathxfer::xfer::codec::ContentCodec;
use pathxfer::xfer::sweeper::spawn_sweeper;
use pathxfer::xfer::transport::HttpTransport;
use pathxfer::xfer::types::{Phase, Progress};
use pathxfer::{routes, AppState, Config, Sender};

/// Chunked, encrypted file transfer over HTTP request paths.
#[derive(Parser)]
#[command(name = "pathxfer", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the receiver (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Send one file to a receiver.
    Send(SendArgs),
}

#[derive(Args)]
struct SendArgs {
    /// File to send.
    #[arg(short, long)]
    file: PathBuf,
    /// Receiver base URL (overrides `client.url`).
    #[arg(short, long)]
    url: Option<String>,
    /// Shared encryption key (overrides `transfer.encryption_key`).
    #[arg(short, long)]
    key: Option<String>,
    /// Remote filename (defaults to the local file name).
    #[arg(short, long)]
    name: Option<String>,
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
    /// Log every request and retry.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { config }) => run_server(config.as_deref()).await,
        Some(Commands::Send(args)) => run_send(args).await,
        None => run_server(None).await,
    }
}

fn init_tracing(level: &str) {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();
}

async fn run_server(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    init_tracing(&config.logging.level);

    info!("pathxfer v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    if config.uses_default_key() {
        warn!("Using default encryption key; set PATHXFER_KEY or update config");
    }

    let state = AppState::new(config);

    let output_dir = state.manager.reassembler().output_dir();
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
    info!("Saving files to {}", output_dir.display());

    let cancel = CancellationToken::new();
    let sweep_task = spawn_sweeper(
        Arc::clone(state.manager.store()),
        Duration::from_secs(state.config.transfer.sweep_interval_secs),
        Duration::from_secs(state.config.transfer.inactivity_timeout_secs),
        cancel.clone(),
    );

    let app = routes::app(state.clone());
    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", state.config.server.listen))?;

    info!("Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down...");
    cancel.cancel();
    let _ = sweep_task.await;

    for pending in state.manager.summaries().await {
        if !pending.finalized {
            warn!(
                transfer_id = %pending.id,
                received = pending.received,
                total_chunks = pending.total_chunks,
                "Discarding unfinished transfer"
            );
        }
    }
    info!(completed = state.manager.completed_total(), "Goodbye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}

async fn run_send(args: SendArgs) -> anyhow::Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.client.url = url;
    }
    if let Some(key) = args.key {
        config.transfer.encryption_key = key;
    }
    config.validate()?;

    let level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_tracing(level);

    if config.uses_default_key() {
        warn!("Using default encryption key; pass --key or set PATHXFER_KEY");
    }
    let transport = HttpTransport::new(&config.client.url, &config.http_options())?;
    info!(url = %transport.base_url(), file = %args.file.display(), "Sending");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            interrupt.cancel();
        }
    });

    let (progress_tx, progress_rx) = mpsc::channel(64);
    let reporter = tokio::spawn(report_progress(progress_rx));

    let sender = Sender::new(
        transport,
        ContentCodec::new(&config.transfer.encryption_key),
        config.sender_config(),
    )
    .with_cancel(cancel)
    .with_progress(progress_tx);

    let result = sender.send_file(&args.file, args.name).await;
    drop(sender);
    let _ = reporter.await;

    let outcome = result.with_context(|| format!("failed to send {}", args.file.display()))?;
    if !outcome.finalized {
        bail!(
            "all {} chunks delivered but the receiver did not confirm completion",
            outcome.total_chunks
        );
    }

    info!(
        transfer_id = %outcome.fingerprint,
        chunks = outcome.total_chunks,
        payload = %human_bytes(outcome.payload_len as u64),
        elapsed = ?outcome.elapsed,
        "Transfer complete"
    );
    Ok(())
}

/// Log chunk progress roughly every tenth of the transfer.
async fn report_progress(mut rx: mpsc::Receiver<Progress>) {
    while let Some(p) = rx.recv().await {
        if p.phase != Phase::SendingChunks || !p.succeeded || p.total == 0 {
            continue;
        }
        let step = (p.total / 10).max(1);
        if p.current % step == 0 || p.current == p.total {
            info!(
                "Progress: {}/{} chunks ({}%) in {:.1}s",
                p.current,
                p.total,
                p.current * 100 / p.total,
                p.elapsed.as_secs_f64()
            );
        }
    }
}
