//! Order board entry point.
//!
//! Loads configuration, starts the TCP and RFCOMM listeners, and runs the
//! board consumer until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! orderboard [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --port <PORT>            TCP port [env: ORDERBOARD_PORT]
//!   --bind <ADDR>            TCP bind address [env: ORDERBOARD_BIND]
//!   --rfcomm-channel <N>     RFCOMM channel
//!   --no-network             Do not start the TCP listener
//!   --no-wireless            Do not start the RFCOMM listener
//!   --log-level <LEVEL>      Log level when RUST_LOG is unset
//!   --write-config <PATH>    Write the effective config and exit
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load + validate AppConfig
//!  └─ start_listeners()
//!       ├─ orderboard-tcp     (std thread, blocking accept loop)
//!       └─ orderboard-rfcomm  (std thread, blocking accept loop)
//!            │ SnapshotSender::submit (try_send)
//!            ▼
//!  └─ OrderBoard::run         (Tokio task, single consumer)
//!            │ Renderer::render
//!            ▼
//!       TextRenderer (stdout)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orderboard::application::board::OrderBoard;
use orderboard::application::dispatch::{dispatcher, DEFAULT_DISPATCH_CAPACITY};
use orderboard::infrastructure::network::start_listeners;
use orderboard::infrastructure::render::TextRenderer;
use orderboard::infrastructure::storage::config::{
    load_config, load_config_from, save_config_to, AppConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Kitchen order board.
///
/// Receives order lists over TCP and Bluetooth RFCOMM and lays them out in
/// columns of in-progress and ready orders.
#[derive(Debug, Parser)]
#[command(name = "orderboard", about = "Kitchen order display board", version)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Defaults to `config.toml` in the platform config directory.  A
    /// missing file means built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long, env = "ORDERBOARD_PORT")]
    port: Option<u16>,

    /// IP address to bind the TCP listener to.
    #[arg(long, env = "ORDERBOARD_BIND")]
    bind: Option<String>,

    /// RFCOMM channel to listen on (1–30).
    #[arg(long)]
    rfcomm_channel: Option<u8>,

    /// Do not start the TCP listener.
    #[arg(long)]
    no_network: bool,

    /// Do not start the Bluetooth RFCOMM listener.
    #[arg(long)]
    no_wireless: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,

    /// Write the effective configuration to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(channel) = self.rfcomm_channel {
            config.wireless.channel = channel;
        }
        if self.no_network {
            config.network.enabled = false;
        }
        if self.no_wireless {
            config.wireless.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.display.log_level = level.clone();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if let Some(path) = &cli.write_config {
        save_config_to(&config, path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    // Initialise structured logging.  `RUST_LOG` wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.display.log_level)),
        )
        .init();

    info!("order board starting");

    let policy = config.layout_policy().context("invalid layout")?;

    // Shutdown flag shared by the listener threads.
    let running = Arc::new(AtomicBool::new(true));

    // ── Listeners ─────────────────────────────────────────────────────────────
    let (sender, receiver) = dispatcher(DEFAULT_DISPATCH_CAPACITY);
    let handles = start_listeners(&config, &sender, &running);
    // Only listener threads hold senders now; the consumer ends once they exit.
    drop(sender);

    if handles.is_empty() {
        warn!("no listeners running; the board will stay empty");
    }

    // ── Board consumer ────────────────────────────────────────────────────────
    let board = OrderBoard::new(policy, config.labels(), TextRenderer::stdout());
    let consumer = tokio::spawn(board.run(receiver));

    info!("order board ready.  Press Ctrl-C to exit.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    running.store(false, Ordering::Relaxed);
    tokio::task::spawn_blocking(move || {
        for handle in handles {
            handle.join();
        }
    })
    .await
    .context("listener join task failed")?;

    let board = consumer.await.context("board consumer task failed")?;
    let stats = board.stats();
    info!(
        "order board stopped: {} snapshot(s) applied ({} tcp, {} rfcomm), {} overflowed list(s)",
        stats.applied, stats.from_network, stats.from_wireless, stats.overflowed_lists
    );
    Ok(())
}
