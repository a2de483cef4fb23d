//! eraclaim-daemon: staking reward reporting and batch claiming.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via newline-delimited JSON-RPC over a Unix socket.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use eraclaim_claim::ClaimProgress;
use eraclaim_ledger::memory::{ChainSnapshot, MemoryLedger};
use eraclaim_tx::CancelHandle;
use eraclaim_types::AccountId;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::events::{Event, EventBus};
use crate::rpc::RpcServer;

/// A claim run owned by the daemon.
pub struct ActiveClaim {
    pub id: String,
    pub signer: AccountId,
    /// Dropping this cancels the run.
    pub cancel: CancelHandle,
    pub progress: watch::Receiver<ClaimProgress>,
    pub task: JoinHandle<()>,
}

impl ActiveClaim {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Ledger backend.
    pub ledger: Arc<MemoryLedger>,
    /// Database connection.
    pub db: Arc<Mutex<rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// The current or most recent claim run. At most one runs at a time.
    pub claim: Mutex<Option<ActiveClaim>>,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    pub fn new(ledger: MemoryLedger, conn: rusqlite::Connection, config: DaemonConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ledger: Arc::new(ledger),
            db: Arc::new(Mutex::new(conn)),
            config,
            event_bus: EventBus::new(1000),
            claim: Mutex::new(None),
            shutdown_tx,
        }
    }
}

fn init_tracing(config: &DaemonConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("eraclaim={}", config.advanced.log_level).parse()?);

    if config.advanced.log_file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.advanced.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }
    Ok(())
}

fn load_ledger(config: &DaemonConfig) -> anyhow::Result<MemoryLedger> {
    let path = config.snapshot_path();
    if path.exists() {
        Ok(MemoryLedger::from_json_file(&path)?)
    } else {
        warn!(path = %path.display(), "No chain snapshot found, starting with an empty ledger");
        Ok(MemoryLedger::new(ChainSnapshot::default()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config and initialize tracing
    let config = DaemonConfig::load()?;
    init_tracing(&config)?;

    info!("eraclaim daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database and ledger
    let conn = eraclaim_db::open(&data_dir.join("eraclaim.db"))?;
    let ledger = load_ledger(&config)?;

    // 3. Build daemon state
    let state = Arc::new(DaemonState::new(ledger, conn, config));

    // 4. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    // Mirror emitted events into the log
    let mut events = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(
                    sequence = event.sequence,
                    event_type = %event.event_type,
                    "event emitted"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    state.event_bus.emit(Event::now(
        "DaemonStarted",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ));

    // 5. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown: stop any claim before its next batch
    info!("Daemon shutting down gracefully");
    if let Some(active) = state.claim.lock().await.take() {
        if active.is_running() {
            info!(claim_id = %active.id, "Canceling running claim");
            active.cancel.cancel();
            let _ = active.task.await;
        }
    }

    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
