//! Connection acceptor and server lifecycle.
//!
//! [`LineServer::bind`] loads the checkpoint into the directory and binds the
//! TCP listener; [`LineServer::run`] registers the periodic checkpoint task,
//! spawns the checkpoint worker, then accepts connections until ctrl-c,
//! handing each one off to its own session task without blocking the accept
//! loop.
//!
//! Checkpoints never run on a client-facing task: tick boundaries and
//! new-user registrations only push a [`CheckpointReason`] into an unbounded
//! channel, and a dedicated worker does the broadcast + serialize + verify
//! work. Shutdown is: stop accepting, flip the shutdown watch so every
//! session closes, write one final checkpoint, exit.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::directory::UserDirectory;
use crate::server::session::{self, SessionContext};
use crate::server::ticks::TickScheduler;
use crate::storage::CheckpointStore;

/// Why a checkpoint was requested; logged with the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointReason {
    /// The tick counter crossed the configured interval.
    Interval,
    /// A new username was just registered.
    NewUser,
    /// Final checkpoint during shutdown.
    Shutdown,
}

/// The listening server: acceptor, shared state, and checkpoint plumbing.
pub struct LineServer {
    config: Arc<Config>,
    listener: TcpListener,
    directory: UserDirectory,
    ticks: TickScheduler,
    store: Arc<CheckpointStore>,
    checkpoint_tx: mpsc::UnboundedSender<CheckpointReason>,
    checkpoint_rx: mpsc::UnboundedReceiver<CheckpointReason>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LineServer {
    /// Load the checkpoint (absent file = empty directory) and bind the
    /// listen socket. Binding is the only failure that is fatal to the
    /// process.
    pub async fn bind(config: Config) -> Result<Self> {
        let store = Arc::new(CheckpointStore::new(&config.storage.checkpoint_file));
        let directory = UserDirectory::new();
        directory.restore(store.load()?);

        let listener = TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("cannot bind {}", config.server.bind))?;
        info!(
            "Listening on {} ({} known users)",
            listener.local_addr()?,
            directory.len()
        );

        let (checkpoint_tx, checkpoint_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(LineServer {
            config: Arc::new(config),
            listener,
            directory,
            ticks: TickScheduler::new(),
            store,
            checkpoint_tx,
            checkpoint_rx,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Read-only access to the shared directory (status rendering, tests).
    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    /// Accept-and-spawn until ctrl-c, then drain: signal sessions, final
    /// checkpoint, exit.
    pub async fn run(mut self) -> Result<()> {
        let interval = self.config.storage.checkpoint_interval_ticks;
        let tick_tx = self.checkpoint_tx.clone();
        self.ticks.register("checkpoint", interval, move || {
            // Channel send only: a slow or failing checkpoint can never
            // stall the loop whose tick crossed the boundary.
            let _ = tick_tx.send(CheckpointReason::Interval);
        });

        let worker_directory = self.directory.clone();
        let worker_store = self.store.clone();
        let mut checkpoint_rx = self.checkpoint_rx;
        let checkpoint_worker = tokio::spawn(async move {
            while let Some(reason) = checkpoint_rx.recv().await {
                run_checkpoint(&worker_directory, &worker_store, reason);
            }
        });

        let ctx = SessionContext {
            config: self.config.clone(),
            directory: self.directory.clone(),
            ticks: self.ticks.clone(),
            checkpoint_tx: self.checkpoint_tx.clone(),
            shutdown: self.shutdown_rx.clone(),
        };

        loop {
            self.ticks.tick();
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("Connection from {}", peer);
                            tokio::spawn(session::run(stream, peer, ctx.clone()));
                        }
                        Err(e) => {
                            // Transient accept errors (EMFILE and friends)
                            // should not take the server down.
                            error!("accept failed: {}", e);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        drop(self.listener); // stop accepting
        let _ = self.shutdown_tx.send(true);

        run_checkpoint(&self.directory, &self.store, CheckpointReason::Shutdown);

        // Ticks (and their checkpoint sender) die with us; let the worker
        // finish anything already queued.
        drop(self.checkpoint_tx);
        drop(self.ticks);
        let _ = checkpoint_worker.await;

        info!("Server stopped");
        Ok(())
    }
}

/// One checkpoint pass: notify connected users, snapshot, save + verify.
/// Persistence failures are logged and never surfaced to clients.
fn run_checkpoint(directory: &UserDirectory, store: &CheckpointStore, reason: CheckpointReason) {
    let timestamp = Utc::now();
    directory.broadcast(&format!(
        "[{}] SYSTEM-MESSAGE: Checkpoint.\r\n",
        timestamp.to_rfc3339()
    ));
    info!("Checkpoint ({:?}) to {}...", reason, store.path().display());
    if let Err(e) = store.save(&directory.snapshot()) {
        error!("Checkpoint failed: {:#}", e);
    }
}
