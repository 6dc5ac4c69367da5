//! The embeddable server: listener, engine loop, and lifecycle.
//!
//! Hosts construct an [`InspectServer`], register variables, then call
//! [`run`](InspectServer::run) (blocking) or
//! [`run_async`](InspectServer::run_async) (dedicated thread). All engine
//! state lives on a current-thread runtime, so the push engine keeps its
//! single-threaded contract; connection actors and the engine loop are
//! cooperative tasks on that one thread.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use glimpse_core::{Engine, EngineStats, Event, Parameters};

use crate::ws::{run_connection, EngineCommand, WsTransport};

// ── Errors ───────────────────────────────────────────────────────

/// Failures surfaced by [`InspectServer::run`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The tokio runtime could not be constructed.
    #[error("runtime construction failed: {0}")]
    Runtime(#[from] std::io::Error),
}

// ── InspectServer ────────────────────────────────────────────────

/// A glimpse instance: push engine plus WebSocket front end.
pub struct InspectServer {
    engine: Engine<WsTransport>,
    token: CancellationToken,
    stats: Arc<EngineStats>,
    listen_addr: Arc<OnceLock<SocketAddr>>,
}

impl InspectServer {
    pub fn new(params: Parameters) -> Self {
        let engine = Engine::new(params);
        let stats = engine.stats();
        Self {
            engine,
            token: CancellationToken::new(),
            stats,
            listen_addr: Arc::new(OnceLock::new()),
        }
    }

    /// Expose a variable under `path`. Register everything before
    /// calling [`run`](Self::run); the engine moves onto its own thread
    /// after that.
    pub fn var<F>(&mut self, path: impl Into<String>, getter: F) -> bool
    where
        F: Fn(&[i32]) -> Vec<u8> + Send + 'static,
    {
        self.engine.var(path, getter)
    }

    /// Install the host's Connect/Disconnect/Custom event handler.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(i32, Event<'_>) + Send + 'static,
    {
        self.engine.set_handler(handler);
    }

    /// A cloneable handle for stopping the server and reading its
    /// statistics from other threads.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            token: self.token.clone(),
            stats: Arc::clone(&self.stats),
            listen_addr: Arc::clone(&self.listen_addr),
        }
    }

    /// Run the service on the current thread until stopped. Blocking.
    pub fn run(self) -> Result<(), ServerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())
    }

    /// Run the service on a dedicated background thread.
    pub fn run_async(self) -> thread::JoinHandle<Result<(), ServerError>> {
        thread::spawn(move || self.run())
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn serve(self) -> Result<(), ServerError> {
        let Self {
            engine,
            token,
            listen_addr,
            ..
        } = self;
        let params = engine.params().clone();

        let listener = TcpListener::bind(("0.0.0.0", params.port_listen))
            .await
            .map_err(|source| ServerError::Bind {
                port: params.port_listen,
                source,
            })?;
        let bound = listener.local_addr()?;
        let _ = listen_addr.set(bound);
        info!(%bound, http_root = %params.http_root.display(), "glimpse listening");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let engine_task = tokio::spawn(engine_loop(engine, cmd_rx, token.clone()));
        let idle_timeout = Duration::from_secs(params.t_idle_timeout_s as u64);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(run_connection(
                                stream,
                                peer,
                                cmd_tx.clone(),
                                token.clone(),
                                idle_timeout,
                            ));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }

        drop(cmd_tx);
        let _ = engine_task.await;
        info!("glimpse stopped");
        Ok(())
    }
}

// ── ServerHandle ─────────────────────────────────────────────────

/// Control and statistics handle, detached from the running server.
#[derive(Clone)]
pub struct ServerHandle {
    token: CancellationToken,
    stats: Arc<EngineStats>,
    listen_addr: Arc<OnceLock<SocketAddr>>,
}

impl ServerHandle {
    /// Request shutdown: every live socket is closed and the listener
    /// released. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Address the listener actually bound, once it has.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.get().copied()
    }

    /// Number of connected clients.
    pub fn n_connected(&self) -> usize {
        self.stats.n_clients() as usize
    }

    /// Logical outbound payload bytes so far.
    pub fn tx_total(&self) -> u64 {
        self.stats.tx_total()
    }

    /// Raw inbound frame bytes so far.
    pub fn rx_total(&self) -> u64 {
        self.stats.rx_total()
    }
}

// ── Engine loop ──────────────────────────────────────────────────

/// Apply commands from connection actors and run deferred ticks.
///
/// A burst of queued commands is drained before a single tick runs, so
/// ticks scheduled by consecutive messages coalesce while still running
/// strictly after the mutations that requested them.
async fn engine_loop(
    mut engine: Engine<WsTransport>,
    mut rx: mpsc::UnboundedReceiver<EngineCommand>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                let mut tick = apply(&mut engine, cmd);
                while let Ok(more) = rx.try_recv() {
                    tick |= apply(&mut engine, more);
                }
                if tick {
                    engine.update();
                }
            }
        }
    }
}

fn apply(engine: &mut Engine<WsTransport>, cmd: EngineCommand) -> bool {
    match cmd {
        EngineCommand::Connect {
            addr,
            transport,
            reply,
        } => {
            let client_id = engine.connect(addr, transport);
            let _ = reply.send(client_id);
            false
        }
        EngineCommand::Message { client_id, data } => engine.on_message(client_id, &data),
        EngineCommand::Disconnect { client_id } => {
            engine.disconnect(client_id);
            false
        }
    }
}
