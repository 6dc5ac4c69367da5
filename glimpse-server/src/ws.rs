//! WebSocket transport: per-connection actor and the send half handed
//! to the engine.
//!
//! Each accepted socket gets its own task that performs the tungstenite
//! handshake, registers with the engine loop, and then shuttles frames
//! in both directions. The engine never touches a socket — it sees only
//! [`WsTransport`], whose buffered-bytes gauge mirrors what this actor
//! has accepted but not yet written.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use glimpse_core::ClientTransport;

// ── Engine commands ──────────────────────────────────────────────

/// Work forwarded from connection actors to the engine loop.
pub(crate) enum EngineCommand {
    Connect {
        addr: std::net::IpAddr,
        transport: WsTransport,
        reply: oneshot::Sender<i32>,
    },
    Message {
        client_id: i32,
        data: Vec<u8>,
    },
    Disconnect {
        client_id: i32,
    },
}

// ── WsTransport ──────────────────────────────────────────────────

/// Send half of one WebSocket connection, owned by the engine.
///
/// `send_binary` only enqueues; the connection actor performs the actual
/// write and drains the gauge afterwards, so `buffered_amount` stays
/// non-zero exactly while bytes are in flight.
pub struct WsTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    buffered: Arc<AtomicUsize>,
}

impl ClientTransport for WsTransport {
    fn send_binary(&mut self, bytes: &[u8], _compress: bool) -> bool {
        // Per-message compression is negotiated at the socket level by
        // the WebSocket library, not per frame; the hint is dropped here.
        self.buffered.fetch_add(bytes.len(), Ordering::Relaxed);
        if self.tx.send(bytes.to_vec()).is_ok() {
            true
        } else {
            self.buffered.fetch_sub(bytes.len(), Ordering::Relaxed);
            false
        }
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}

// ── Connection actor ─────────────────────────────────────────────

/// Drive one client connection until it closes, errors, idles out, or
/// the server shuts down.
pub(crate) async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine_tx: mpsc::UnboundedSender<EngineCommand>,
    shutdown: CancellationToken,
    idle_timeout: Duration,
) {
    let _ = stream.set_nodelay(true);

    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let buffered = Arc::new(AtomicUsize::new(0));
    let transport = WsTransport {
        tx: out_tx,
        buffered: Arc::clone(&buffered),
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if engine_tx
        .send(EngineCommand::Connect {
            addr: peer.ip(),
            transport,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }
    let Ok(client_id) = reply_rx.await else {
        return;
    };
    debug!(client_id, %peer, "connection registered");

    let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            _ = tokio::time::sleep_until(idle_deadline) => {
                debug!(client_id, "idle timeout, closing connection");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            outbound = out_rx.recv() => {
                let Some(bytes) = outbound else { break };
                let len = bytes.len();
                let result = sink.send(Message::Binary(bytes)).await;
                buffered.fetch_sub(len, Ordering::Relaxed);
                if result.is_err() {
                    break;
                }
            }

            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Binary(data))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        if engine_tx
                            .send(EngineCommand::Message { client_id, data })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    let _ = engine_tx.send(EngineCommand::Disconnect { client_id });
    debug!(client_id, %peer, "connection closed");
}
