//! The push engine: client lifecycle, inbound dispatch, and the tick.
//!
//! The engine is sans-I/O and single-threaded by contract: a transport
//! owns it on one event thread and calls [`Engine::connect`],
//! [`Engine::on_message`], [`Engine::disconnect`] and [`Engine::update`]
//! from there. `on_message` never sends; it only mutates state and tells
//! the caller whether to defer a tick, so ticks from a burst of inbound
//! frames can coalesce.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::client::ClientState;
use crate::config::Parameters;
use crate::error::GlimpseError;
use crate::event::{Event, EventHandler};
use crate::pipeline::{tick_client, TickOutcome};
use crate::protocol::{self, ClientMessage};
use crate::registry::GetterRegistry;
use crate::request::Request;
use crate::stats::EngineStats;
use crate::transport::ClientTransport;

/// Epoch milliseconds. The −1 sentinels in request timing fields rely on
/// an epoch-scale clock to stay inert under the freshness predicate.
pub fn timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A live-inspection push engine over some transport `T`.
pub struct Engine<T: ClientTransport> {
    params: Parameters,
    registry: GetterRegistry,
    stats: Arc<EngineStats>,
    clients: BTreeMap<i32, ClientState<T>>,
    /// Last assigned client id; pre-incremented, so the first client
    /// gets 2.
    last_client_id: i32,
    handler: Option<EventHandler>,
}

impl<T: ClientTransport> Engine<T> {
    /// Build an engine and register the built-in telemetry getters.
    pub fn new(params: Parameters) -> Self {
        let stats = Arc::new(EngineStats::new());
        let mut registry = GetterRegistry::new();

        let s = Arc::clone(&stats);
        registry.var("glimpse.nclients", move |_| {
            s.n_clients().to_le_bytes().to_vec()
        });
        let s = Arc::clone(&stats);
        registry.var("glimpse.tx_total", move |_| {
            s.tx_total().to_le_bytes().to_vec()
        });
        let s = Arc::clone(&stats);
        registry.var("glimpse.rx_total", move |_| {
            s.rx_total().to_le_bytes().to_vec()
        });
        let s = Arc::clone(&stats);
        registry.var("glimpse.ip_address[%d]", move |idxs| {
            idxs.first()
                .and_then(|&i| usize::try_from(i).ok())
                .and_then(|i| s.ip_of(i))
                .map(|ip| ip.to_vec())
                .unwrap_or_default()
        });

        Self {
            params,
            registry,
            stats,
            clients: BTreeMap::new(),
            last_client_id: 1,
            handler: None,
        }
    }

    // ── Host-facing registration ─────────────────────────────────

    /// Expose a variable under `path`. See [`GetterRegistry::var`].
    pub fn var<F>(&mut self, path: impl Into<String>, getter: F) -> bool
    where
        F: Fn(&[i32]) -> Vec<u8> + Send + 'static,
    {
        self.registry.var(path, getter)
    }

    /// Resolve a path to its getter id.
    pub fn lookup(&self, path: &str) -> Option<usize> {
        self.registry.lookup(path)
    }

    /// Install the host's event handler.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(i32, Event<'_>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Shared counters, readable from any thread.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Number of connected clients.
    pub fn n_connected(&self) -> usize {
        self.clients.len()
    }

    // ── Transport-facing lifecycle ───────────────────────────────

    /// Register a new connection and return its client id.
    pub fn connect(&mut self, addr: IpAddr, transport: T) -> i32 {
        self.last_client_id += 1;
        let client_id = self.last_client_id;

        let ip = ipv4_tail(addr);
        self.clients
            .insert(client_id, ClientState::new(timestamp_ms(), ip, transport));
        self.sync_client_shadow();

        debug!(client_id, "client connected");
        if let Some(handler) = self.handler.as_mut() {
            handler(client_id, Event::Connect { ip });
        }
        client_id
    }

    /// Drop a client's state after its connection closed.
    pub fn disconnect(&mut self, client_id: i32) {
        if self.clients.remove(&client_id).is_none() {
            return;
        }
        self.sync_client_shadow();

        debug!(client_id, "client disconnected");
        if let Some(handler) = self.handler.as_mut() {
            handler(client_id, Event::Disconnect);
        }
    }

    /// Dispatch one inbound frame. Returns `true` when the caller should
    /// defer a tick.
    pub fn on_message(&mut self, client_id: i32, frame: &[u8]) -> bool {
        self.stats.add_rx(frame.len() as u64);

        if !self.clients.contains_key(&client_id) {
            debug!(client_id, "message from unknown client dropped");
            return false;
        }

        match protocol::parse(frame) {
            Ok(ClientMessage::Subscribe(subs)) => {
                for sub in subs {
                    self.install_subscription(client_id, sub);
                }
                true
            }
            Ok(ClientMessage::Poll(ids)) => {
                self.rebuild_last_requests(client_id, &ids);
                true
            }
            Ok(ClientMessage::Refresh) => {
                self.refresh_last_requests(client_id);
                true
            }
            Ok(ClientMessage::Custom(body)) => {
                if !body.is_empty() {
                    if let Some(handler) = self.handler.as_mut() {
                        handler(client_id, Event::Custom(body));
                    }
                }
                false
            }
            Err(GlimpseError::UnknownMessageType(kind)) => {
                warn!(client_id, kind, "unknown message type");
                true
            }
            Err(err) => {
                debug!(client_id, %err, "dropping malformed message");
                false
            }
        }
    }

    /// Run one tick of the snapshot pipeline over every client.
    pub fn update(&mut self) {
        let now_ms = timestamp_ms();
        for (&client_id, cd) in self.clients.iter_mut() {
            match tick_client(client_id, cd, &self.registry, &self.params, now_ms) {
                TickOutcome::Sent { logical_bytes } => {
                    self.stats.add_tx(logical_bytes as u64);
                }
                TickOutcome::SkippedBackpressure | TickOutcome::Idle => {}
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn install_subscription(&mut self, client_id: i32, sub: protocol::Subscription) {
        let Some(getter_id) = self.registry.lookup(&sub.path) else {
            debug!(client_id, path = %sub.path, "subscription to unknown path ignored");
            return;
        };
        let Some(cd) = self.clients.get_mut(&client_id) else {
            return;
        };

        let idxs = sub
            .idxs
            .into_iter()
            .map(|idx| if idx == -1 { client_id } else { idx })
            .collect();
        debug!(
            client_id,
            request_id = sub.request_id,
            path = %sub.path,
            "subscription installed"
        );
        cd.requests
            .insert(sub.request_id, Request::new(getter_id, idxs));
    }

    fn rebuild_last_requests(&mut self, client_id: i32, ids: &[i32]) {
        let Some(cd) = self.clients.get_mut(&client_id) else {
            return;
        };
        let now_ms = timestamp_ms();
        let timeout_ms = self.params.t_last_request_timeout_ms;

        cd.last_requests.clear();
        for &id in ids {
            if let Some(req) = cd.requests.get_mut(&id) {
                cd.last_requests.push(id);
                req.mark_requested(now_ms, timeout_ms);
            }
        }
    }

    fn refresh_last_requests(&mut self, client_id: i32) {
        let Some(cd) = self.clients.get_mut(&client_id) else {
            return;
        };
        let now_ms = timestamp_ms();
        let timeout_ms = self.params.t_last_request_timeout_ms;

        for id in &cd.last_requests {
            if let Some(req) = cd.requests.get_mut(id) {
                req.mark_requested(now_ms, timeout_ms);
            }
        }
    }

    fn sync_client_shadow(&self) {
        self.stats
            .set_clients(self.clients.values().map(|cd| cd.ip).collect());
    }
}

/// The 4 IPv4 bytes of an address; for IPv6 this is the tail of the
/// v4-mapped form (bytes 12–15).
fn ipv4_tail(addr: IpAddr) -> [u8; 4] {
    match addr {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => {
            let o = v6.octets();
            [o[12], o[13], o[14], o[15]]
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
