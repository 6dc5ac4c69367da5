//! Per-client connection state.

use std::collections::BTreeMap;

use crate::request::Request;
use crate::transport::ClientTransport;

/// Everything the engine tracks for one connected client.
///
/// The request table is ordered by request id so each tick walks it
/// deterministically. The three scratch buffers are reused across ticks
/// to keep steady-state allocation near zero.
pub struct ClientState<T: ClientTransport> {
    /// Connection timestamp, epoch milliseconds.
    pub t_connected_ms: i64,
    /// IPv4 bytes of the peer address.
    pub ip: [u8; 4],

    /// Active subscriptions, keyed by the client-chosen request id.
    pub requests: BTreeMap<i32, Request>,
    /// Request ids named by the client's most recent poll. A request
    /// missing from here is not removed — it just goes stale.
    pub last_requests: Vec<i32>,

    /// The message being assembled this tick.
    pub(crate) cur: Vec<u8>,
    /// The message assembled last tick, for whole-message diffing.
    pub(crate) prev: Vec<u8>,
    /// Scratch for the whole-message diff.
    pub(crate) diff: Vec<u8>,

    /// Send half of this client's connection.
    pub transport: T,
}

impl<T: ClientTransport> ClientState<T> {
    pub fn new(t_connected_ms: i64, ip: [u8; 4], transport: T) -> Self {
        Self {
            t_connected_ms,
            ip,
            requests: BTreeMap::new(),
            last_requests: Vec::new(),
            cur: Vec::new(),
            prev: Vec::new(),
            diff: Vec::new(),
            transport,
        }
    }
}
