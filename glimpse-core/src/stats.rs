//! Shared traffic counters backing the built-in telemetry getters.
//!
//! The counters live behind an `Arc` so registered getter closures can
//! read them without borrowing the engine that owns them. `tx_total` and
//! `rx_total` are 64-bit integers on the wire (8 little-endian bytes);
//! the companion client must read them at that width.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Process-global counters for one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    tx_total: AtomicU64,
    rx_total: AtomicU64,
    /// IPv4 bytes of every connected client, in insertion order.
    client_ips: Mutex<Vec<[u8; 4]>>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count logical outbound payload bytes.
    pub fn add_tx(&self, bytes: u64) {
        self.tx_total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count raw inbound frame bytes.
    pub fn add_rx(&self, bytes: u64) {
        self.rx_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn tx_total(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    pub fn rx_total(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    /// Number of currently connected clients.
    pub fn n_clients(&self) -> u64 {
        self.client_ips.lock().len() as u64
    }

    /// IPv4 bytes of the `idx`-th client in insertion order.
    pub fn ip_of(&self, idx: usize) -> Option<[u8; 4]> {
        self.client_ips.lock().get(idx).copied()
    }

    /// Replace the client shadow list after a connect or disconnect.
    pub fn set_clients(&self, ips: Vec<[u8; 4]>) {
        *self.client_ips.lock() = ips;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = EngineStats::new();
        stats.add_tx(100);
        stats.add_tx(28);
        stats.add_rx(8);
        assert_eq!(stats.tx_total(), 128);
        assert_eq!(stats.rx_total(), 8);
    }

    #[test]
    fn client_shadow_list() {
        let stats = EngineStats::new();
        assert_eq!(stats.n_clients(), 0);
        stats.set_clients(vec![[127, 0, 0, 1], [10, 0, 0, 2]]);
        assert_eq!(stats.n_clients(), 2);
        assert_eq!(stats.ip_of(1), Some([10, 0, 0, 2]));
        assert_eq!(stats.ip_of(2), None);
    }
}
