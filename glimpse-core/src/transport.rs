//! The contract the push engine requires from a transport.

/// Per-client send half of a transport connection.
///
/// The engine owns one implementation per client and drives it from the
/// event-loop thread. Everything else about the transport — handshakes,
/// socket lifetimes, frame reassembly — is the transport's business.
pub trait ClientTransport {
    /// Enqueue one binary frame. `compress` asks for per-message
    /// compression when the transport supports it. Returns `false` when
    /// the frame was not accepted (slow consumer); the engine logs and
    /// moves on, relying on [`buffered_amount`](Self::buffered_amount)
    /// to stall the next tick.
    fn send_binary(&mut self, bytes: &[u8], compress: bool) -> bool;

    /// Bytes accepted but not yet written to the peer. Non-zero gates
    /// the whole client out of the current tick.
    fn buffered_amount(&self) -> usize;
}
