//! Domain-specific error types for the glimpse protocol.
//!
//! Every error here is recoverable by design: the engine is a diagnostic
//! subsystem and must never take its host down. Malformed input is dropped,
//! everything else is logged and survived.

use thiserror::Error;

/// The canonical error type for the glimpse core.
#[derive(Debug, Error)]
pub enum GlimpseError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The inbound frame is shorter than the 4-byte type field.
    #[error("message too short: {0} bytes")]
    MessageTooShort(usize),

    /// A poll body whose length is not a whole number of request ids.
    #[error("poll body length {0} is not a multiple of 4")]
    InvalidPollLength(usize),

    /// The leading type field did not map to any known message.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    // ── Diff Stream Errors ───────────────────────────────────────
    /// A diff stream must be a sequence of `(count, xor)` u32 pairs.
    #[error("diff stream length {0} is not a multiple of 8")]
    InvalidDiffLength(usize),

    /// The run counts in a diff stream describe more words than the
    /// base buffer holds.
    #[error("diff stream overruns the base buffer")]
    DiffOverrun,
}
