//! Per-subscription state and the freshness predicate that gates updates.

/// Minimum interval between two successful updates of one request.
pub const DEFAULT_MIN_UPDATE_MS: i64 = 16;

/// Activity window granted on each poll/refresh.
pub const DEFAULT_REQUEST_TIMEOUT_MS: i64 = 3000;

/// A client's active subscription: which getter to call, with which
/// indices, plus the timing fields and diff scratch that drive the
/// snapshot pipeline.
#[derive(Debug)]
pub struct Request {
    /// Id into the getter arena.
    pub getter_id: usize,
    /// Bound indices passed to the getter on every update.
    pub idxs: Vec<i32>,

    /// When this request last produced bytes; −1 = never.
    pub t_last_updated_ms: i64,
    /// When the client last polled this request; −1 = never.
    pub t_last_requested_ms: i64,
    /// Minimum interval between updates.
    pub t_min_update_ms: i64,
    /// Activity window after the last poll. Negative values mean
    /// "push once, then stay quiet until re-requested".
    pub t_last_request_timeout_ms: i64,

    /// Bytes sent on the previous update, zero-padded to a word boundary.
    pub prev_data: Vec<u8>,
    /// Scratch buffer for the per-request diff stream.
    pub diff_data: Vec<u8>,
}

impl Request {
    pub fn new(getter_id: usize, idxs: Vec<i32>) -> Self {
        Self {
            getter_id,
            idxs,
            t_last_updated_ms: -1,
            t_last_requested_ms: -1,
            t_min_update_ms: DEFAULT_MIN_UPDATE_MS,
            t_last_request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            prev_data: Vec::new(),
            diff_data: Vec::new(),
        }
    }

    /// Whether the pipeline should call the getter this tick.
    ///
    /// True when the request is inside its activity window (or armed
    /// under one-shot semantics) and the minimum update interval has
    /// elapsed.
    pub fn should_update(&self, now_ms: i64) -> bool {
        let active = (self.t_last_request_timeout_ms < 0 && self.t_last_requested_ms > 0)
            || (now_ms - self.t_last_requested_ms < self.t_last_request_timeout_ms);
        active && now_ms - self.t_last_updated_ms > self.t_min_update_ms
    }

    /// Record a poll/refresh: restart the activity window.
    pub fn mark_requested(&mut self, now_ms: i64, timeout_ms: i64) {
        self.t_last_requested_ms = now_ms;
        self.t_last_request_timeout_ms = timeout_ms;
    }
}

// ── Tests ────────────────────────────────────────────────────────
