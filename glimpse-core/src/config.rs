//! Service configuration.

use std::path::PathBuf;

/// Configuration for a glimpse instance.
///
/// `http_root`, `resources` and the SSL paths describe the surface an
/// embedding HTTP/TLS layer serves; the push engine itself only reads
/// `max_payload_bytes` and `t_last_request_timeout_ms`.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// TCP port the WebSocket listener binds (0 = OS-assigned).
    pub port_listen: u16,
    /// Soft ceiling for a single outbound frame. Exceeding it logs a
    /// warning; the frame is still sent.
    pub max_payload_bytes: usize,
    /// Activity window granted to a request on every poll/refresh, in
    /// milliseconds.
    pub t_last_request_timeout_ms: i64,
    /// Idle timeout for the underlying WebSocket, in seconds.
    pub t_idle_timeout_s: u32,
    /// Root directory for statically served companion files.
    pub http_root: PathBuf,
    /// URL paths to serve from `http_root`.
    pub resources: Vec<String>,
    /// PEM key for TLS termination, if any.
    pub ssl_key: Option<PathBuf>,
    /// PEM certificate for TLS termination, if any.
    pub ssl_cert: Option<PathBuf>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            port_listen: 3000,
            max_payload_bytes: 256 * 1024,
            t_last_request_timeout_ms: 3000,
            t_idle_timeout_s: 120,
            http_root: PathBuf::from("."),
            resources: Vec::new(),
            ssl_key: None,
            ssl_cert: None,
        }
    }
}
