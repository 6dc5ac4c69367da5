//! Push engine for live in-process inspection.
//!
//! A host registers named getters — closures exposing some variable or
//! memory region as bytes — and connected clients subscribe to them.
//! Each tick snapshots the subscribed values and pushes them over the
//! transport with a two-level XOR/run-length differential encoding, so
//! unchanged data costs almost nothing on the wire.
//!
//! This crate is sans-I/O: it speaks to the world through the
//! [`ClientTransport`] trait and is driven entirely by whoever owns the
//! event thread (see the `glimpse-server` crate for the WebSocket
//! front end).

mod client;
mod config;
pub mod diff;
mod engine;
mod error;
mod event;
mod pipeline;
pub mod protocol;
mod registry;
mod request;
mod stats;
mod transport;

pub use client::ClientState;
pub use config::Parameters;
pub use engine::{timestamp_ms, Engine};
pub use error::GlimpseError;
pub use event::{Event, EventHandler};
pub use registry::{Getter, GetterRegistry};
pub use request::{Request, DEFAULT_MIN_UPDATE_MS, DEFAULT_REQUEST_TIMEOUT_MS};
pub use stats::EngineStats;
pub use transport::ClientTransport;
