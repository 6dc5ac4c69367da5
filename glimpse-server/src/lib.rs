//! WebSocket front end for the glimpse push engine.
//!
//! ```no_run
//! use glimpse_core::Parameters;
//! use glimpse_server::InspectServer;
//!
//! let mut server = InspectServer::new(Parameters::default());
//! let frame: u32 = 0;
//! server.var("app.frame", move |_| frame.to_le_bytes().to_vec());
//!
//! let handle = server.handle();
//! let worker = server.run_async();
//! // … application runs, clients connect …
//! handle.stop();
//! worker.join().unwrap().unwrap();
//! ```

mod server;
mod ws;

pub use server::{InspectServer, ServerError, ServerHandle};
pub use ws::WsTransport;

pub use glimpse_core::{Event, Parameters};
