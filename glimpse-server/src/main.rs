//! glimpse demo — exposes a few animated variables to any WebSocket
//! client and logs lifecycle events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use glimpse_core::Parameters;
use glimpse_server::{Event, InspectServer};

#[derive(Parser, Debug)]
#[command(name = "glimpse-demo")]
#[command(about = "Live variable inspection demo server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

fn main() -> Result<(), glimpse_server::ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| {
                tracing_subscriber::EnvFilter::new(
                    "glimpse_core=debug,glimpse_server=debug,glimpse_demo=info",
                )
            },
        ))
        .init();

    let args = Args::parse();
    let params = Parameters {
        port_listen: args.port,
        ..Parameters::default()
    };

    let mut server = InspectServer::new(params);

    // A counter that advances ~60 times a second.
    let frame_count = Arc::new(AtomicU64::new(0));
    let fc = Arc::clone(&frame_count);
    server.var("demo.frame_count", move |_| {
        fc.load(Ordering::Relaxed).to_le_bytes().to_vec()
    });

    // A small blob whose contents crawl, to exercise the diff path.
    let fc = Arc::clone(&frame_count);
    server.var("demo.blob", move |_| {
        let phase = fc.load(Ordering::Relaxed);
        (0..512u64)
            .map(|i| (i.wrapping_add(phase) & 0xFF) as u8)
            .collect()
    });

    // Per-index view: the square of the bound index.
    server.var("demo.square[%d]", |idxs| {
        let i = idxs.first().copied().unwrap_or(0) as i64;
        (i * i).to_le_bytes().to_vec()
    });

    server.set_handler(|client_id, event| match event {
        Event::Connect { ip } => {
            info!(client_id, ip = ?ip, "client connected");
        }
        Event::Disconnect => {
            info!(client_id, "client disconnected");
        }
        Event::Custom(body) => {
            info!(client_id, body = %String::from_utf8_lossy(body), "custom message");
        }
    });

    let animator = Arc::clone(&frame_count);
    std::thread::spawn(move || loop {
        animator.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(16));
    });

    server.run()
}
