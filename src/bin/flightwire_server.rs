use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flightwire::cache::ReplyCache;
use flightwire::flight::{self, Flight, FlightService};
use flightwire::server::Server;
use flightwire::transport::RpcListener;

#[derive(Parser, Debug)]
#[command(name = "flightwire_server", about = "Flight information RPC server")]
struct Args {
    /// UDP port to listen on.
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// Suppress duplicate requests and replay cached replies.
    #[arg(long)]
    filter_duplicates: bool,

    /// Log filter, e.g. "info" or "flightwire=debug".
    #[arg(long, default_value = "info")]
    log: String,
}

async fn seed(service: &FlightService) {
    let seeds = [
        ("SQ001", "SIN", "NRT", "0815", 120, 350.25),
        ("SQ002", "SIN", "SYD", "1030", 80, 420.00),
        ("SQ003", "NRT", "SIN", "1445", 60, 360.75),
        ("SQ004", "SIN", "NRT", "2100", 45, 298.50),
    ];
    for (id, from, to, time, seats, fare) in seeds {
        let flight = Flight {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            time: time.to_string(),
            available_seats: seats,
            fare,
        };
        if let Err(e) = service.add(flight).await {
            error!(id, error = %e, "failed to seed flight");
        }
    }
}

#[tokio::main]
async fn main() -> flightwire::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let service = Arc::new(FlightService::new());
    seed(&service).await;

    let cache = args
        .filter_duplicates
        .then(|| Arc::new(ReplyCache::new()));
    if cache.is_some() {
        info!("duplicate filtering enabled");
    }

    let listener = RpcListener::bind(("0.0.0.0", args.port), cache).await?;
    let server = Server::new(listener, flight::dispatcher(service));
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    server.serve().await
}
