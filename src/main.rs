//! Multi-room WebSocket broker - Entry Point
//!
//! Starts the TCP listener and the Rooms registry actor, accepting connections.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_broker::config::{DEFAULT_ADDR, DEFAULT_QUEUE_CAPACITY};
use chat_broker::{handle_connection, BrokerConfig, Rooms};

#[derive(Parser, Debug)]
#[command(name = "chat_broker", about = "Multi-room WebSocket message broker")]
struct Args {
    /// Address to listen on
    #[arg(env = "CHAT_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Outbound messages buffered per client
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    client_queue: usize,

    /// Pending commands per room
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    room_queue: usize,

    /// Pending commands for the rooms registry
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    registry_queue: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "chat_broker=info")]
    log: String,
}

impl Args {
    fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            client_queue_capacity: self.client_queue,
            room_queue_capacity: self.room_queue,
            registry_queue_capacity: self.registry_queue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_broker=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .init();

    let config = args.broker_config();

    // Start TCP listener
    let listener = TcpListener::bind(&args.addr).await?;
    info!("WebSocket broker listening on {}", args.addr);

    // One registry for the whole process, handed to every connection
    let rooms = Rooms::start(&config);
    info!("Rooms registry started");

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let rooms = rooms.clone();
                    let config = config.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, rooms, config).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
