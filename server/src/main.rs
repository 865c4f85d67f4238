use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use server::simulation::World;
use shared::{CancellationToken, InboxOverflow};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "10")]
    tick_rate: u32,

    /// Payloads buffered per peer before new ones are dropped
    #[arg(long, default_value = "1")]
    inbox_capacity: usize,

    /// Maximum number of connected players
    #[arg(long, default_value = "16")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        listener: defaults
            .listener
            .clone()
            .with_inbox(args.inbox_capacity, InboxOverflow::DropNewest),
        ..defaults
    };

    info!("Starting server on {} at {} Hz", args.listen, config.tick_rate);
    info!("Use RUST_LOG=debug for detailed logging");

    let server = Server::bind(args.listen.as_str(), config, World::default()).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
        signal.cancel();
    });

    server.run(shutdown).await?;
    Ok(())
}
