use clap::Parser;
use client::input::InputManager;
use client::network::{Client, ClientConfig};
use client::rendering::Renderer;
use log::{error, info, warn};
use macroquad::prelude::*;
use shared::CancellationToken;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "960")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "540")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Asteroids".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client error: {}", e);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // macroquad owns the main thread; networking runs on its own runtime.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    info!("Connecting to: {}", args.server);
    let client = runtime.block_on(Client::connect(
        args.server.as_str(),
        ClientConfig::default(),
    ))?;
    info!("Controls: W/S to thrust, A/D to turn, Space to fire, Esc to quit");

    let mut input = InputManager::new();
    let mut renderer = Renderer::new();

    while !input.quit_requested() {
        let state = client.update(input.sample());
        renderer.render(state.as_ref(), !client.is_closed());
        next_frame().await;
    }

    let cancel = CancellationToken::new();
    let closed = runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(1), client.close(&cancel)).await
    });
    match closed {
        Ok(Ok(())) | Ok(Err(shared::SessionError::Closed)) => {}
        Ok(Err(e)) => warn!("Close failed: {}", e),
        Err(_) => warn!("Close timed out"),
    }

    Ok(())
}
