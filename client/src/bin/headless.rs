//! Windowless client for soak tests and bot matches. Drives the player with
//! the AI controller (or a fixed direction) and logs RTT and snapshot rate.

use clap::Parser;
use client::config::ClientConfig;
use client::network::NetworkManager;
use log::info;
use shared::{AiController, Controller, Vec2};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host; overrides ARENA_HOST
    #[arg(long)]
    host: Option<String>,

    /// Server port; overrides ARENA_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Seed for the AI driver
    #[arg(long)]
    seed: Option<u64>,

    /// AI difficulty in [0, 1]
    #[arg(long, default_value = "0.7")]
    difficulty: f32,

    /// Move in a fixed direction "x,y" instead of using the AI
    #[arg(long, value_parser = parse_direction)]
    direction: Option<Vec2>,

    /// Stop after this many seconds
    #[arg(short, long, default_value = "30")]
    duration_secs: u64,
}

fn parse_direction(s: &str) -> Result<Vec2, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{}'", s))?;
    let x: f32 = x.trim().parse().map_err(|e| format!("bad x: {}", e))?;
    let y: f32 = y.trim().parse().map_err(|e| format!("bad y: {}", e))?;
    Ok(Vec2::new(x, y).normalize())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(host) = args.host {
        config.online_host = host;
    }
    if let Some(port) = args.port {
        config.online_port = port;
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut ai = AiController::new(seed, args.difficulty.clamp(0.0, 1.0));
    info!("Headless client starting (seed {})", seed);

    let mut network = NetworkManager::new(config);
    network.connect().await?;

    let frame = Duration::from_secs_f64(1.0 / 60.0);
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_secs);
    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();
    let mut reported_snapshots = 0;
    let mut was_connected = false;

    while Instant::now() < deadline {
        network.service(Duration::from_millis(1)).await;

        let now = Instant::now();
        let dt = now.saturating_duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let opponents = network.opponents();
        let direction = match (args.direction, network.controller_view(dt, &opponents)) {
            (Some(fixed), _) => fixed,
            (None, Some(view)) => ai.movement_direction(&view),
            (None, None) => Vec2::ZERO,
        };
        network.update(dt, direction);
        network.interpolate_snapshots();

        if network.is_connected() {
            was_connected = true;
        } else if was_connected {
            info!("Connection lost, stopping");
            break;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let received = network.snapshots_received();
            let me = network.local_player();
            info!(
                "rtt={}ms snapshots/s={} players={} alive={} pos={:?}",
                network.rtt(),
                received - reported_snapshots,
                network.players().len(),
                me.map_or(false, |p| p.alive),
                me.map(|p| (p.position.x.round(), p.position.y.round())),
            );
            reported_snapshots = received;
            last_report = Instant::now();
        }

        tokio::time::sleep(frame.saturating_sub(last_frame.elapsed())).await;
    }

    info!(
        "Done after {:.1}s, {} snapshots",
        started.elapsed().as_secs_f32(),
        network.snapshots_received()
    );
    network.disconnect();
    Ok(())
}
