use clap::Parser;
use client::config::ClientConfig;
use client::input::KeyboardController;
use client::network::NetworkManager;
use client::rendering::{HudInfo, Renderer};
use log::{error, info, warn};
use macroquad::prelude::{get_frame_time, next_frame};
use macroquad::window::Conf;
use shared::{AiController, Controller, SimulationConfig, Vec2};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host; overrides ARENA_HOST
    #[arg(long)]
    host: Option<String>,

    /// Server port; overrides ARENA_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Let the AI drive instead of the keyboard (Tab toggles in game)
    #[arg(short, long)]
    autopilot: bool,

    /// Seed for the autopilot
    #[arg(long)]
    seed: Option<u64>,

    /// Autopilot difficulty in [0, 1]
    #[arg(long, default_value = "0.7")]
    difficulty: f32,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Arena".to_owned(),
        window_width: 900,
        window_height: 900,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(host) = args.host {
        config.online_host = host;
    }
    if let Some(port) = args.port {
        config.online_port = port;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return;
        }
    };

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Autopilot seed: {}", seed);
    info!("Controls: WASD / arrows to move, Tab toggles autopilot, R reconnects");

    let renderer = Renderer::new(config.arena_center, SimulationConfig::default().player_radius);
    let mut network = NetworkManager::new(config);
    let mut keyboard = KeyboardController::new();
    let mut autopilot = AiController::new(seed, args.difficulty.clamp(0.0, 1.0));
    let mut use_autopilot = args.autopilot;

    if let Err(e) = runtime.block_on(network.connect()) {
        error!("Could not connect: {}", e);
    }

    loop {
        let dt = get_frame_time();

        let controls = keyboard.poll_controls();
        if controls.toggle_autopilot {
            use_autopilot = !use_autopilot;
            info!("Autopilot: {}", use_autopilot);
        }
        if controls.reconnect {
            warn!("Reconnecting");
            if let Err(e) = runtime.block_on(network.connect()) {
                error!("Could not connect: {}", e);
            }
        }

        runtime.block_on(network.service(Duration::ZERO));

        let opponents = network.opponents();
        let direction = match network.controller_view(dt, &opponents) {
            Some(view) if use_autopilot => autopilot.movement_direction(&view),
            Some(view) => keyboard.movement_direction(&view),
            None => Vec2::ZERO,
        };
        network.update(dt, direction);
        network.interpolate_snapshots();

        let hud = HudInfo {
            player_id: network.player_id(),
            connected: network.is_connected(),
            rtt_ms: network.rtt(),
            autopilot: use_autopilot,
        };
        renderer.render(&network.players(), network.arena_radius(), &hud);

        next_frame().await;
    }
}
