use clap::Parser;
use log::info;
use server::config::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_TICK_RATE};
use server::{Server, ServerConfig};
use shared::{SimulationConfig, DEFAULT_ARENA_RADIUS};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative arena game server", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Maximum number of connected clients
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Milliseconds between state snapshots
    #[arg(long, default_value_t = 30)]
    snapshot_ms: u64,

    /// Number of AI players to add
    #[arg(short, long, default_value_t = 0)]
    bots: usize,

    /// Seed for bot behaviour (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Bot difficulty between 0 and 1 (bots cycle through presets if omitted)
    #[arg(long)]
    bot_difficulty: Option<f32>,

    /// Initial arena radius
    #[arg(long, default_value_t = DEFAULT_ARENA_RADIUS)]
    arena_radius: f32,

    /// Seconds before a finished round restarts, 0 to disable
    #[arg(long, default_value_t = 3.0)]
    round_restart_secs: f32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bot_seed = args.seed.unwrap_or_else(rand::random);

    let config = ServerConfig {
        bind_address: args.host,
        port: args.port,
        max_clients: args.max_clients,
        tick_rate: args.tick_rate,
        snapshot_interval: Duration::from_millis(args.snapshot_ms),
        bots: args.bots,
        bot_seed,
        bot_difficulty: args.bot_difficulty,
        round_restart_delay: (args.round_restart_secs.is_finite() && args.round_restart_secs > 0.0)
            .then(|| Duration::from_secs_f32(args.round_restart_secs)),
        simulation: SimulationConfig {
            arena_radius: args.arena_radius,
            ..SimulationConfig::default()
        },
        ..ServerConfig::default()
    };

    let mut server = Server::bind(config).await?;
    info!("Listening on {}", server.local_addr()?);

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    Ok(())
}
