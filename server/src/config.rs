use shared::controller::AI_DIFFICULTY_LEVELS;
use shared::protocol::MAX_SNAPSHOT_PLAYERS;
use shared::transport::TransportConfig;
use shared::SimulationConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_MAX_CLIENTS: usize = 8;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on, 0 picks an ephemeral port
    pub port: u16,
    /// Maximum number of concurrently connected clients
    pub max_clients: usize,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Time between state broadcasts
    pub snapshot_interval: Duration,
    /// Most ticks run in one loop iteration before backlog is dropped
    pub max_catch_up_ticks: u32,
    /// Pause between loop iterations
    pub idle_sleep: Duration,
    /// AI players added at startup
    pub bots: usize,
    pub bot_seed: u64,
    /// Fixed difficulty for every bot; `None` cycles through the presets.
    pub bot_difficulty: Option<f32>,
    /// Ring spawn radius as a fraction of the initial arena radius
    pub spawn_radius_factor: f32,
    /// Delay before a finished round restarts, `None` to never restart
    pub round_restart_delay: Option<Duration>,
    pub simulation: SimulationConfig,
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            tick_rate: DEFAULT_TICK_RATE,
            snapshot_interval: Duration::from_millis(30),
            max_catch_up_ticks: 8,
            idle_sleep: Duration::from_millis(2),
            bots: 0,
            bot_seed: 0,
            bot_difficulty: None,
            spawn_radius_factor: 0.55,
            round_restart_delay: Some(Duration::from_secs(3)),
            simulation: SimulationConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration before starting
    pub fn validate(&self) -> Result<(), String> {
        if self.max_clients == 0 {
            return Err("max_clients must be at least 1".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.snapshot_interval.is_zero() {
            return Err("snapshot_interval must be positive".to_string());
        }
        if self.max_catch_up_ticks == 0 {
            return Err("max_catch_up_ticks must be at least 1".to_string());
        }
        if !(self.simulation.arena_radius.is_finite() && self.simulation.arena_radius > 0.0) {
            return Err("arena radius must be a positive number".to_string());
        }
        if self.total_players() > MAX_SNAPSHOT_PLAYERS as usize {
            return Err(format!(
                "max_clients + bots is {}, a snapshot fits at most {} players",
                self.total_players(),
                MAX_SNAPSHOT_PLAYERS
            ));
        }
        if matches!(self.bot_difficulty, Some(d) if !(0.0..=1.0).contains(&d)) {
            return Err("bot_difficulty must be within 0..=1".to_string());
        }
        Ok(())
    }

    /// Most players that can be in the match at once: clients plus bots.
    pub fn total_players(&self) -> usize {
        self.max_clients.saturating_add(self.bots)
    }

    /// Difficulty of the `index`th bot.
    pub fn bot_difficulty_for(&self, index: usize) -> f32 {
        self.bot_difficulty
            .unwrap_or(AI_DIFFICULTY_LEVELS[index % AI_DIFFICULTY_LEVELS.len()])
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn spawn_radius(&self) -> f32 {
        self.simulation.arena_radius * self.spawn_radius_factor
    }
}
