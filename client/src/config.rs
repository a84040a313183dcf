use log::warn;
use shared::transport::TransportConfig;
use shared::{Vec2, DEFAULT_ARENA_CENTER};
use std::time::Duration;

pub const HOST_ENV: &str = "ARENA_HOST";
pub const PORT_ENV: &str = "ARENA_PORT";

/// Client configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub online_host: String,
    pub online_port: u16,
    /// Blend toward the server position for our own ball
    pub self_correction_blend: f32,
    /// Blend toward the server position for everyone else
    pub remote_blend: f32,
    pub ping_interval: Duration,
    pub input_interval: Duration,
    pub transport: TransportConfig,
    /// Snapshots carry no center, so it must match the server's.
    pub arena_center: Vec2,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            online_host: "127.0.0.1".to_string(),
            online_port: 7777,
            self_correction_blend: 0.35,
            remote_blend: 1.0,
            ping_interval: Duration::from_secs(1),
            input_interval: Duration::from_secs_f64(1.0 / 60.0),
            transport: TransportConfig::default(),
            arena_center: DEFAULT_ARENA_CENTER,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `ARENA_HOST` / `ARENA_PORT`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(std::env::var(HOST_ENV).ok(), std::env::var(PORT_ENV).ok());
        config
    }

    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) {
        if let Some(host) = host {
            if host.trim().is_empty() {
                warn!("Empty {}, using {}", HOST_ENV, self.online_host);
            } else {
                self.online_host = host.trim().to_string();
            }
        }

        if let Some(port) = port {
            match port.trim().parse::<u16>() {
                Ok(parsed) if parsed > 0 => self.online_port = parsed,
                _ => warn!(
                    "Invalid {} '{}', using {}",
                    PORT_ENV, port, self.online_port
                ),
            }
        }
    }
}
