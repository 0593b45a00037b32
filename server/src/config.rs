use std::net::SocketAddr;
use std::time::Duration;

use pong_shared::config::{GameConfig, TICK_INTERVAL_MS};

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3001;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_interval: Duration,
    /// Seed for serve randomness. `None` draws from OS entropy per match.
    pub rng_seed: Option<u64>,
    /// Depth of each connection's outbound message queue.
    pub outbound_buffer: usize,
    /// Depth of the lobby and per-match command queues.
    pub command_buffer: usize,
    /// Longest wait for room in a full outbound queue when sending
    /// `waiting`, `game-start` or a terminal event.
    pub delivery_timeout: Duration,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            rng_seed: None,
            outbound_buffer: 64,
            command_buffer: 256,
            delivery_timeout: Duration::from_secs(2),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, with the listen port taken from `PORT` when set.
    pub fn from_env() -> Result<Self, String> {
        Self::with_port_var(std::env::var("PORT").ok())
    }

    fn with_port_var(port: Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(port) = port {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| format!("PORT must be a port number, got {:?}", port))?;
            config.listen_addr = format!("0.0.0.0:{}", port);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("listen_addr {:?} invalid: {}", self.listen_addr, e))?;
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be > 0".to_string());
        }
        if self.outbound_buffer == 0 {
            return Err("outbound_buffer must be > 0".to_string());
        }
        if self.command_buffer == 0 {
            return Err("command_buffer must be > 0".to_string());
        }
        if self.delivery_timeout.is_zero() {
            return Err("delivery_timeout must be > 0".to_string());
        }
        self.game.validate()
    }
}
