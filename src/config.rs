use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{bubble, control, map, net, population, speed, tick};
use crate::game::kinematics::{MapBounds, SpeedCurve};

/// Configuration errors reported by `validate`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    ZeroPort,
    #[error("tick rate must be at least 1")]
    ZeroTickRate,
    #[error("map dimensions must be positive, got {0}x{1}")]
    InvalidMap(f64, f64),
    #[error("player init radius must be positive and below max radius, got {0}")]
    InvalidPlayerRadius(f64),
    #[error("max bubble radius must be positive, got {0}")]
    InvalidMaxRadius(f64),
    #[error("stomach radius ratio must be in (0, 1], got {0}")]
    InvalidStomachRatio(f64),
    #[error("speed range invalid: min={0}, max={1}")]
    InvalidSpeedRange(f64, f64),
    #[error("NPC density divisor must be positive, got {0}")]
    InvalidDensityDivisor(f64),
    #[error("max spawn attempts must be at least 1")]
    ZeroSpawnAttempts,
}

/// How ticks are triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPolicy {
    /// Fixed-period timer; commands are buffered until the next tick
    Timer,
    /// Every command triggers a tick, with a watchdog timer as fallback
    Command,
}

impl FromStr for TickPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timer" => Ok(TickPolicy::Timer),
            "command" => Ok(TickPolicy::Command),
            other => Err(format!("unknown tick policy '{}'", other)),
        }
    }
}

/// Simulation tunables
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Ticks per second
    pub tick_rate: u32,
    pub tick_policy: TickPolicy,
    /// Full map width (always >= height)
    pub map_width: f64,
    /// Full map height
    pub map_height: f64,
    pub player_init_radius: f64,
    /// Explicit initial NPC count; derived from map area when unset
    pub init_npc_count: Option<usize>,
    pub npc_density_divisor: f64,
    pub stomach_radius_ratio: f64,
    pub max_bubble_radius: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub stagnation_timeout: Duration,
    /// Longest gap between snapshots in command-driven mode
    pub max_server_msg_period: Duration,
    pub npc_player_ratio: f64,
    pub max_spawn_attempts: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        let (map_width, map_height) = landscape(map::WIDTH, map::HEIGHT);
        Self {
            tick_rate: tick::RATE,
            tick_policy: TickPolicy::Timer,
            map_width,
            map_height,
            player_init_radius: bubble::PLAYER_INIT_RADIUS,
            init_npc_count: None,
            npc_density_divisor: population::DENSITY_DIVISOR,
            stomach_radius_ratio: bubble::STOMACH_RADIUS_RATIO,
            max_bubble_radius: map_height,
            min_speed: speed::MIN,
            max_speed: speed::MAX,
            stagnation_timeout: Duration::from_millis(control::STAGNATION_TIMEOUT_MS),
            max_server_msg_period: Duration::from_millis(tick::MAX_SERVER_MSG_PERIOD_MS),
            npc_player_ratio: population::NPC_PLAYER_RATIO,
            max_spawn_attempts: population::MAX_SPAWN_ATTEMPTS,
        }
    }
}

/// Orders two extents so the first is the larger one
fn landscape(a: f64, b: f64) -> (f64, f64) {
    (a.max(b), a.min(b))
}

impl GameConfig {
    /// Load game settings from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(rate) = read_env::<u32>("TICK_RATE") {
            if rate > 0 && rate <= 1000 {
                config.tick_rate = rate;
            } else {
                tracing::warn!("TICK_RATE must be 1-1000, using default");
            }
        }

        if let Some(policy) = read_env::<TickPolicy>("TICK_POLICY") {
            config.tick_policy = policy;
        }

        let width = read_env::<f64>("MAP_WIDTH").unwrap_or(config.map_width);
        let height = read_env::<f64>("MAP_HEIGHT").unwrap_or(config.map_height);
        let (width, height) = landscape(width, height);
        config.map_width = width;
        config.map_height = height;
        config.max_bubble_radius = height;

        if let Some(radius) = read_env::<f64>("MAX_BUBBLE_RADIUS") {
            config.max_bubble_radius = radius;
        }
        if let Some(radius) = read_env::<f64>("PLAYER_INIT_RADIUS") {
            config.player_init_radius = radius;
        }
        if let Some(count) = read_env::<usize>("INIT_NPC_COUNT") {
            config.init_npc_count = Some(count);
        }
        if let Some(divisor) = read_env::<f64>("NPC_DENSITY_DIVISOR") {
            config.npc_density_divisor = divisor;
        }
        if let Some(ratio) = read_env::<f64>("STOMACH_RADIUS_RATIO") {
            config.stomach_radius_ratio = ratio;
        }
        if let Some(min) = read_env::<f64>("MIN_SPEED") {
            config.min_speed = min;
        }
        if let Some(max) = read_env::<f64>("MAX_SPEED") {
            config.max_speed = max;
        }
        if let Some(ms) = read_env::<u64>("STAGNATION_TIMEOUT_MS") {
            config.stagnation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>("MAX_SERVER_MSG_PERIOD_MS") {
            config.max_server_msg_period = Duration::from_millis(ms);
        }
        if let Some(ratio) = read_env::<f64>("NPC_PLAYER_RATIO") {
            config.npc_player_ratio = ratio;
        }
        if let Some(attempts) = read_env::<u32>("MAX_SPAWN_ATTEMPTS") {
            config.max_spawn_attempts = attempts;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !(self.map_width > 0.0 && self.map_height > 0.0) {
            return Err(ConfigError::InvalidMap(self.map_width, self.map_height));
        }
        if !(self.max_bubble_radius > 0.0) {
            return Err(ConfigError::InvalidMaxRadius(self.max_bubble_radius));
        }
        if !(self.player_init_radius > 0.0 && self.player_init_radius <= self.max_bubble_radius) {
            return Err(ConfigError::InvalidPlayerRadius(self.player_init_radius));
        }
        if !(self.stomach_radius_ratio > 0.0 && self.stomach_radius_ratio <= 1.0) {
            return Err(ConfigError::InvalidStomachRatio(self.stomach_radius_ratio));
        }
        if !(self.min_speed >= 0.0 && self.min_speed <= self.max_speed) {
            return Err(ConfigError::InvalidSpeedRange(self.min_speed, self.max_speed));
        }
        if !(self.npc_density_divisor > 0.0) {
            return Err(ConfigError::InvalidDensityDivisor(self.npc_density_divisor));
        }
        if self.max_spawn_attempts == 0 {
            return Err(ConfigError::ZeroSpawnAttempts);
        }
        Ok(())
    }

    /// Nominal time between ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn bounds(&self) -> MapBounds {
        MapBounds::new(self.map_width, self.map_height)
    }

    pub fn speed_curve(&self) -> SpeedCurve {
        SpeedCurve::new(self.min_speed, self.max_speed, self.max_bubble_radius)
    }

    /// NPC count created at start-up
    pub fn initial_npc_target(&self) -> usize {
        if let Some(count) = self.init_npc_count {
            return count;
        }
        let unit = self.player_init_radius * self.player_init_radius * self.npc_density_divisor;
        (self.map_width * self.map_height / unit).floor() as usize
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port for the metrics HTTP endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file (self-signed when unset)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (self-signed when unset)
    pub tls_key_path: Option<String>,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::PORT,
            metrics_port: net::METRICS_PORT,
            tls_cert_path: None,
            tls_key_path: None,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(addr) = read_env::<IpAddr>("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Some(port) = read_env::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(port) = read_env::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config.game = GameConfig::load_or_default();
        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        self.game.validate()
    }
}

/// Read and parse an environment variable, warning when it does not parse
fn read_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 16666);
        assert_eq!(config.game.tick_rate, 5);
        assert_eq!(config.game.tick_policy, TickPolicy::Timer);
        assert_eq!(config.game.max_bubble_radius, config.game.map_height);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_initial_npc_target_from_area() {
        // 2000 * 2000 / (10^2 * 200)
        let config = GameConfig::default();
        assert_eq!(config.initial_npc_target(), 200);
    }

    #[test]
    fn test_initial_npc_target_override() {
        let config = GameConfig {
            init_npc_count: Some(12),
            ..GameConfig::default()
        };
        assert_eq!(config.initial_npc_target(), 12);
    }

    #[test]
    fn test_landscape_orientation() {
        assert_eq!(landscape(800.0, 1200.0), (1200.0, 800.0));
        assert_eq!(landscape(1200.0, 800.0), (1200.0, 800.0));
    }

    #[test]
    fn test_tick_period() {
        let config = GameConfig::default();
        assert_eq!(config.tick_period(), Duration::from_millis(200));
    }

    #[test]
    fn test_tick_policy_parse() {
        assert_eq!("timer".parse::<TickPolicy>(), Ok(TickPolicy::Timer));
        assert_eq!(" Command ".parse::<TickPolicy>(), Ok(TickPolicy::Command));
        assert!("sometimes".parse::<TickPolicy>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_speed = GameConfig {
            min_speed: 60.0,
            ..GameConfig::default()
        };
        assert!(matches!(bad_speed.validate(), Err(ConfigError::InvalidSpeedRange(..))));

        let bad_ratio = GameConfig {
            stomach_radius_ratio: 1.5,
            ..GameConfig::default()
        };
        assert_eq!(bad_ratio.validate(), Err(ConfigError::InvalidStomachRatio(1.5)));

        let bad_rate = GameConfig {
            tick_rate: 0,
            ..GameConfig::default()
        };
        assert_eq!(bad_rate.validate(), Err(ConfigError::ZeroTickRate));

        let bad_attempts = GameConfig {
            max_spawn_attempts: 0,
            ..GameConfig::default()
        };
        assert_eq!(bad_attempts.validate(), Err(ConfigError::ZeroSpawnAttempts));
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
        assert!(config.game.map_width >= config.game.map_height);
    }
}
