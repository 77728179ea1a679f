//! Default values for every tunable. `GameConfig` starts from these and
//! lets the environment override them.

/// Tick scheduling
pub mod tick {
    /// Simulation ticks per second
    pub const RATE: u32 = 5;
    /// Longest silence between two snapshots in command-driven mode (ms)
    pub const MAX_SERVER_MSG_PERIOD_MS: u64 = 1000;
}

/// Map geometry
pub mod map {
    /// Full map width in world units
    pub const WIDTH: f64 = 2000.0;
    /// Full map height in world units
    pub const HEIGHT: f64 = 2000.0;
}

/// Bubble sizing and eating
pub mod bubble {
    /// Radius a new player starts with
    pub const PLAYER_INIT_RADIUS: f64 = 10.0;
    /// Another bubble is eaten once its center is within this fraction of
    /// the eater's radius
    pub const STOMACH_RADIUS_RATIO: f64 = 0.6;
    /// Smallest NPC radius
    pub const NPC_MIN_RADIUS: f64 = 1.0;
}

/// Speed curve endpoints; speed falls linearly from MAX at radius 0 to MIN
/// at the maximum radius
pub mod speed {
    pub const MIN: f64 = 5.0;
    pub const MAX: f64 = 50.0;
}

/// Player control
pub mod control {
    /// Players whose last applied command is older than this stop moving (ms)
    pub const STAGNATION_TIMEOUT_MS: u64 = 5000;
}

/// NPC population management
pub mod population {
    /// Initial NPC count = map area / (PLAYER_INIT_RADIUS² × DENSITY_DIVISOR)
    pub const DENSITY_DIVISOR: f64 = 200.0;
    /// Replenish when live NPCs per live player drops below this
    pub const NPC_PLAYER_RATIO: f64 = 5.0;
    /// Rejection-sampling attempts before accepting the last sampled spot
    pub const MAX_SPAWN_ATTEMPTS: u32 = 64;
}

/// Networking
pub mod net {
    /// Default listening port
    pub const PORT: u16 = 16666;
    /// Default metrics endpoint port
    pub const METRICS_PORT: u16 = 9090;
    /// Maximum size of a framed client message
    pub const MAX_CLIENT_MESSAGE_SIZE: usize = 65536;
    /// Maximum size of a framed snapshot (tombstones accumulate, so this is generous)
    pub const MAX_SERVER_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
}
