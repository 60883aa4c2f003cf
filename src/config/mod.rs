//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::rules::BoundaryPolicy;
use crate::game::ArenaKind;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    /// Allowed spectator/agent origins for CORS (comma-separated, unset = any)
    pub client_origin: Option<String>,

    /// Shared secret used to verify agent bearer tokens (HS256)
    pub agent_jwt_secret: String,

    /// Match and simulation settings
    pub match_settings: MatchSettings,

    /// Result persistence endpoint (log-only when unset)
    pub results_url: Option<String>,
    /// API key sent to the result persistence endpoint
    pub results_api_key: Option<String>,
    /// Settlement notification endpoint (log-only when unset)
    pub settlement_url: Option<String>,
    /// Secret used to sign settlement notifications
    pub settlement_secret: Option<String>,
    /// Cosmetic/identity lookup endpoint (pass-through when unset)
    pub cosmetics_url: Option<String>,
}

/// Everything the scheduler and engine need to run matches
#[derive(Clone, Debug)]
pub struct MatchSettings {
    pub arena: ArenaKind,
    /// Overrides the arena's default boundary policy
    pub boundary: Option<BoundaryPolicy>,
    /// Fixed simulation rate
    pub tick_rate: u32,
    /// Spectator frame rate (throttled independently of the tick rate)
    pub broadcast_rate: u32,
    /// Participants required before the countdown arms
    pub min_participants: usize,
    /// Lobby capacity
    pub capacity: usize,
    pub countdown_ms: u64,
    pub match_duration_ms: u64,
    /// How long final standings are held before the next lobby opens
    pub results_window_ms: u64,
    /// Silent agents are eliminated after this long
    pub max_idle_ms: u64,
    /// Accepted actions per entity per window
    pub max_actions: u32,
    pub action_window_ms: u64,
    /// Frames buffered per spectator before it is disconnected
    pub subscriber_buffer: usize,
    /// Fixed RNG seed (random per match when unset)
    pub seed: Option<u64>,
}

impl MatchSettings {
    /// Defaults for an arena variant
    pub fn for_arena(arena: ArenaKind) -> Self {
        let (min_participants, capacity, match_duration_ms) = match arena {
            ArenaKind::Growth => (1, 30, 180_000),
            ArenaKind::Combat => (2, 16, 300_000),
        };

        Self {
            arena,
            boundary: None,
            tick_rate: 20,
            broadcast_rate: 10,
            min_participants,
            capacity,
            countdown_ms: 10_000,
            match_duration_ms,
            results_window_ms: 15_000,
            max_idle_ms: 30_000,
            max_actions: 10,
            action_window_ms: 1_000,
            subscriber_buffer: 32,
            seed: None,
        }
    }

    /// Ticks between two spectator frames
    pub fn broadcast_interval_ticks(&self) -> u32 {
        (self.tick_rate / self.broadcast_rate.max(1)).max(1)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let arena: ArenaKind = parse_or("ARENA", ArenaKind::Growth)?;
        let defaults = MatchSettings::for_arena(arena);

        let match_settings = MatchSettings {
            arena,
            boundary: parse_optional("BOUNDARY_POLICY")?,
            tick_rate: parse_or("TICK_RATE", defaults.tick_rate)?,
            broadcast_rate: parse_or("BROADCAST_RATE", defaults.broadcast_rate)?,
            min_participants: parse_or("MIN_PARTICIPANTS", defaults.min_participants)?,
            capacity: parse_or("LOBBY_CAPACITY", defaults.capacity)?,
            countdown_ms: parse_or("COUNTDOWN_MS", defaults.countdown_ms)?,
            match_duration_ms: parse_or("MATCH_DURATION_MS", defaults.match_duration_ms)?,
            results_window_ms: parse_or("RESULTS_WINDOW_MS", defaults.results_window_ms)?,
            max_idle_ms: parse_or("MAX_IDLE_MS", defaults.max_idle_ms)?,
            max_actions: parse_or("MAX_ACTIONS", defaults.max_actions)?,
            action_window_ms: parse_or("ACTION_WINDOW_MS", defaults.action_window_ms)?,
            subscriber_buffer: parse_or("SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
            seed: parse_optional("MATCH_SEED")?,
        };

        if match_settings.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if match_settings.min_participants == 0
            || match_settings.min_participants > match_settings.capacity
        {
            return Err(ConfigError::Invalid("MIN_PARTICIPANTS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            client_origin: optional("CLIENT_ORIGIN"),

            agent_jwt_secret: env::var("AGENT_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("AGENT_JWT_SECRET"))?,

            match_settings,

            results_url: optional("RESULTS_URL"),
            results_api_key: optional("RESULTS_API_KEY"),
            settlement_url: optional("SETTLEMENT_URL"),
            settlement_secret: optional("SETTLEMENT_SECRET"),
            cosmetics_url: optional("COSMETICS_URL"),
        })
    }
}

/// Read an optional, non-empty variable
fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Parse a variable that has no default
fn parse_optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    optional(key)
        .map(|raw| raw.trim().parse().map_err(|_| ConfigError::Invalid(key)))
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
