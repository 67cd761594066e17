//! Room service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; malformed values are rejected rather than silently replaced.

use crate::room::RoomLimits;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default client-facing bind address (WebSocket + room-info query).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default allowed browser origin for the web client.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default maximum concurrent rooms per process.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default maximum members per room.
pub const DEFAULT_MAX_MEMBERS: usize = 50;

/// Default maximum username length in characters.
pub const DEFAULT_MAX_USERNAME_CHARS: usize = 32;

/// Default maximum chat message length in characters.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

/// Default maximum video URL length in characters.
pub const DEFAULT_MAX_URL_CHARS: usize = 2048;

/// Default per-connection outbound frame buffer.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default graceful shutdown deadline in seconds.
pub const DEFAULT_SHUTDOWN_DEADLINE_SECONDS: u64 = 10;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "room";

/// Room service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Client-facing bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Browser origins allowed by CORS. `*` allows any origin.
    pub allowed_origins: Vec<String>,

    /// Unique identifier for this service instance (log correlation).
    pub instance_id: String,

    /// Maximum concurrent rooms this instance will host.
    pub max_rooms: usize,

    /// Per-room limits applied by the room actors.
    pub room_limits: RoomLimits,

    /// Frames buffered per connection before broadcasts to it are dropped.
    pub outbound_buffer: usize,

    /// Time allowed for graceful shutdown.
    pub shutdown_deadline: Duration,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("ROOM_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("ROOM_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let allowed_origins: Vec<String> = vars
            .get("ROOM_ALLOWED_ORIGINS")
            .map_or(DEFAULT_ALLOWED_ORIGIN, String::as_str)
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect();

        if allowed_origins.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ROOM_ALLOWED_ORIGINS must name at least one origin".to_string(),
            ));
        }

        let max_rooms = parse_positive(vars, "ROOM_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;
        let max_members = parse_positive(vars, "ROOM_MAX_MEMBERS", DEFAULT_MAX_MEMBERS)?;
        let max_username_chars =
            parse_positive(vars, "ROOM_MAX_USERNAME_CHARS", DEFAULT_MAX_USERNAME_CHARS)?;
        let max_message_chars =
            parse_positive(vars, "ROOM_MAX_MESSAGE_CHARS", DEFAULT_MAX_MESSAGE_CHARS)?;
        let max_url_chars = parse_positive(vars, "ROOM_MAX_URL_CHARS", DEFAULT_MAX_URL_CHARS)?;
        let outbound_buffer = parse_positive(vars, "ROOM_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;

        let shutdown_deadline_seconds: u64 = parse_or(
            vars,
            "ROOM_SHUTDOWN_DEADLINE_SECONDS",
            DEFAULT_SHUTDOWN_DEADLINE_SECONDS,
        )?;

        let log_json = parse_or(vars, "ROOM_LOG_JSON", false)?;

        // Generate instance ID
        let instance_id = vars.get("ROOM_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            allowed_origins,
            instance_id,
            max_rooms,
            room_limits: RoomLimits {
                max_members,
                max_username_chars,
                max_message_chars,
                max_url_chars,
            },
            outbound_buffer,
            shutdown_deadline: Duration::from_secs(shutdown_deadline_seconds),
            log_json,
        })
    }

    /// Whether any browser origin is accepted.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(vars, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!("{key} must be greater than 0")));
    }
    Ok(value)
}
