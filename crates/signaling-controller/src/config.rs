//! Signaling controller configuration.
//!
//! Loaded from environment variables with sensible defaults. Sensitive
//! fields are held in `SecretString` and redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bind address for the HTTP/WebSocket server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-room live-participant bound.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 8;

/// Default room retention window / durable-store TTL (4 hours).
pub const DEFAULT_ROOM_RETENTION_SECONDS: u64 = 14_400;

/// Default janitor sweep interval (hourly).
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 3_600;

/// Default grace before an ended room is dropped from the cache.
pub const DEFAULT_ENDED_GRACE_SECONDS: u64 = 60;

/// Default idle-connection timeout (5 minutes).
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 300;

/// Default roles allowed on the administrative surface.
pub const DEFAULT_ADMIN_ROLES: &str = "clinician,admin";

/// Instance id prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sc";

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Redis URL for the durable room store. Unset means in-memory only.
    /// Protected by `SecretString`: the URL may embed credentials.
    pub redis_url: Option<SecretString>,

    /// HS256 signing secret shared with the identity provider.
    pub token_secret: SecretString,

    /// Per-room live-participant bound (tunable, not a protocol limit).
    pub max_participants: usize,

    /// Room retention window; doubles as the durable-store TTL.
    pub room_retention: Duration,

    /// Janitor sweep interval.
    pub sweep_interval: Duration,

    /// Grace before an ended room is dropped from the cache.
    pub ended_grace: Duration,

    /// Idle-connection timeout.
    pub idle_timeout: Duration,

    /// Roles allowed on the administrative surface.
    pub admin_roles: Vec<String>,

    /// Unique identifier for this instance (logs and diagnostics).
    pub instance_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("token_secret", &"[REDACTED]")
            .field("max_participants", &self.max_participants)
            .field("room_retention", &self.room_retention)
            .field("sweep_interval", &self.sweep_interval)
            .field("ended_grace", &self.ended_grace)
            .field("idle_timeout", &self.idle_timeout)
            .field("admin_roles", &self.admin_roles)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_secret = SecretString::from(
            vars.get("SC_TOKEN_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("SC_TOKEN_SECRET".to_string()))?
                .clone(),
        );

        let redis_url = vars
            .get("SC_REDIS_URL")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let bind_address = vars
            .get("SC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let max_participants = parse_or(vars, "SC_MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS)?;
        if max_participants < 2 {
            return Err(ConfigError::InvalidValue(
                "SC_MAX_PARTICIPANTS must be at least 2".to_string(),
            ));
        }

        let room_retention = Duration::from_secs(parse_or(
            vars,
            "SC_ROOM_RETENTION_SECONDS",
            DEFAULT_ROOM_RETENTION_SECONDS,
        )?);
        let sweep_interval = Duration::from_secs(parse_or(
            vars,
            "SC_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?);
        let ended_grace = Duration::from_secs(parse_or(
            vars,
            "SC_ENDED_GRACE_SECONDS",
            DEFAULT_ENDED_GRACE_SECONDS,
        )?);
        let idle_timeout = Duration::from_secs(parse_or(
            vars,
            "SC_IDLE_TIMEOUT_SECONDS",
            DEFAULT_IDLE_TIMEOUT_SECONDS,
        )?);

        let admin_roles: Vec<String> = vars
            .get("SC_ADMIN_ROLES")
            .map_or(DEFAULT_ADMIN_ROLES, String::as_str)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if admin_roles.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SC_ADMIN_ROLES must name at least one role".to_string(),
            ));
        }

        let instance_id = vars.get("SC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            redis_url,
            token_secret,
            max_participants,
            room_retention,
            sweep_interval,
            ended_grace,
            idle_timeout,
            admin_roles,
            instance_id,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}
