//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use slot_core::{
    DatabaseConfig, SessionConfig, diagnostics::DEFAULT_BUFFER, hub::DEFAULT_CLIENT_QUEUE,
    jackpot::JackpotConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:7070";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration; `None` runs on in-memory stores
    pub database: Option<DatabaseConfig>,
    /// Apply the bundled schema on startup
    pub ensure_schema: bool,
    /// Session engine settings
    pub session: SessionConfig,
    /// The game's jackpot pool
    pub jackpot: JackpotConfig,
    /// Outbound queue length per realtime connection
    pub hub_client_queue: usize,
    /// Diagnostics trail settings
    pub diagnostics: DiagnosticsConfig,
    /// Prometheus listener; `None` disables the exporter
    pub metrics_bind: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Append-only trail file; `None` disables diagnostics
    pub path: Option<PathBuf>,
    pub buffer: usize,
}

/// Command-line overrides, applied over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub in_memory: bool,
}

impl ServerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a set variable cannot be parsed
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F, overrides: Overrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let default_bind: SocketAddr =
            DEFAULT_BIND
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: "Default bind address is not a socket address".to_string(),
                })?;
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => env.parse_or("SERVER_BIND", default_bind)?,
        };

        let database_url = if overrides.in_memory {
            None
        } else {
            overrides
                .database_url
                .or_else(|| lookup("DATABASE_URL"))
                .filter(|url| !url.is_empty())
        };

        let database = match database_url {
            Some(url) => {
                let defaults = DatabaseConfig::default();
                Some(DatabaseConfig {
                    database_url: url,
                    max_connections: env.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
                    min_connections: env.parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
                    connection_timeout_secs: env
                        .parse_or("DB_CONNECTION_TIMEOUT_SECS", defaults.connection_timeout_secs)?,
                    idle_timeout_secs: env
                        .parse_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
                    max_lifetime_secs: env
                        .parse_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs)?,
                })
            }
            None => None,
        };

        let session_defaults = SessionConfig::default();
        let session = SessionConfig {
            game_id: lookup("SESSION_GAME_ID").unwrap_or(session_defaults.game_id),
            jackpot_type: lookup("JACKPOT_TYPE").unwrap_or(session_defaults.jackpot_type),
            min_bet: env.parse_or("SESSION_MIN_BET", session_defaults.min_bet)?,
            max_bet: env.parse_or("SESSION_MAX_BET", session_defaults.max_bet)?,
            max_sessions: env.parse_or("SESSION_MAX_ACTIVE", session_defaults.max_sessions)?,
            session_timeout_secs: env
                .parse_or("SESSION_TIMEOUT_SECS", session_defaults.session_timeout_secs)?,
            sweep_interval_secs: env.parse_or(
                "SESSION_SWEEP_INTERVAL_SECS",
                session_defaults.sweep_interval_secs,
            )?,
            inbox_capacity: env.parse_or("SESSION_INBOX_CAPACITY", session_defaults.inbox_capacity)?,
        };

        let jackpot_defaults = JackpotConfig::default();
        let jackpot = JackpotConfig {
            jackpot_type: session.jackpot_type.clone(),
            percentage_bps: env.parse_or("JACKPOT_PERCENTAGE_BPS", jackpot_defaults.percentage_bps)?,
            min_amount: env.parse_or("JACKPOT_MIN", jackpot_defaults.min_amount)?,
            max_amount: env.parse_or("JACKPOT_MAX", jackpot_defaults.max_amount)?,
            win_probability: env
                .parse_or("JACKPOT_WIN_PROBABILITY", jackpot_defaults.win_probability)?,
        };

        let diagnostics = DiagnosticsConfig {
            path: match lookup("DIAGNOSTICS_PATH") {
                Some(path) if path.is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from("diagnostics.log")),
            },
            buffer: env.parse_or("DIAGNOSTICS_BUFFER", DEFAULT_BUFFER)?,
        };

        let metrics_bind = match lookup("METRICS_BIND").filter(|v| !v.is_empty()) {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("'{}' is not a socket address", raw),
            })?),
            None => None,
        };

        Ok(ServerConfig {
            bind,
            ensure_schema: env.parse_or("DB_ENSURE_SCHEMA", false)?,
            database,
            session,
            jackpot,
            hub_client_queue: env.parse_or("HUB_CLIENT_QUEUE", DEFAULT_CLIENT_QUEUE)?,
            diagnostics,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(database) = &self.database {
            database.validate().map_err(|reason| ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason,
            })?;
        }

        self.session
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "SESSION_*".to_string(),
                reason,
            })?;

        self.jackpot
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "JACKPOT_*".to_string(),
                reason,
            })?;

        if self.hub_client_queue == 0 {
            return Err(ConfigError::Invalid {
                var: "HUB_CLIENT_QUEUE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.diagnostics.buffer == 0 {
            return Err(ConfigError::Invalid {
                var: "DIAGNOSTICS_BUFFER".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Parse `key` if set, otherwise `default`; a set but malformed value is an error
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
    {
        match (self.lookup)(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("Could not parse '{}'", raw),
            }),
            None => Ok(default),
        }
    }
}
