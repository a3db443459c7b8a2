//! Static process configuration.
//!
//! Loaded once at startup, immutable afterwards, shared read-only by the
//! controller and every worker. Workers never mutate it, so it is passed
//! around as a plain `Arc<Config>` without synchronization.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} is required when SESSION_STORE_TYPE=Mongo")]
    MissingMongoUrl { key: &'static str },
}

/// Deployment environment, selecting error verbosity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl FromStr for Environment {
    type Err = core::convert::Infallible;

    // Anything that is not explicitly "production" is a dev deployment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        })
    }
}

/// Which backend persists sessions.
///
/// The discriminator recognizes `"Mongo"` and `"Redis"`; anything else
/// (including unset) falls back to in-process memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionStoreKind {
    Mongo,
    Redis,
    Memory,
}

impl FromStr for SessionStoreKind {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Mongo" => SessionStoreKind::Mongo,
            "Redis" => SessionStoreKind::Redis,
            _ => SessionStoreKind::Memory,
        })
    }
}

/// Connection parameters for the Redis session backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl RedisConfig {
    /// Connection URL in the form `redis://[:pass@]host:port/db`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(pass) => format!("redis://:{}@{}:{}/{}", pass, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Upper bound on forked workers; the effective count is
    /// `min(detected cpus, worker_cap)`.
    pub worker_cap: usize,
    pub environment: Environment,

    pub session_store: SessionStoreKind,
    pub mongo_session_url: Option<String>,
    pub redis: RedisConfig,
    pub session_secret: String,
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,

    /// Static asset directories served after the router.
    pub public_dir: PathBuf,
    pub views_dir: PathBuf,

    /// Listen backlog hint passed to the socket.
    pub listen_backlog: i32,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (tests inject maps
    /// here instead of mutating the process environment).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&get, "ENV_PORT", 3000u16)?;
        let worker_cap = parse_or(&get, "NUM_OF_WORKERS", 8usize)?;

        let environment = get("APP_ENV")
            .as_deref()
            .unwrap_or("development")
            .parse()
            .unwrap_or(Environment::Development);

        let session_store = get("SESSION_STORE_TYPE")
            .as_deref()
            .unwrap_or("")
            .parse()
            .unwrap_or(SessionStoreKind::Memory);

        let mongo_session_url = get("MONGO_SESSION_STORE_URL");
        if session_store == SessionStoreKind::Mongo && mongo_session_url.is_none() {
            return Err(ConfigError::MissingMongoUrl {
                key: "MONGO_SESSION_STORE_URL",
            });
        }

        let redis = RedisConfig {
            host: get("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&get, "REDIS_PORT", 6379u16)?,
            db: parse_or(&get, "REDIS_DB", 0i64)?,
            password: get("REDIS_PASSWORD"),
        };

        let session_secret = get("SESSION_SECRET").unwrap_or_else(|| {
            tracing::warn!("SESSION_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });

        Ok(Self {
            port,
            worker_cap: worker_cap.max(1),
            environment,
            session_store,
            mongo_session_url,
            redis,
            session_secret,
            session_ttl_secs: parse_or(&get, "SESSION_TTL_SECS", 86_400u64)?,
            public_dir: get("PUBLIC_DIR").map(PathBuf::from).unwrap_or_else(|| "public".into()),
            views_dir: get("VIEWS_DIR").map(PathBuf::from).unwrap_or_else(|| "views".into()),
            listen_backlog: parse_or(&get, "LISTEN_BACKLOG", 1500i32)?,
        })
    }
}

fn parse_or<T: FromStr>(
    get: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
