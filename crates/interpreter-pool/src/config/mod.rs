use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;

use crate::assignment::{EngineSettings, PolicyMode, RetryPolicy};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Deployment stage read from `APP_ENV`. Unrecognised labels mean development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_label(label: &str) -> Self {
        let label = label.trim();
        let is = |candidate: &str| label.eq_ignore_ascii_case(candidate);
        if is("prod") || is("production") {
            Self::Production
        } else if is("test") || is("ci") {
            Self::Test
        } else {
            Self::Development
        }
    }
}

/// Startup settings for the service binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = env::var("APP_ENV")
            .map(|label| AppEnvironment::from_label(&label))
            .unwrap_or(AppEnvironment::Development);

        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig {
                log_level: text("APP_LOG_LEVEL", DEFAULT_LOG_LEVEL),
                ansi: environment == AppEnvironment::Development,
            },
            pool: PoolConfig::from_env()?,
        })
    }
}

/// HTTP bind address. `localhost` stands for the IPv4 loopback.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("APP_PORT") {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value })?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self {
            host: text("APP_HOST", DEFAULT_HOST),
            port,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse()
                .map_err(|source| ConfigError::InvalidHost {
                    host: self.host.clone(),
                    source,
                })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Colored output; only for local development.
    pub ansi: bool,
}

/// Initial policy and processing cadence for the booking pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub policy_mode: PolicyMode,
    pub auto_assign: bool,
    pub max_attempts: u32,
    pub retry_backoff_minutes: u32,
    pub stuck_threshold_minutes: u32,
    pub processing_interval_hours: u32,
    pub tick_seconds: u64,
    pub batch_size: usize,
}

impl PoolConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let policy_mode = match env::var("POOL_POLICY_MODE") {
            Ok(value) => PolicyMode::from_str(&value)
                .map_err(|_| ConfigError::UnknownPolicyMode { value })?,
            Err(_) => defaults.policy_mode,
        };
        let auto_assign = match env::var("POOL_AUTO_ASSIGN") {
            Ok(value) => parse_flag(&value).ok_or(ConfigError::InvalidValue {
                variable: "POOL_AUTO_ASSIGN",
                value,
            })?,
            Err(_) => defaults.auto_assign,
        };

        Ok(Self {
            policy_mode,
            auto_assign,
            max_attempts: number("POOL_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_backoff_minutes: number(
                "POOL_RETRY_BACKOFF_MINUTES",
                defaults.retry_backoff_minutes,
            )?,
            stuck_threshold_minutes: number(
                "POOL_STUCK_THRESHOLD_MINUTES",
                defaults.stuck_threshold_minutes,
            )?,
            processing_interval_hours: number(
                "POOL_PROCESSING_INTERVAL_HOURS",
                defaults.processing_interval_hours,
            )?,
            tick_seconds: number("POOL_TICK_SECONDS", defaults.tick_seconds)?,
            batch_size: number("POOL_BATCH_SIZE", defaults.batch_size)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = (self.retry_backoff_minutes > 0)
            .then(|| Duration::minutes(i64::from(self.retry_backoff_minutes)));
        RetryPolicy::new(self.max_attempts, backoff)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.batch_size,
            retry: self.retry_policy(),
        }
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::minutes(i64::from(self.stuck_threshold_minutes))
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::hours(i64::from(self.processing_interval_hours))
    }

    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            policy_mode: PolicyMode::Normal,
            auto_assign: true,
            max_attempts: 3,
            retry_backoff_minutes: 30,
            stuck_threshold_minutes: 60,
            processing_interval_hours: 24,
            tick_seconds: 300,
            batch_size: 50,
        }
    }
}

fn number<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { variable, value }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn text(variable: &str, default: &str) -> String {
    env::var(variable).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort {
        value: String,
    },
    InvalidHost {
        host: String,
        source: std::net::AddrParseError,
    },
    InvalidValue {
        variable: &'static str,
        value: String,
    },
    UnknownPolicyMode {
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort { value } => {
                write!(f, "APP_PORT '{value}' is not a port number")
            }
            ConfigError::InvalidHost { host, .. } => {
                write!(f, "APP_HOST '{host}' is neither localhost nor an IP address")
            }
            ConfigError::InvalidValue { variable, value } => {
                write!(f, "{variable} has an invalid value '{value}'")
            }
            ConfigError::UnknownPolicyMode { value } => write!(
                f,
                "POOL_POLICY_MODE must be one of balance, urgent, normal, custom (got '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let ConfigError::InvalidHost { source, .. } = self {
            Some(source)
        } else {
            None
        }
    }
}
