use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::compliance::config::{DEFAULT_FETCH_TIMEOUT, DEFAULT_RULE_CACHE_TTL};
use crate::compliance::{EngineConfig, FaultPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
    pub rules: RuleSourceConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let fault_policy = match env::var("COMPLIANCE_FAULT_POLICY") {
            Ok(raw) => raw
                .parse::<FaultPolicy>()
                .map_err(|_| ConfigError::InvalidFaultPolicy(raw))?,
            Err(_) => FaultPolicy::default(),
        };

        let fetch_timeout = match env::var("COMPLIANCE_FETCH_TIMEOUT_MS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(millis) if millis > 0 => Duration::from_millis(millis),
                _ => return Err(ConfigError::InvalidFetchTimeout),
            },
            Err(_) => DEFAULT_FETCH_TIMEOUT,
        };

        let rule_cache_ttl = match env::var("COMPLIANCE_RULE_CACHE_TTL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidCacheTtl)?,
            Err(_) => DEFAULT_RULE_CACHE_TTL,
        };

        let rules_path = env::var("COMPLIANCE_RULES_PATH")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            engine: EngineConfig {
                fault_policy,
                fetch_timeout,
                rule_cache_ttl,
            },
            rules: RuleSourceConfig { path: rules_path },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Where the service loads persisted rule definitions from.
#[derive(Debug, Clone, Default)]
pub struct RuleSourceConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFaultPolicy(String),
    InvalidFetchTimeout,
    InvalidCacheTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFaultPolicy(value) => write!(
                f,
                "COMPLIANCE_FAULT_POLICY must be fail_open or fail_closed (found '{value}')"
            ),
            ConfigError::InvalidFetchTimeout => write!(
                f,
                "COMPLIANCE_FETCH_TIMEOUT_MS must be a positive number of milliseconds"
            ),
            ConfigError::InvalidCacheTtl => write!(
                f,
                "COMPLIANCE_RULE_CACHE_TTL_SECS must be a non-negative number of seconds"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidFaultPolicy(_)
            | ConfigError::InvalidFetchTimeout
            | ConfigError::InvalidCacheTtl => None,
        }
    }
}
