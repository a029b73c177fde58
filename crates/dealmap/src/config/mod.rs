use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::recommend::{RecommendationConfig, RetryPolicy, UsageFailurePolicy, MAX_SPEND};

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
    pub catalog: CatalogConfig,
    pub recommendation: RecommendationConfig,
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

        let catalog = CatalogConfig {
            path: env::var("DEALMAP_CATALOG_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            refresh_interval: match parse_var::<u64>("DEALMAP_CATALOG_REFRESH_SECS", 300)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        };

        let defaults = RecommendationConfig::default();
        let max_concurrency = parse_var("DEALMAP_MAX_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(invalid("DEALMAP_MAX_CONCURRENCY", "0"));
        }
        let default_spend: Decimal = parse_var("DEALMAP_DEFAULT_SPEND", defaults.default_spend)?;
        if default_spend.is_sign_negative() || default_spend > MAX_SPEND {
            return Err(invalid("DEALMAP_DEFAULT_SPEND", &default_spend.to_string()));
        }
        let usage_failure_policy = match env::var("DEALMAP_USAGE_FAILURE_POLICY") {
            Ok(value) => UsageFailurePolicy::parse(&value)
                .ok_or_else(|| invalid("DEALMAP_USAGE_FAILURE_POLICY", &value))?,
            Err(_) => defaults.usage_failure_policy,
        };
        let retry = RetryPolicy {
            max_retries: parse_var("DEALMAP_COLLABORATOR_RETRIES", defaults.retry.max_retries)?,
            base_delay: Duration::from_millis(parse_var(
                "DEALMAP_COLLABORATOR_BACKOFF_MS",
                duration_ms(defaults.retry.base_delay),
            )?),
            ..defaults.retry
        };

        let recommendation = RecommendationConfig {
            request_deadline: Duration::from_millis(parse_var(
                "DEALMAP_REQUEST_DEADLINE_MS",
                duration_ms(defaults.request_deadline),
            )?),
            max_concurrency,
            default_spend,
            usage_failure_policy,
            retry,
            ..defaults
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            catalog,
            recommendation,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| invalid(name, &value)),
        Err(_) => Ok(default),
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
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
}

/// Where the catalog comes from and how often it is reloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// JSON catalog export; the bundled demo catalog is used when unset.
    pub path: Option<PathBuf>,
    /// `None` disables background refresh.
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
