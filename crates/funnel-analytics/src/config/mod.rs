use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::analytics::{AttributionModel, AttributionSettings, BottleneckConfig, InsightThresholds};

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
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
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

        let database = DatabaseConfig {
            path: env::var("FUNNEL_DATABASE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            analytics: AnalyticsConfig::from_env()?,
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
}

/// Location of the SQLite funnel database; in-memory when unset.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Tunables for the analytics components.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub default_model: AttributionModel,
    pub bottleneck: BottleneckConfig,
    pub attribution: AttributionSettings,
    pub insights: InsightThresholds,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_model: AttributionModel::Linear,
            bottleneck: BottleneckConfig::default(),
            attribution: AttributionSettings::default(),
            insights: InsightThresholds::default(),
        }
    }
}

impl AnalyticsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = env_value("FUNNEL_ATTRIBUTION_MODEL") {
            config.default_model = value
                .parse::<AttributionModel>()
                .map_err(|_| ConfigError::InvalidModel(value))?;
        }
        if let Some(days) = env_number("FUNNEL_BOTTLENECK_THRESHOLD_DAYS")? {
            config.bottleneck.bottleneck_threshold_days = days;
        }
        if let Some(percent) = env_number("FUNNEL_LOW_CONVERSION_PERCENT")? {
            config.bottleneck.low_conversion_threshold_percent = percent;
        }
        if let Some(multiplier) = env_number("FUNNEL_STUCK_MULTIPLIER")? {
            config.bottleneck.stuck_multiplier = multiplier;
        }
        if let Some(tolerance) = env_number("FUNNEL_DURATION_TOLERANCE")? {
            config.bottleneck.duration_tolerance = tolerance;
        }
        if let Some(half_life) = env_number("FUNNEL_HALF_LIFE_DAYS")? {
            config.attribution.half_life_days = half_life;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("FUNNEL_BOTTLENECK_THRESHOLD_DAYS", self.bottleneck.bottleneck_threshold_days, true),
            ("FUNNEL_LOW_CONVERSION_PERCENT", self.bottleneck.low_conversion_threshold_percent, true),
            ("FUNNEL_STUCK_MULTIPLIER", self.bottleneck.stuck_multiplier, false),
            ("FUNNEL_DURATION_TOLERANCE", self.bottleneck.duration_tolerance, true),
            ("FUNNEL_HALF_LIFE_DAYS", self.attribution.half_life_days, false),
        ];
        for (key, value, zero_allowed) in checks {
            let in_range = value.is_finite() && if zero_allowed { value >= 0.0 } else { value > 0.0 };
            if !in_range {
                return Err(ConfigError::OutOfRange { key, value });
            }
        }
        if self.bottleneck.low_conversion_threshold_percent > 100.0 {
            return Err(ConfigError::OutOfRange {
                key: "FUNNEL_LOW_CONVERSION_PERCENT",
                value: self.bottleneck.low_conversion_threshold_percent,
            });
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_number(key: &'static str) -> Result<Option<f64>, ConfigError> {
    match env_value(key) {
        None => Ok(None),
        Some(value) => f64::from_str(value.trim())
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidModel(String),
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str, value: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidModel(value) => write!(
                f,
                "FUNNEL_ATTRIBUTION_MODEL '{}' is not one of first_touch, last_touch, linear, time_decay, position_based",
                value
            ),
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{} must be a number, got '{}'", key, value)
            }
            ConfigError::OutOfRange { key, value } => {
                write!(f, "{} is out of range: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
