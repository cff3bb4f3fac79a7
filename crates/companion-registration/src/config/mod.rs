use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::registration::DEFAULT_MINIMUM_AGE;

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

/// Top-level configuration for the registration service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registration: RegistrationSettings,
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

        let minimum_age = match env::var("REGISTRATION_MINIMUM_AGE") {
            Ok(raw) => parse_minimum_age(&raw)?,
            Err(_) => DEFAULT_MINIMUM_AGE,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            registration: RegistrationSettings { minimum_age },
        })
    }
}

fn parse_minimum_age(raw: &str) -> Result<u32, ConfigError> {
    let age = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidMinimumAge {
            value: raw.to_string(),
        })?;
    RegistrationSettings::with_minimum_age(age).map(|settings| settings.minimum_age)
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Eligibility knobs for the profile-completion wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSettings {
    pub minimum_age: u32,
}

impl RegistrationSettings {
    pub const ACCEPTED_AGES: std::ops::RangeInclusive<u32> = 18..=120;

    /// Explicit age floor, refused outside [`Self::ACCEPTED_AGES`].
    pub fn with_minimum_age(minimum_age: u32) -> Result<Self, ConfigError> {
        if Self::ACCEPTED_AGES.contains(&minimum_age) {
            Ok(Self { minimum_age })
        } else {
            Err(ConfigError::InvalidMinimumAge {
                value: minimum_age.to_string(),
            })
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            minimum_age: DEFAULT_MINIMUM_AGE,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidMinimumAge { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidMinimumAge { value } => write!(
                f,
                "REGISTRATION_MINIMUM_AGE must be a whole number between 18 and 120, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidMinimumAge { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
