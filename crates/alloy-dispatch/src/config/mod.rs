use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CRM_BASE_URL: &str = "https://services.leadconnectorhq.com";
const DEFAULT_CRM_TIMEOUT_SECS: u64 = 10;

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
    pub crm: Option<CrmConfig>,
    pub dispatch: DispatchConfig,
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

        let cors_origins = env::var("ALLOY_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let debug_routes = match non_empty_var("ALLOY_DEBUG_ROUTES") {
            Some(raw) => parse_flag("ALLOY_DEBUG_ROUTES", &raw)?,
            None => environment != AppEnvironment::Production,
        };

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                cors_origins,
            },
            telemetry: TelemetryConfig { log_level },
            crm: CrmConfig::from_env()?,
            dispatch: DispatchConfig {
                contractors_csv: non_empty_var("ALLOY_CONTRACTORS_CSV").map(PathBuf::from),
                default_skill: non_empty_var("ALLOY_DEFAULT_SKILL")
                    .unwrap_or_else(|| "cleaning".to_string()),
                default_city: non_empty_var("ALLOY_DEFAULT_CITY")
                    .unwrap_or_else(|| "Bend".to_string()),
                debug_routes,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
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

/// Credentials and endpoint for the LeadConnector CRM. Absent when either the
/// API key or the location id is missing.
#[derive(Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_key: String,
    pub location_id: String,
    pub timeout: Duration,
}

impl CrmConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (api_key, location_id) = match (
            non_empty_var("GHL_API_KEY"),
            non_empty_var("GHL_LOCATION_ID"),
        ) {
            (Some(key), Some(location)) => (key, location),
            _ => return Ok(None),
        };

        let timeout_secs = match non_empty_var("GHL_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidCrmTimeout)?,
            None => DEFAULT_CRM_TIMEOUT_SECS,
        };

        Ok(Some(Self {
            base_url: non_empty_var("GHL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CRM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            location_id,
            timeout: Duration::from_secs(timeout_secs),
        }))
    }
}

impl fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("location_id", &self.location_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Knobs for the dispatch core and lead intake.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub contractors_csv: Option<PathBuf>,
    pub default_skill: String,
    pub default_city: String,
    pub debug_routes: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCrmTimeout,
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCrmTimeout => {
                write!(f, "GHL_TIMEOUT_SECS must be a whole number of seconds")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCrmTimeout
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: raw.to_string(),
        }),
    }
}
