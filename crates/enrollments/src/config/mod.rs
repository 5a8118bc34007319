use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

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
    pub storage: StorageConfig,
    pub recruitment: RecruitmentConfig,
    pub auth: AuthConfig,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let storage = StorageConfig {
            table_prefix: env::var("ENROLLMENT_TABLE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_TABLE_PREFIX.to_string()),
            page_size: parse_number("ENROLLMENT_STORE_PAGE_SIZE", DEFAULT_STORE_PAGE_SIZE)?,
            seed_path: optional_var("ENROLLMENT_SEED_PATH").map(PathBuf::from),
        };
        if storage.page_size == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "ENROLLMENT_STORE_PAGE_SIZE",
            });
        }

        let retry = RetrySettings {
            max_attempts: parse_number("ENROLLMENT_RETRY_ATTEMPTS", 3)?,
            initial_backoff: Duration::from_millis(parse_number(
                "ENROLLMENT_RETRY_INITIAL_MS",
                25,
            )?),
            max_backoff: Duration::from_millis(parse_number("ENROLLMENT_RETRY_MAX_MS", 400)?),
        };
        if retry.max_attempts == 0 || retry.initial_backoff > retry.max_backoff {
            return Err(ConfigError::InvalidRetryWindow);
        }

        let recruitment = RecruitmentConfig {
            closed_domains: optional_var("ENROLLMENT_CLOSED_DOMAINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            catalog_path: optional_var("ENROLLMENT_CATALOG_PATH").map(PathBuf::from),
            retry,
        };

        let auth = AuthConfig {
            jwt_secret: optional_var("AUTH_JWT_SECRET"),
            audience: optional_var("AUTH_JWT_AUDIENCE"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            storage,
            recruitment,
            auth,
        })
    }
}

const DEFAULT_TABLE_PREFIX: &str = "enrollments-site";
const DEFAULT_STORE_PAGE_SIZE: usize = 25;

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
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

/// Tracing output controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Record store layout: table naming and scan paging.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub table_prefix: String,
    /// Items evaluated per store scan page.
    pub page_size: usize,
    pub seed_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn table_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.table_prefix, suffix)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            page_size: DEFAULT_STORE_PAGE_SIZE,
            seed_path: None,
        }
    }
}

/// Workflow policy knobs.
#[derive(Debug, Clone, Default)]
pub struct RecruitmentConfig {
    /// Domains whose submission deadline has passed.
    pub closed_domains: Vec<String>,
    pub catalog_path: Option<PathBuf>,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(400),
        }
    }
}

/// Bearer-token verification settings.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidRetryWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive integer")
            }
            ConfigError::InvalidRetryWindow => write!(
                f,
                "retry settings need at least one attempt and an initial backoff no larger than the max"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidRetryWindow => None,
        }
    }
}
