//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 8000,
        }
    }
}

/// CORS configuration. An empty list allows any origin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Policy knobs
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    pub require_change_id_for_prod: bool,
    pub bulk_threshold: usize,
    pub patch_cutoff_hours: u32,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            require_change_id_for_prod: true,
            bulk_threshold: 30,
            patch_cutoff_hours: 24,
        }
    }
}

/// External plan drafting (Gemini)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Optional PostgreSQL run store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_pool_size: usize,
}

pub const DEFAULT_DEMO_USERS: &str =
    r#"{"admin":{"role":"admin"},"operator":{"role":"operator"},"viewer":{"role":"viewer"}}"#;

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub governance: GovernanceConfig,
    pub llm: LlmConfig,
    pub tool_latency: Duration,
    pub demo_users_json: String,
    pub database: Option<DatabaseConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "OpsPilot".to_string(),
            server: ServerConfig::default(),
            cors: CorsConfig::default(),
            governance: GovernanceConfig::default(),
            llm: LlmConfig::default(),
            tool_latency: Duration::from_millis(200),
            demo_users_json: DEFAULT_DEMO_USERS.to_string(),
            database: None,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: parse_or(var("HOST"), "HOST", defaults.server.host)?,
            port: parse_or(var("PORT"), "PORT", defaults.server.port)?,
        };

        let cors = CorsConfig {
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let governance = GovernanceConfig {
            require_change_id_for_prod: match var("REQUIRE_CHANGE_ID_FOR_PROD") {
                Some(raw) => parse_bool(&raw, "REQUIRE_CHANGE_ID_FOR_PROD")?,
                None => defaults.governance.require_change_id_for_prod,
            },
            bulk_threshold: parse_or(var("BULK_THRESHOLD"), "BULK_THRESHOLD", defaults.governance.bulk_threshold)?,
            patch_cutoff_hours: parse_or(
                var("PATCH_CUTOFF_HOURS"),
                "PATCH_CUTOFF_HOURS",
                defaults.governance.patch_cutoff_hours,
            )?,
        };

        let base_url = var("GEMINI_BASE_URL").unwrap_or(defaults.llm.base_url);
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidValue(format!("GEMINI_BASE_URL: {}", e)))?;

        let llm = LlmConfig {
            api_key: var("GEMINI_API_KEY"),
            model: var("GEMINI_MODEL").unwrap_or(defaults.llm.model),
            base_url,
            timeout: Duration::from_secs(parse_or(var("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 30u64)?),
        };

        let tool_latency = Duration::from_millis(parse_or(var("TOOL_LATENCY_MS"), "TOOL_LATENCY_MS", 200u64)?);

        let database = match var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: Self::check_database_url(url)?,
                max_pool_size: parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10usize)?,
            }),
            None => None,
        };

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or(defaults.app_name),
            server,
            cors,
            governance,
            llm,
            tool_latency,
            demo_users_json: var("DEMO_USERS_JSON").unwrap_or(defaults.demo_users_json),
            database,
        })
    }

    /// Validate a DATABASE_URL connection string (postgresql://...)
    fn check_database_url(url: String) -> Result<String, ConfigError> {
        let parsed = url::Url::parse(&url).map_err(|_| {
            ConfigError::InvalidValue("Invalid DATABASE_URL format (expected postgresql://...)".to_string())
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme: {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()));
        }

        Ok(url)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str, key: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{}={}", key, raw))),
    }
}
