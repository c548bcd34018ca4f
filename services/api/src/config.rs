//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use pdf_exchange_core::domain::DEFAULT_SESSION_CODE_LENGTH;
use pdf_exchange_core::ThreadReadPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where session metadata lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Everything in process memory; state is lost on restart.
    Memory,
}

/// Browser origins allowed by CORS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_code_length: usize,
    pub cors_origins: CorsOrigins,
    pub thread_read_policy: ThreadReadPolicy,
    pub allocate_on_join: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:8000".parse::<SocketAddr>().ok())?;

        // --- Storage ---
        let storage_backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{other}' is not one of postgres, memory"),
                ))
            }
        };

        let database_url = lookup("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Uploads ---
        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", Some(50 * 1024 * 1024))?;

        // --- Exchange behaviour ---
        let session_code_length =
            parse_or(&lookup, "SESSION_CODE_LENGTH", Some(DEFAULT_SESSION_CODE_LENGTH))?;
        if !(4..=20).contains(&session_code_length) {
            return Err(ConfigError::InvalidValue(
                "SESSION_CODE_LENGTH".to_string(),
                "must be between 4 and 20".to_string(),
            ));
        }

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) if raw.trim() == "*" => CorsOrigins::Any,
            Some(raw) => CorsOrigins::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => CorsOrigins::List(vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ]),
        };

        let thread_read_policy = if parse_flag(&lookup, "UPLOADER_CAN_READ_THREAD")? {
            ThreadReadPolicy::AssignedOrUploader
        } else {
            ThreadReadPolicy::AssignedOnly
        };
        let allocate_on_join = parse_flag(&lookup, "ALLOCATE_ON_JOIN")?;

        Ok(Self {
            bind_address,
            storage_backend,
            database_url,
            database_max_connections,
            log_level,
            upload_dir,
            max_upload_bytes,
            session_code_length,
            cors_origins,
            thread_read_policy,
            allocate_on_join,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}

fn parse_flag<F>(lookup: &F, name: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{v}' is not a boolean"),
            )),
        },
    }
}
