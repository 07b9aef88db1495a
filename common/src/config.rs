//! Service configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::errors::{AppError, AppResult};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MONGODB_URL: &str = "mongodb://127.0.0.1:27017";
const DEFAULT_DB_NAME: &str = "admin";
const DEFAULT_PAGE_SIZE: u64 = 10;
const DEFAULT_MAX_PAGE_SIZE: u64 = 50;

/// Pagination policy of a service.
///
/// A policy without `default` disables pagination: `find` then returns the
/// bare record list instead of a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_bounds"))]
pub struct Paginate {
    /// Page size used when the query has no `$limit`.
    #[validate(range(min = 1, message = "default page size must be at least 1"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u64>,

    /// Upper bound applied to any requested `$limit`.
    #[validate(range(min = 1, message = "max page size must be at least 1"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

fn validate_bounds(paginate: &Paginate) -> Result<(), ValidationError> {
    match (paginate.default, paginate.max) {
        (Some(default), Some(max)) if default > max => {
            Err(ValidationError::new("default_exceeds_max")
                .with_message("default page size exceeds max page size".into()))
        }
        _ => Ok(()),
    }
}

impl Paginate {
    /// Creates an active policy.
    pub fn new(default: u64, max: u64) -> Self {
        Self {
            default: Some(default),
            max: Some(max),
        }
    }

    /// Whether `find` should return a page rather than bare data.
    pub fn is_enabled(&self) -> bool {
        self.default.is_some()
    }

    /// Checks the policy, reporting violations as configuration errors.
    pub fn checked(self) -> AppResult<Self> {
        self.validate()
            .map_err(|e| AppError::Configuration(format!("invalid paginate policy: {}", e)))?;
        Ok(self)
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and response metadata.
    pub service_name: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// MongoDB connection string.
    pub mongodb_url: String,
    /// Database bound by the collection and user services.
    pub db_name: String,
    /// Default pagination policy for all services.
    pub paginate: Paginate,
}

impl AppConfig {
    /// Loads configuration for the named service from the environment.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to read .env file");
            }
        }
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("SERVER_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Configuration(format!("invalid SERVER_PORT '{}'", raw)))?,
            None => DEFAULT_PORT,
        };

        let paginate = Paginate {
            default: Some(parse_size(&lookup, "PAGINATE_DEFAULT", DEFAULT_PAGE_SIZE)?),
            max: Some(parse_size(&lookup, "PAGINATE_MAX", DEFAULT_MAX_PAGE_SIZE)?),
        }
        .checked()?;

        Ok(Self {
            service_name: service_name.to_string(),
            host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            mongodb_url: lookup("MONGODB_URL").unwrap_or_else(|| DEFAULT_MONGODB_URL.to_string()),
            db_name: lookup("MONGODB_DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            paginate,
        })
    }

    /// Returns the `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_size<F>(lookup: &F, key: &str, fallback: u64) -> AppResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Configuration(format!("invalid {} '{}'", key, raw))),
        None => Ok(fallback),
    }
}
