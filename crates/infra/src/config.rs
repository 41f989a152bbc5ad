//! Configuration loading and representation.
//!
//! Everything is read from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `WAYBILL_DATABASE_URL` | unset (in-memory store) |
//! | `WAYBILL_DB_MAX_CONNECTIONS` | `5` |
//! | `WAYBILL_VALIDATION_CONCURRENCY` | `8` |

use thiserror::Error;

use crate::cart_options::DEFAULT_VALIDATION_CONCURRENCY;

pub const DATABASE_URL_VAR: &str = "WAYBILL_DATABASE_URL";
pub const DB_MAX_CONNECTIONS_VAR: &str = "WAYBILL_DB_MAX_CONNECTIONS";
pub const VALIDATION_CONCURRENCY_VAR: &str = "WAYBILL_VALIDATION_CONCURRENCY";

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub validation_concurrency: usize,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            validation_concurrency: DEFAULT_VALIDATION_CONCURRENCY,
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());

        let db_max_connections = match lookup(DB_MAX_CONNECTIONS_VAR) {
            Some(raw) => parse_positive(DB_MAX_CONNECTIONS_VAR, &raw)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let validation_concurrency = match lookup(VALIDATION_CONCURRENCY_VAR) {
            Some(raw) => parse_positive::<usize>(VALIDATION_CONCURRENCY_VAR, &raw)?,
            None => DEFAULT_VALIDATION_CONCURRENCY,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            validation_concurrency,
        })
    }
}

fn parse_positive<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: raw.to_string(),
        }),
    }
}
