use crate::error::{Result, StoreError};
use std::env;

pub const DEFAULT_MAX_DEPTH: usize = 16;
/// Smallest limit that still fits the default shapes: root, its reviews,
/// and the far endpoint of each review.
pub const MIN_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: String,
    pub bind_addr: String,
    pub log_level: String,
    /// Nesting limit for serialized entity graphs.
    pub max_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "reviews.db".to_string(),
            bind_addr: "127.0.0.1:3004".to_string(),
            log_level: "info".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Split out so tests don't have to touch the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_depth = match lookup("REVIEWS_MAX_DEPTH") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| StoreError::Config {
                message: format!("REVIEWS_MAX_DEPTH must be a positive integer, got '{raw}'"),
            })?,
            None => defaults.max_depth,
        };
        if max_depth < MIN_MAX_DEPTH {
            return Err(StoreError::Config {
                message: format!("REVIEWS_MAX_DEPTH must be at least {MIN_MAX_DEPTH}, got {max_depth}"),
            });
        }

        let database_path = lookup("REVIEWS_DATABASE_PATH").unwrap_or(defaults.database_path);
        if database_path.trim().is_empty() {
            return Err(StoreError::Config {
                message: "REVIEWS_DATABASE_PATH cannot be empty".to_string(),
            });
        }

        Ok(Self {
            database_path,
            bind_addr: lookup("REVIEWS_BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_level: lookup("REVIEWS_LOG_LEVEL").unwrap_or(defaults.log_level),
            max_depth,
        })
    }
}
