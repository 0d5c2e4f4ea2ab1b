//! Engine configuration.
//!
//! ```
//! use termsift::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{"page_size": 25}"#).unwrap();
//! assert_eq!(config.page_size, 25);
//! assert_eq!(config.cache_capacity, 1000);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermsiftError};

/// Configuration for [`QueryEngine`](crate::engine::QueryEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of posting entries each leaf fetches per store round trip.
    pub page_size: usize,

    /// Maximum number of compiled queries kept in the query cache.
    pub cache_capacity: usize,

    /// Whether queries use strongly consistent reads unless told otherwise.
    pub consistent_read: bool,

    /// Result limit applied when a query does not set one.
    pub default_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: 100,
            cache_capacity: 1000,
            consistent_read: false,
            default_limit: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the query cache capacity.
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Set the default read consistency.
    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Set the default result limit.
    pub fn with_default_limit(mut self, default_limit: Option<usize>) -> Self {
        self.default_limit = default_limit;
        self
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(TermsiftError::invalid_argument("page_size must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(TermsiftError::invalid_argument(
                "cache_capacity must be positive",
            ));
        }
        Ok(())
    }
}
