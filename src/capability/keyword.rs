//! Keyword capability that treats each value as a single term.
//!
//! Useful for ID fields, tags, categories and any column that is matched
//! exactly as provided.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use termsift::capability::{KeywordCapability, TermCapability};
//!
//! let capability = KeywordCapability::new();
//! let terms = capability.compute_terms(&json!(["red", "blue"])).unwrap();
//! assert_eq!(terms.len(), 2);
//! assert!(terms.contains_key("red"));
//! ```

use serde_json::Value;

use crate::capability::{TermCapability, TermMap, quote_token, value_strings};
use crate::error::Result;

/// A capability that indexes each whole value as one term, without freight.
#[derive(Clone, Debug, Default)]
pub struct KeywordCapability {
    lowercase: bool,
}

impl KeywordCapability {
    /// Create a new case-sensitive keyword capability.
    pub fn new() -> Self {
        KeywordCapability { lowercase: false }
    }

    /// Fold values to lowercase on both the write and the read path.
    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    fn normalize(&self, value: &str) -> String {
        if self.lowercase {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }
}

impl TermCapability for KeywordCapability {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn compute_terms(&self, value: &Value) -> Result<TermMap> {
        Ok(value_strings(value)?
            .iter()
            .map(|s| (self.normalize(s), None))
            .collect())
    }

    fn canonical_phrase(&self, phrase: &str) -> Result<String> {
        Ok(quote_token(&self.normalize(phrase)))
    }

    fn single_term(&self, phrase: &str) -> Result<Option<String>> {
        Ok(Some(self.normalize(phrase)))
    }
}
