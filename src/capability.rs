//! Pluggable index-term capabilities.
//!
//! A capability turns a column value into the terms that are written to the
//! index table, and turns a query phrase into the canonical sub-query that
//! looks those terms up again. It plays the role an analyzer plays in a
//! classic inverted index, but it owns both halves of the round trip so the
//! write path and the read path can never disagree on normalization.
//!
//! # Canonical phrase grammar
//!
//! [`TermCapability::canonical_phrase`] returns text in a small grammar that
//! the phrase expander parses:
//!
//! ```text
//! chain := token ('+' token)*
//! token := '"' escaped-text '"' | '_'
//! ```
//!
//! `_` is a wildcard placeholder that matches any single position. An empty
//! string means the phrase reduces to nothing and matches nothing.
//!
//! # Available Capabilities
//!
//! - [`keyword::KeywordCapability`] - whole value is a single term
//! - [`text::TextCapability`] - word segmented terms with token positions

pub mod keyword;
pub mod text;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TermsiftError};

pub use keyword::KeywordCapability;
pub use text::TextCapability;

/// Opaque auxiliary payload stored alongside a posting entry.
pub type Freight = Vec<u8>;

/// Terms computed for one column value, with optional freight per term.
pub type TermMap = BTreeMap<String, Option<Freight>>;

/// Wildcard placeholder token in the canonical phrase grammar.
pub const WILDCARD: &str = "_";

/// Trait for the per-column term generation capability.
///
/// Implementations must be deterministic: the same value always yields the
/// same terms, otherwise re-running the indexer would not converge.
pub trait TermCapability: Send + Sync + Debug {
    /// Get the name of this capability (for schema files and debugging).
    fn name(&self) -> &'static str;

    /// Compute the terms (and their freight) for a column value.
    fn compute_terms(&self, value: &Value) -> Result<TermMap>;

    /// Rewrite a query phrase into the canonical phrase grammar.
    fn canonical_phrase(&self, phrase: &str) -> Result<String>;

    /// Fast path for phrases that reduce to exactly one token.
    ///
    /// Returning `Some(token)` must be equivalent to `canonical_phrase`
    /// returning that single quoted token.
    fn single_term(&self, _phrase: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Decode freight written by `compute_terms` into token positions.
    fn decode_freight(&self, _freight: &[u8]) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }
}

/// Quote a token for the canonical phrase grammar.
pub fn quote_token(token: &str) -> String {
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for ch in token.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Flatten a column value into the strings a capability indexes.
///
/// Arrays contribute each element; `null` contributes nothing.
pub fn value_strings(value: &Value) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    collect_strings(value, &mut strings)?;
    Ok(strings)
}

fn collect_strings(value: &Value, out: &mut Vec<String>) -> Result<()> {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out)?;
            }
        }
        Value::Object(_) => {
            return Err(TermsiftError::capability(
                "object values cannot be indexed",
            ));
        }
    }
    Ok(())
}

/// Look up a stock capability by name.
pub fn by_name(name: &str) -> Result<Arc<dyn TermCapability>> {
    match name {
        "keyword" => Ok(Arc::new(KeywordCapability::new())),
        "text" => Ok(Arc::new(TextCapability::new())),
        other => Err(TermsiftError::schema(format!(
            "unknown capability '{other}'"
        ))),
    }
}
