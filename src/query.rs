//! Query compilation and evaluation.
//!
//! A query string such as
//!
//! ```text
//! t.name={who} | (t.bio="rust compiler" - t.tags=archived)
//! ```
//!
//! is compiled once into a tree of [`QueryNode`]s and evaluated against the
//! posting lists of an [`IndexStore`](crate::store::IndexStore).
//!
//! # Operators
//!
//! | Operator | Node | Precedence |
//! |---|---|---|
//! | `\|` | union | lowest |
//! | `-` | difference | |
//! | `&` | intersection | |
//! | `+` (inside phrases) | positional intersection | highest |
//!
//! Parentheses override precedence. A phrase `table.column=value` takes a
//! quoted string, a bare token or a `{name}` parameter as its value.
//!
//! # Evaluation model
//!
//! Every node evaluates to an [`EvalResult`]: a sorted page of matches plus
//! the `last_key` up to which that page is proven complete. Leaves read one
//! bounded page of their posting list per call. The driver in
//! [`compiled`] keeps re-evaluating the tree from the previous `last_key`
//! until it has enough matches or the tree is exhausted.

pub mod cache;
pub mod compiled;
pub mod node;
pub mod ops;
pub mod parser;
pub mod phrase;
pub mod term;

use std::collections::HashMap;

use crate::key::ObjectKey;

pub use cache::{CacheStats, QueryCache};
pub use compiled::{CompiledQuery, QueryOptions, QueryPage};
pub use node::{EvalContext, OpNode, QueryNode, SetOp};
pub use parser::QueryParser;
pub use phrase::{ParameterNode, PhraseNode, PhraseValue};
pub use term::IndexTermNode;

/// Parameter values bound to `{name}` placeholders.
pub type Params = HashMap<String, String>;

/// A single matching object.
///
/// Ordering and equality of a result list are defined by `key` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The matching object key.
    pub key: ObjectKey,
    /// Decoded freight (token positions), when the leaf carried any.
    pub data: Option<Vec<u32>>,
}

impl MatchResult {
    /// Create a match without freight.
    pub fn new(key: ObjectKey) -> Self {
        MatchResult { key, data: None }
    }

    /// Create a match carrying token positions.
    pub fn with_positions(key: ObjectKey, positions: Vec<u32>) -> Self {
        MatchResult {
            key,
            data: Some(positions),
        }
    }
}

/// The outcome of evaluating one node.
///
/// `matches` is strictly ascending by key. Every match is `<= last_key`
/// when `last_key` is set; `last_key == None` means the node has no data
/// beyond what was returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalResult {
    /// Matches in ascending key order.
    pub matches: Vec<MatchResult>,
    /// Key up to which `matches` is complete; `None` once exhausted.
    pub last_key: Option<ObjectKey>,
    /// Read cost units spent producing this result.
    pub cost: u64,
}

impl EvalResult {
    /// A result with no matches and no further data.
    pub fn exhausted() -> Self {
        EvalResult::default()
    }

    /// Whether the node has no data beyond this result.
    pub fn is_exhausted(&self) -> bool {
        self.last_key.is_none()
    }

    /// The matching keys.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.matches.iter().map(|m| m.key.clone()).collect()
    }

    /// Drop matches beyond `last_key`.
    pub fn truncate_to_last_key(&mut self) {
        if let Some(last_key) = &self.last_key {
            let end = self.matches.partition_point(|m| m.key <= *last_key);
            self.matches.truncate(end);
        }
    }
}
