//! # Termsift
//!
//! A secondary-index query engine for sorted, hash+range keyed key-value
//! stores.
//!
//! ## Features
//!
//! - Pluggable per-column term capabilities (keywords, positional text)
//! - Minimal, idempotent index maintenance on object writes and deletes
//! - Boolean queries with `|`, `-`, `&`, parentheses and phrase proximity
//! - Injection-safe `{name}` query parameters
//! - Incremental, resumable evaluation over paginated posting lists
//! - LRU cache of compiled queries

pub mod capability;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod key;
pub mod query;
pub mod schema;
pub mod store;
pub mod util;

pub mod prelude {
    pub use crate::capability::{KeywordCapability, TermCapability, TextCapability};
    pub use crate::config::EngineConfig;
    pub use crate::engine::QueryEngine;
    pub use crate::error::{Result, TermsiftError};
    pub use crate::indexer::{ColumnUpdate, IndexSummary, TermIndexer, WriteOptions};
    pub use crate::key::ObjectKey;
    pub use crate::query::{CompiledQuery, QueryOptions, QueryPage};
    pub use crate::schema::Schema;
    pub use crate::store::{Expectation, IndexStore, MemoryStore};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
