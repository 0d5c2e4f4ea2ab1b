//! High-level query engine that combines indexing and querying.
//!
//! [`QueryEngine`] owns the registered table schemas, the compiled query
//! cache and a [`TermIndexer`], all over one [`IndexStore`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use termsift::capability::KeywordCapability;
//! use termsift::config::EngineConfig;
//! use termsift::engine::QueryEngine;
//! use termsift::indexer::{ColumnUpdate, WriteOptions};
//! use termsift::key::ObjectKey;
//! use termsift::query::QueryOptions;
//! use termsift::schema::Schema;
//! use termsift::store::MemoryStore;
//!
//! # tokio_test::block_on(async {
//! let engine = QueryEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default()).unwrap();
//! engine.register_schema(
//!     Schema::builder("t")
//!         .indexed("name", KeywordCapability::new())
//!         .build()
//!         .unwrap(),
//! );
//!
//! for (key, name) in [("k1", "alice"), ("k2", "bob")] {
//!     engine
//!         .write(
//!             "t",
//!             &ObjectKey::new(key),
//!             vec![("name".to_string(), ColumnUpdate::Set(json!(name)))],
//!             &WriteOptions::default(),
//!         )
//!         .await
//!         .unwrap();
//! }
//!
//! let options = QueryOptions::new().with_param("x", "alice");
//! let page = engine.query("t", "t.name={x}", options).await.unwrap();
//! assert_eq!(page.keys, vec![ObjectKey::new("k1")]);
//! # });
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::error::{Result, TermsiftError};
use crate::indexer::{ColumnUpdate, IndexSummary, TermIndexer, WriteOptions};
use crate::key::ObjectKey;
use crate::query::parser::QueryParser;
use crate::query::{CacheStats, CompiledQuery, QueryCache, QueryOptions, QueryPage};
use crate::schema::Schema;
use crate::store::{Expectation, IndexStore};

/// A query engine over one store.
#[derive(Debug)]
pub struct QueryEngine {
    config: EngineConfig,
    store: Arc<dyn IndexStore>,
    indexer: TermIndexer,
    schemas: RwLock<AHashMap<String, Arc<Schema>>>,
    cache: QueryCache,
}

impl QueryEngine {
    /// Create an engine over `store`.
    pub fn new(store: Arc<dyn IndexStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = QueryCache::with_capacity(config.cache_capacity)?;

        Ok(QueryEngine {
            indexer: TermIndexer::new(Arc::clone(&store)),
            store,
            config,
            schemas: RwLock::new(AHashMap::new()),
            cache,
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// The term indexer writing through this engine's store.
    pub fn indexer(&self) -> &TermIndexer {
        &self.indexer
    }

    /// Register a table schema, replacing any previous one for the table.
    ///
    /// Cached queries compiled against a replaced schema are dropped.
    pub fn register_schema(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let table = schema.table().to_string();
        let previous = self.schemas.write().insert(table.clone(), Arc::clone(&schema));

        if previous.is_some() {
            let dropped = self.cache.invalidate_table(&table);
            debug!("replaced schema of {table}, dropped {dropped} cached queries");
        }
        schema
    }

    /// The schema registered for `table`.
    pub fn schema(&self, table: &str) -> Result<Arc<Schema>> {
        self.schemas
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| TermsiftError::schema(format!("unknown table '{table}'")))
    }

    /// Compile a query, reusing a cached tree when the text was seen before.
    pub fn compile(&self, table: &str, text: &str) -> Result<CompiledQuery> {
        let schema = self.schema(table)?;
        let root = self.cache.get_or_compile(&schema, text, || {
            debug!("compiling {text:?} on {table}");
            QueryParser::new(Arc::clone(&schema)).parse(text)
        })?;
        Ok(CompiledQuery::from_tree(schema, text, root))
    }

    /// Run a query, propagating every error.
    pub async fn try_query(&self, table: &str, text: &str, options: QueryOptions) -> Result<QueryPage> {
        let query = self.compile(table, text)?;
        query.evaluate(self.store.as_ref(), &self.resolve(options)).await
    }

    /// Run a query. A query that does not compile matches nothing.
    ///
    /// Syntax and schema errors in the query text are logged and answered
    /// with an empty page. Errors raised while evaluating, such as a missing
    /// parameter or an unavailable store, are returned.
    pub async fn query(&self, table: &str, text: &str, options: QueryOptions) -> Result<QueryPage> {
        let query = match self.compile(table, text) {
            Ok(query) => query,
            Err(err @ (TermsiftError::Syntax { .. } | TermsiftError::Schema(_))) => {
                warn!("query {text:?} on {table} matches nothing: {err}");
                return Ok(QueryPage::default());
            }
            Err(err) => return Err(err),
        };
        query.evaluate(self.store.as_ref(), &self.resolve(options)).await
    }

    /// Write column updates of one object.
    pub async fn write(
        &self,
        table: &str,
        key: &ObjectKey,
        updates: Vec<(String, ColumnUpdate)>,
        options: &WriteOptions,
    ) -> Result<IndexSummary> {
        let schema = self.schema(table)?;
        self.indexer.write(&schema, key, updates, options).await
    }

    /// Delete one object and its index terms.
    pub async fn delete(
        &self,
        table: &str,
        key: &ObjectKey,
        expectation: Expectation,
    ) -> Result<IndexSummary> {
        let schema = self.schema(table)?;
        self.indexer.delete(&schema, key, expectation).await
    }

    /// Query cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Fill unset options from the configuration.
    fn resolve(&self, mut options: QueryOptions) -> QueryOptions {
        options.page_size.get_or_insert(self.config.page_size);
        options
            .consistent_read
            .get_or_insert(self.config.consistent_read);
        if options.limit.is_none() {
            options.limit = self.config.default_limit;
        }
        options
    }
}
