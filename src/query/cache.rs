//! Bounded cache of compiled query trees.
//!
//! Compiling a query is cheap but the same query text recurs constantly, so
//! parsed trees are kept in an LRU keyed by `(table, query text)`. Each entry
//! remembers the schema it was compiled against and is only served for that
//! same schema. Cached trees never hold parameter values or fetch state:
//! every execution evaluates its own clone.

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Result, TermsiftError};
use crate::query::node::QueryNode;
use crate::schema::Schema;

type CacheKey = (String, String);

/// Hit, miss and eviction counters of a [`QueryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to compile.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry {
    schema: Arc<Schema>,
    tree: Arc<QueryNode>,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<CacheKey, Entry>,
    stats: CacheStats,
}

/// LRU cache of compiled query trees shared by all executions.
#[derive(Debug)]
pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` trees.
    pub fn new(capacity: NonZeroUsize) -> Self {
        QueryCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Create a cache from a configured capacity, rejecting zero.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or_else(|| TermsiftError::invalid_argument("cache_capacity must be positive"))
    }

    /// Look up a tree compiled against `schema`.
    ///
    /// An entry compiled against another version of the table's schema is
    /// dropped and counts as a miss.
    pub fn get(&self, schema: &Arc<Schema>, text: &str) -> Option<Arc<QueryNode>> {
        let key = (schema.table().to_string(), text.to_string());
        let mut inner = self.inner.lock();
        let cached = inner
            .entries
            .get(&key)
            .map(|entry| Arc::ptr_eq(&entry.schema, schema).then(|| Arc::clone(&entry.tree)));
        let found = match cached {
            Some(Some(tree)) => Some(tree),
            Some(None) => {
                inner.entries.pop(&key);
                debug!("dropped cached query {text:?} compiled against a replaced schema");
                None
            }
            None => None,
        };
        match found {
            Some(_) => inner.stats.hits += 1,
            None => inner.stats.misses += 1,
        }
        found
    }

    /// Store a tree compiled against `schema`, evicting the least recently
    /// used one if full.
    pub fn insert(&self, schema: &Arc<Schema>, text: &str, tree: Arc<QueryNode>) {
        let key = (schema.table().to_string(), text.to_string());
        let entry = Entry {
            schema: Arc::clone(schema),
            tree,
        };
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
                debug!("evicted cached query {:?} on {}", evicted.1, evicted.0);
            }
        }
    }

    /// Return the tree cached for `schema`, or compile and cache it.
    ///
    /// Compile errors are returned and nothing is cached.
    pub fn get_or_compile<F>(&self, schema: &Arc<Schema>, text: &str, compile: F) -> Result<Arc<QueryNode>>
    where
        F: FnOnce() -> Result<QueryNode>,
    {
        if let Some(tree) = self.get(schema, text) {
            return Ok(tree);
        }

        let tree = Arc::new(compile()?);
        self.insert(schema, text, Arc::clone(&tree));
        Ok(tree)
    }

    /// Drop every tree compiled against `table`.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.entries.pop(key);
        }
        stale.len()
    }

    /// Drop every cached tree.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached trees.
    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::KeywordCapability;
    use crate::query::term::IndexTermNode;

    fn tree(term: &str) -> QueryNode {
        QueryNode::Term(IndexTermNode::new(term))
    }

    fn schema(table: &str) -> Arc<Schema> {
        Arc::new(
            Schema::builder(table)
                .indexed("x", KeywordCapability::new())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_get_or_compile_caches() {
        let cache = QueryCache::with_capacity(4).unwrap();
        let t = schema("t");
        let mut compiles = 0;

        for _ in 0..3 {
            let node = cache
                .get_or_compile(&t, "t.x=1", || {
                    compiles += 1;
                    Ok(tree("t.x:1"))
                })
                .unwrap();
            assert_eq!(node.to_string(), "t.x:1");
        }

        assert_eq!(compiles, 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_compile_error_not_cached() {
        let cache = QueryCache::with_capacity(4).unwrap();
        let err = cache
            .get_or_compile(&schema("t"), "bad", || Err(TermsiftError::syntax("boom", 0)))
            .unwrap_err();
        assert!(err.is_syntax());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tree_of_replaced_schema_not_served() {
        let cache = QueryCache::with_capacity(4).unwrap();
        let old = schema("t");
        let new = schema("t");

        // A compile against the old schema that finishes after the new one
        // was registered still lands in the cache.
        cache.insert(&old, "t.x=1", Arc::new(tree("old")));
        assert!(cache.get(&new, "t.x=1").is_none());
        assert!(cache.is_empty());

        let node = cache
            .get_or_compile(&new, "t.x=1", || Ok(tree("new")))
            .unwrap();
        assert_eq!(node.to_string(), "new");
        assert_eq!(cache.get(&new, "t.x=1").unwrap().to_string(), "new");
        assert!(cache.get(&old, "t.x=1").is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::with_capacity(2).unwrap();
        let t = schema("t");
        cache.insert(&t, "a", Arc::new(tree("a")));
        cache.insert(&t, "b", Arc::new(tree("b")));
        assert!(cache.get(&t, "a").is_some());

        cache.insert(&t, "c", Arc::new(tree("c")));
        assert!(cache.get(&t, "b").is_none());
        assert!(cache.get(&t, "a").is_some());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        // Replacing an entry is not an eviction.
        cache.insert(&t, "a", Arc::new(tree("a2")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_same_text_different_table() {
        let cache = QueryCache::with_capacity(4).unwrap();
        let (t, u) = (schema("t"), schema("u"));
        cache.insert(&t, "q", Arc::new(tree("t")));
        cache.insert(&u, "q", Arc::new(tree("u")));

        assert_eq!(cache.get(&t, "q").unwrap().to_string(), "t");
        assert_eq!(cache.get(&u, "q").unwrap().to_string(), "u");

        assert_eq!(cache.invalidate_table("t"), 1);
        assert!(cache.get(&t, "q").is_none());
        assert!(cache.get(&u, "q").is_some());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(QueryCache::with_capacity(0).is_err());
        assert_eq!(QueryCache::with_capacity(3).unwrap().capacity(), 3);
    }
}
