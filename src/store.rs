//! Store abstraction for posting lists and indexed objects.
//!
//! The engine talks to a sorted, hash+range keyed key-value store through the
//! [`IndexStore`] trait. Two kinds of data live there:
//!
//! - **Posting entries** in a single flat index table, keyed by term (hash)
//!   and object key (range), each with optional freight.
//! - **Objects**, keyed by [`ObjectKey`], whose attributes include the
//!   stored term set of every indexed column.
//!
//! Retry policy, timeouts and table provisioning belong to the store
//! implementation. The engine propagates every store error unchanged.
//!
//! # Implementations
//!
//! - [`memory::MemoryStore`] - in-memory store for tests, tools and demos

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::Freight;
use crate::error::{Result, TermsiftError};
use crate::key::ObjectKey;

pub use memory::MemoryStore;

/// A single posting entry returned by a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingItem {
    /// The object key (range component of the posting entry).
    pub key: ObjectKey,
    /// Optional freight written with the entry.
    pub freight: Option<Freight>,
}

/// A bounded range read over one term's posting list.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    /// The term (hash key) to read.
    pub term: String,
    /// Exclusive lower bound; `None` reads from the start of the list.
    pub start_after: Option<ObjectKey>,
    /// Maximum number of items to return.
    pub limit: usize,
    /// Whether to request a strongly consistent read.
    pub consistent: bool,
}

/// One page of a posting list.
#[derive(Debug, Clone, Default)]
pub struct RangePage {
    /// Items in ascending key order.
    pub items: Vec<PostingItem>,
    /// Key to resume after; `None` when the posting list is exhausted.
    pub last_key: Option<ObjectKey>,
    /// Read cost units consumed.
    pub cost: u64,
}

/// A stored attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A term set attribute. Stores never hold an empty set.
    TermSet(BTreeSet<String>),
    /// An ordinary column value.
    Value(Value),
}

/// Attribute map of an object.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// An object as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// The object key.
    pub key: ObjectKey,
    /// All stored attributes.
    pub attributes: Attributes,
}

impl StoredObject {
    /// Get a column value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.attributes.get(name) {
            Some(AttributeValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Get a stored term set.
    pub fn term_set(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        match self.attributes.get(attribute) {
            Some(AttributeValue::TermSet(terms)) => Some(terms),
            _ => None,
        }
    }
}

/// A precondition attached to an object write or delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Expectation {
    /// Write unconditionally.
    #[default]
    None,
    /// The object must not exist yet.
    Absent,
    /// The object must already exist.
    Exists,
    /// The object must exist and hold `value` in `attribute`.
    Equals {
        /// Attribute to compare.
        attribute: String,
        /// Expected value.
        value: Value,
    },
}

impl Expectation {
    /// Check this precondition against the current object, if any.
    pub fn check(&self, key: &ObjectKey, current: Option<&Attributes>) -> Result<()> {
        let holds = match (self, current) {
            (Expectation::None, _) => true,
            (Expectation::Absent, current) => current.is_none(),
            (Expectation::Exists, current) => current.is_some(),
            (Expectation::Equals { attribute, value }, Some(attributes)) => matches!(
                attributes.get(attribute),
                Some(AttributeValue::Value(stored)) if stored == value
            ),
            (Expectation::Equals { .. }, None) => false,
        };

        if holds {
            Ok(())
        } else {
            Err(TermsiftError::conditional_check_failed(format!(
                "{self:?} does not hold for object {key}"
            )))
        }
    }
}

/// An update of one object's attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectWrite {
    /// The object key.
    pub key: ObjectKey,
    /// Attributes to overwrite.
    pub put: Attributes,
    /// Attributes to extend (set union).
    pub add: Attributes,
    /// Attributes to delete.
    pub remove: Vec<String>,
    /// Precondition checked against the current object.
    pub expectation: Expectation,
}

impl ObjectWrite {
    /// Create an empty write for `key`.
    pub fn new(key: ObjectKey) -> Self {
        ObjectWrite {
            key,
            put: Attributes::new(),
            add: Attributes::new(),
            remove: Vec::new(),
            expectation: Expectation::None,
        }
    }

    /// Set the precondition.
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}

/// The value an attribute holds after `added` is merged into `current`.
///
/// Both sides are read as lists (a scalar is a one-item list, `null` is
/// empty) and items of `added` not already present are appended.
pub fn union_values(current: Option<&Value>, added: &Value) -> Value {
    let mut items = match current {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(scalar) => vec![scalar.clone()],
    };
    let more = match added {
        Value::Array(more) => more.as_slice(),
        scalar => std::slice::from_ref(scalar),
    };
    for item in more {
        if !items.contains(item) {
            items.push(item.clone());
        }
    }
    Value::Array(items)
}

/// A trait for stores that hold posting lists and indexed objects.
#[async_trait]
pub trait IndexStore: Send + Sync + Debug {
    /// Read a bounded, ascending page of one term's posting list.
    async fn range_read(&self, request: RangeRequest) -> Result<RangePage>;

    /// Write a posting entry, replacing any previous freight.
    async fn put_posting(&self, term: &str, key: &ObjectKey, freight: Option<Freight>)
    -> Result<()>;

    /// Delete a posting entry. Deleting a missing entry succeeds.
    async fn delete_posting(&self, term: &str, key: &ObjectKey) -> Result<()>;

    /// Read an object.
    async fn get_object(&self, key: &ObjectKey, consistent: bool) -> Result<Option<StoredObject>>;

    /// Apply an object write after checking its precondition.
    async fn write_object(&self, write: ObjectWrite) -> Result<()>;

    /// Delete an object after checking the precondition.
    async fn delete_object(&self, key: &ObjectKey, expectation: Expectation) -> Result<()>;

    /// Read the stored term sets of an object.
    ///
    /// Returns `None` when the object does not exist. Attributes without a
    /// stored term set are left out of the map.
    async fn get_term_sets(
        &self,
        key: &ObjectKey,
        attributes: &[String],
        consistent: bool,
    ) -> Result<Option<BTreeMap<String, BTreeSet<String>>>> {
        let Some(object) = self.get_object(key, consistent).await? else {
            return Ok(None);
        };

        Ok(Some(
            attributes
                .iter()
                .filter_map(|attr| {
                    object
                        .term_set(attr)
                        .map(|terms| (attr.clone(), terms.clone()))
                })
                .collect(),
        ))
    }
}
