//! Secondary-index term maintenance.
//!
//! The [`TermIndexer`] keeps the posting lists of the index table in step
//! with the indexed columns of each object. Every object stores, per indexed
//! column, the set of term keys it last wrote (attribute `"{column}:t"`). A
//! write re-reads that set, diffs it against the terms of the new value and
//! issues only the posting puts and deletes that the difference calls for.
//!
//! All posting mutations of one write are issued concurrently and must all
//! succeed before the object itself is written. Because the diff is always
//! computed from the stored term sets, re-running a write or delete after a
//! partial failure converges to the same final state.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use termsift::capability::KeywordCapability;
//! use termsift::indexer::{ColumnUpdate, TermIndexer, WriteOptions};
//! use termsift::key::ObjectKey;
//! use termsift::schema::Schema;
//! use termsift::store::MemoryStore;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let schema = Schema::builder("t")
//!     .indexed("name", KeywordCapability::new())
//!     .build()
//!     .unwrap();
//! let indexer = TermIndexer::new(store.clone());
//!
//! let summary = indexer
//!     .write(
//!         &schema,
//!         &ObjectKey::new("k1"),
//!         vec![("name".to_string(), ColumnUpdate::Set(json!("alice")))],
//!         &WriteOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(summary.added, 1);
//! assert_eq!(store.posting_list("t.name:alice").len(), 1);
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashSet;
use futures::future::{BoxFuture, try_join_all};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{Freight, TermCapability};
use crate::error::{Result, TermsiftError};
use crate::key::ObjectKey;
use crate::schema::{Column, Schema};
use crate::store::{
    AttributeValue, Attributes, Expectation, IndexStore, ObjectWrite, StoredObject, union_values,
};

/// How a write changes one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnUpdate {
    /// Replace the value. `null` clears the column.
    Set(Value),
    /// Extend the value; index terms are only ever added.
    Add(Value),
    /// Clear the column and drop all of its terms.
    Remove,
}

/// Options for [`TermIndexer::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Re-derive the terms of every non-null indexed column from the stored
    /// object, not only of the columns being written.
    pub reindex: bool,
    /// Precondition on the object write.
    pub expectation: Expectation,
}

impl WriteOptions {
    /// Enable or disable reindexing.
    pub fn with_reindex(mut self, reindex: bool) -> Self {
        self.reindex = reindex;
        self
    }

    /// Set the precondition.
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}

/// Posting mutations issued by one write or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Posting entries written for new terms.
    pub added: usize,
    /// Posting entries deleted.
    pub removed: usize,
    /// Posting entries rewritten because their freight may have changed.
    pub refreshed: usize,
}

impl IndexSummary {
    /// Total posting mutations.
    pub fn total(&self) -> usize {
        self.added + self.removed + self.refreshed
    }
}

#[derive(Debug)]
enum PostingOp {
    Put(String, Option<Freight>),
    Delete(String),
}

/// The posting mutations and object write derived from one write call.
#[derive(Debug)]
struct WritePlan {
    postings: Vec<PostingOp>,
    object: ObjectWrite,
    summary: IndexSummary,
}

impl WritePlan {
    fn put(&mut self, term: String, freight: Option<Freight>) {
        self.postings.push(PostingOp::Put(term, freight));
    }

    fn delete(&mut self, term: String) {
        self.postings.push(PostingOp::Delete(term));
    }
}

/// Maintains index terms for writes and deletes of indexed objects.
#[derive(Debug, Clone)]
pub struct TermIndexer {
    store: Arc<dyn IndexStore>,
}

impl TermIndexer {
    /// Create an indexer over `store`.
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        TermIndexer { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Write column updates of one object and keep its index terms current.
    ///
    /// A violated `options.expectation` fails with `ConditionalCheckFailed`
    /// before anything is written.
    pub async fn write(
        &self,
        schema: &Schema,
        key: &ObjectKey,
        updates: Vec<(String, ColumnUpdate)>,
        options: &WriteOptions,
    ) -> Result<IndexSummary> {
        let mut seen = AHashSet::with_capacity(updates.len());
        for (name, _) in &updates {
            if schema.column(name).is_none() {
                return Err(TermsiftError::schema(format!(
                    "unknown column '{}.{name}'",
                    schema.table()
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(TermsiftError::invalid_argument(format!(
                    "column '{}.{name}' updated more than once",
                    schema.table()
                )));
            }
        }

        let current = self.store.get_object(key, true).await?;
        options
            .expectation
            .check(key, current.as_ref().map(|object| &object.attributes))?;

        let mut plan = WritePlan {
            postings: Vec::new(),
            object: ObjectWrite::new(key.clone()).with_expectation(options.expectation.clone()),
            summary: IndexSummary::default(),
        };

        for (name, update) in &updates {
            let Some(column) = schema.column(name) else {
                continue;
            };
            match column.capability() {
                Some(capability) => {
                    plan_indexed(&mut plan, schema, column, capability, current.as_ref(), update, true)?
                }
                None => plan_plain(&mut plan, column, update),
            }
        }

        if options.reindex {
            if let Some(object) = &current {
                for column in schema.indexed_columns() {
                    if updates.iter().any(|(name, _)| name == column.name()) {
                        continue;
                    }
                    let (Some(capability), Some(value)) = (column.capability(), object.value(column.name())) else {
                        continue;
                    };
                    if value.is_null() {
                        continue;
                    }
                    let update = ColumnUpdate::Set(value.clone());
                    plan_indexed(&mut plan, schema, column, capability, Some(object), &update, false)?;
                }
            }
        }

        let summary = plan.summary;
        self.apply_postings(key, plan.postings).await?;
        self.store.write_object(plan.object).await?;

        debug!(
            "indexed {key} in {}: +{} -{} ~{}",
            schema.table(),
            summary.added,
            summary.removed,
            summary.refreshed
        );
        Ok(summary)
    }

    /// Delete an object and every posting entry it owns.
    pub async fn delete(
        &self,
        schema: &Schema,
        key: &ObjectKey,
        expectation: Expectation,
    ) -> Result<IndexSummary> {
        let attributes: Vec<String> = schema
            .indexed_columns()
            .map(Column::term_set_attribute)
            .collect();
        let term_sets = self.store.get_term_sets(key, &attributes, true).await?;

        match &expectation {
            Expectation::Equals { .. } => {
                let current = self.store.get_object(key, true).await?;
                expectation.check(key, current.as_ref().map(|object| &object.attributes))?;
            }
            _ => {
                let present = Attributes::new();
                expectation.check(key, term_sets.as_ref().map(|_| &present))?;
            }
        }

        let postings: Vec<PostingOp> = term_sets
            .into_iter()
            .flat_map(BTreeMap::into_values)
            .flatten()
            .map(PostingOp::Delete)
            .collect();
        let summary = IndexSummary {
            removed: postings.len(),
            ..IndexSummary::default()
        };

        self.apply_postings(key, postings).await?;
        self.store.delete_object(key, expectation).await?;

        debug!("deleted {key} from {}: -{}", schema.table(), summary.removed);
        Ok(summary)
    }

    /// Issue all posting mutations concurrently and wait for every one.
    async fn apply_postings(&self, key: &ObjectKey, postings: Vec<PostingOp>) -> Result<()> {
        let pending: Vec<BoxFuture<'_, Result<()>>> = postings
            .iter()
            .map(|op| match op {
                PostingOp::Put(term, freight) => self.store.put_posting(term, key, freight.clone()),
                PostingOp::Delete(term) => self.store.delete_posting(term, key),
            })
            .collect();
        try_join_all(pending).await?;
        Ok(())
    }
}

/// Compute the namespaced terms of a column value.
fn column_terms(
    schema: &Schema,
    column: &Column,
    capability: &Arc<dyn TermCapability>,
    value: &Value,
) -> Result<BTreeMap<String, Option<Freight>>> {
    Ok(capability
        .compute_terms(value)?
        .into_iter()
        .map(|(token, freight)| (schema.term_key(column.name(), &token), freight))
        .collect())
}

/// Plan the posting and attribute changes of one indexed column.
///
/// `write_value` is false when the value only gets re-derived for a
/// reindex and the stored value must stay untouched.
fn plan_indexed(
    plan: &mut WritePlan,
    schema: &Schema,
    column: &Column,
    capability: &Arc<dyn TermCapability>,
    current: Option<&StoredObject>,
    update: &ColumnUpdate,
    write_value: bool,
) -> Result<()> {
    let attribute = column.term_set_attribute();
    let old_terms: BTreeSet<String> = current
        .and_then(|object| object.term_set(&attribute))
        .cloned()
        .unwrap_or_default();
    let old_value = current.and_then(|object| object.value(column.name()));

    match update {
        ColumnUpdate::Set(value) => {
            let new_terms = column_terms(schema, column, capability, value)?;
            // A reindex re-puts every surviving term that carries freight.
            let refresh = !write_value || old_value != Some(value);
            plan_terms(plan, &old_terms, &new_terms, refresh);
            for term in old_terms.iter().filter(|t| !new_terms.contains_key(*t)) {
                plan.delete(term.clone());
                plan.summary.removed += 1;
            }

            if write_value {
                if value.is_null() {
                    plan.object.remove.push(column.name().to_string());
                } else {
                    plan.object
                        .put
                        .insert(column.name().to_string(), AttributeValue::Value(value.clone()));
                }
            }
            if new_terms.is_empty() {
                plan.object.remove.push(attribute);
            } else {
                plan.object
                    .put
                    .insert(attribute, AttributeValue::TermSet(new_terms.into_keys().collect()));
            }
        }
        ColumnUpdate::Add(Value::Null) => {}
        ColumnUpdate::Add(value) => {
            // Terms of the merged value the store will hold.
            let merged = union_values(old_value, value);
            let new_terms = column_terms(schema, column, capability, &merged)?;
            plan_terms(plan, &old_terms, &new_terms, old_value != Some(&merged));

            plan.object
                .add
                .insert(column.name().to_string(), AttributeValue::Value(value.clone()));
            let added: BTreeSet<String> = new_terms
                .into_keys()
                .filter(|term| !old_terms.contains(term))
                .collect();
            if !added.is_empty() {
                plan.object.add.insert(attribute, AttributeValue::TermSet(added));
            }
        }
        ColumnUpdate::Remove => {
            for term in old_terms {
                plan.delete(term);
                plan.summary.removed += 1;
            }
            plan.object.remove.push(column.name().to_string());
            plan.object.remove.push(attribute);
        }
    }

    Ok(())
}

/// Put terms missing from `old_terms`, and with `refresh` also re-put the
/// surviving terms that carry freight.
fn plan_terms(
    plan: &mut WritePlan,
    old_terms: &BTreeSet<String>,
    new_terms: &BTreeMap<String, Option<Freight>>,
    refresh: bool,
) {
    for (term, freight) in new_terms {
        if !old_terms.contains(term) {
            plan.put(term.clone(), freight.clone());
            plan.summary.added += 1;
        } else if freight.is_some() && refresh {
            plan.put(term.clone(), freight.clone());
            plan.summary.refreshed += 1;
        }
    }
}

/// Plan the attribute change of a column without index terms.
fn plan_plain(plan: &mut WritePlan, column: &Column, update: &ColumnUpdate) {
    let name = column.name().to_string();
    match update {
        ColumnUpdate::Set(Value::Null) | ColumnUpdate::Remove => plan.object.remove.push(name),
        ColumnUpdate::Set(value) => {
            plan.object.put.insert(name, AttributeValue::Value(value.clone()));
        }
        ColumnUpdate::Add(value) => {
            plan.object.add.insert(name, AttributeValue::Value(value.clone()));
        }
    }
}
