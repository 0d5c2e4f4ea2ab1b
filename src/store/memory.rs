//! In-memory store implementation for testing and tooling.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::capability::Freight;
use crate::error::{Result, TermsiftError};
use crate::key::ObjectKey;
use crate::store::{
    AttributeValue, Attributes, Expectation, IndexStore, ObjectWrite, PostingItem, RangePage,
    RangeRequest, StoredObject, union_values,
};

/// Mutation and read counters kept by [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful posting writes.
    pub posting_puts: u64,
    /// Successful posting deletes.
    pub posting_deletes: u64,
    /// Successful object writes.
    pub object_writes: u64,
    /// Successful object deletes.
    pub object_deletes: u64,
    /// Range reads served.
    pub range_reads: u64,
}

#[derive(Debug, Default)]
struct Faults {
    /// Number of upcoming posting mutations to fail.
    posting_write_failures: usize,
    /// Fail every call while set.
    unavailable: bool,
}

type PostingTable = BTreeMap<String, BTreeMap<ObjectKey, Option<Freight>>>;

/// An in-memory store.
///
/// Posting lists and objects live in ordered maps, so range reads behave
/// like a sorted key-value store. Reads are always consistent; the
/// `consistent` flag only affects cost accounting.
///
/// Fault injection hooks make it possible to exercise the retry contract of
/// the term indexer.
#[derive(Debug, Default)]
pub struct MemoryStore {
    postings: RwLock<PostingTable>,
    objects: RwLock<BTreeMap<ObjectKey, Attributes>>,
    stats: Mutex<StoreStats>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> StoreStats {
        *self.stats.lock()
    }

    /// Total number of posting entries across all terms.
    pub fn posting_count(&self) -> usize {
        self.postings.read().values().map(|list| list.len()).sum()
    }

    /// All terms whose posting list references `key`.
    pub fn terms_for_key(&self, key: &ObjectKey) -> BTreeSet<String> {
        self.postings
            .read()
            .iter()
            .filter(|(_, list)| list.contains_key(key))
            .map(|(term, _)| term.clone())
            .collect()
    }

    /// The full posting list of a term.
    pub fn posting_list(&self, term: &str) -> Vec<PostingItem> {
        self.postings
            .read()
            .get(term)
            .map(|list| {
                list.iter()
                    .map(|(key, freight)| PostingItem {
                        key: key.clone(),
                        freight: freight.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Fail the next `count` posting writes or deletes.
    pub fn fail_next_posting_writes(&self, count: usize) {
        self.faults.lock().posting_write_failures = count;
    }

    /// Make every call fail (or succeed again) with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.lock().unavailable {
            Err(TermsiftError::store_unavailable("memory store is offline"))
        } else {
            Ok(())
        }
    }

    fn check_posting_fault(&self) -> Result<()> {
        self.check_available()?;
        let mut faults = self.faults.lock();
        if faults.posting_write_failures > 0 {
            faults.posting_write_failures -= 1;
            return Err(TermsiftError::store_unavailable(
                "injected posting write failure",
            ));
        }
        Ok(())
    }
}

/// Merge `added` into an existing attribute with set-union semantics.
fn union_attribute(existing: Option<AttributeValue>, added: AttributeValue) -> AttributeValue {
    match (existing, added) {
        (Some(AttributeValue::TermSet(mut terms)), AttributeValue::TermSet(more)) => {
            terms.extend(more);
            AttributeValue::TermSet(terms)
        }
        (Some(AttributeValue::Value(current)), AttributeValue::Value(more)) => {
            AttributeValue::Value(union_values(Some(&current), &more))
        }
        (_, AttributeValue::Value(more)) => AttributeValue::Value(union_values(None, &more)),
        (_, added) => added,
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn range_read(&self, request: RangeRequest) -> Result<RangePage> {
        self.check_available()?;
        if request.limit == 0 {
            return Err(TermsiftError::invalid_argument("range read limit must be positive"));
        }

        let postings = self.postings.read();
        let lower = match &request.start_after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut items = Vec::with_capacity(request.limit.min(64));
        let mut more = false;
        if let Some(list) = postings.get(&request.term) {
            for (key, freight) in list.range((lower, Bound::Unbounded)) {
                if items.len() == request.limit {
                    more = true;
                    break;
                }
                items.push(PostingItem {
                    key: key.clone(),
                    freight: freight.clone(),
                });
            }
        }
        drop(postings);

        let last_key = if more {
            items.last().map(|item| item.key.clone())
        } else {
            None
        };

        self.stats.lock().range_reads += 1;
        Ok(RangePage {
            items,
            last_key,
            cost: if request.consistent { 2 } else { 1 },
        })
    }

    async fn put_posting(
        &self,
        term: &str,
        key: &ObjectKey,
        freight: Option<Freight>,
    ) -> Result<()> {
        self.check_posting_fault()?;
        self.postings
            .write()
            .entry(term.to_string())
            .or_default()
            .insert(key.clone(), freight);
        self.stats.lock().posting_puts += 1;
        Ok(())
    }

    async fn delete_posting(&self, term: &str, key: &ObjectKey) -> Result<()> {
        self.check_posting_fault()?;
        let mut postings = self.postings.write();
        if let Some(list) = postings.get_mut(term) {
            list.remove(key);
            if list.is_empty() {
                postings.remove(term);
            }
        }
        drop(postings);
        self.stats.lock().posting_deletes += 1;
        Ok(())
    }

    async fn get_object(&self, key: &ObjectKey, _consistent: bool) -> Result<Option<StoredObject>> {
        self.check_available()?;
        Ok(self.objects.read().get(key).map(|attributes| StoredObject {
            key: key.clone(),
            attributes: attributes.clone(),
        }))
    }

    async fn write_object(&self, write: ObjectWrite) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.write();
        write.expectation.check(&write.key, objects.get(&write.key))?;

        let attributes = objects.entry(write.key).or_default();
        for name in write.remove {
            attributes.remove(&name);
        }
        for (name, value) in write.put {
            attributes.insert(name, value);
        }
        for (name, value) in write.add {
            let merged = union_attribute(attributes.remove(&name), value);
            attributes.insert(name, merged);
        }
        attributes.retain(|_, value| !matches!(value, AttributeValue::TermSet(terms) if terms.is_empty()));
        drop(objects);

        self.stats.lock().object_writes += 1;
        Ok(())
    }

    async fn delete_object(&self, key: &ObjectKey, expectation: Expectation) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.write();
        expectation.check(key, objects.get(key))?;
        objects.remove(key);
        drop(objects);

        self.stats.lock().object_deletes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(term: &str, start_after: Option<&str>, limit: usize) -> RangeRequest {
        RangeRequest {
            term: term.to_string(),
            start_after: start_after.map(ObjectKey::new),
            limit,
            consistent: false,
        }
    }

    #[tokio::test]
    async fn test_range_read_pages() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store
                .put_posting("t.x:1", &ObjectKey::new(key), None)
                .await
                .unwrap();
        }

        let page = store.range_read(request("t.x:1", None, 2)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.last_key, Some(ObjectKey::new("b")));
        assert_eq!(page.cost, 1);

        let page = store
            .range_read(request("t.x:1", Some("b"), 3))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].key, ObjectKey::new("c"));
        assert_eq!(page.last_key, None);

        let page = store
            .range_read(request("missing", None, 10))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.last_key.is_none());
    }

    #[tokio::test]
    async fn test_consistent_read_cost() {
        let store = MemoryStore::new();
        let mut req = request("t.x:1", None, 10);
        req.consistent = true;
        assert_eq!(store.range_read(req).await.unwrap().cost, 2);
        assert!(store.range_read(request("t.x:1", None, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_posting() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("a");
        store
            .put_posting("t.x:1", &key, Some(vec![1]))
            .await
            .unwrap();
        assert_eq!(store.posting_count(), 1);
        assert_eq!(store.terms_for_key(&key).len(), 1);

        store.delete_posting("t.x:1", &key).await.unwrap();
        store.delete_posting("t.x:1", &key).await.unwrap();
        assert_eq!(store.posting_count(), 0);
        assert_eq!(store.stats().posting_deletes, 2);
    }

    #[tokio::test]
    async fn test_write_object_with_add_and_remove() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("a");

        let mut write = ObjectWrite::new(key.clone()).with_expectation(Expectation::Absent);
        write
            .put
            .insert("tags".to_string(), AttributeValue::Value(json!(["red"])));
        write.put.insert(
            "tags:t".to_string(),
            AttributeValue::TermSet(["red".to_string()].into()),
        );
        store.write_object(write).await.unwrap();

        let mut write = ObjectWrite::new(key.clone());
        write
            .add
            .insert("tags".to_string(), AttributeValue::Value(json!("blue")));
        write.add.insert(
            "tags:t".to_string(),
            AttributeValue::TermSet(["blue".to_string()].into()),
        );
        store.write_object(write).await.unwrap();

        let object = store.get_object(&key, true).await.unwrap().unwrap();
        assert_eq!(object.value("tags"), Some(&json!(["red", "blue"])));
        assert_eq!(object.term_set("tags:t").unwrap().len(), 2);

        let mut write = ObjectWrite::new(key.clone());
        write.remove.push("tags:t".to_string());
        store.write_object(write).await.unwrap();
        let sets = store
            .get_term_sets(&key, &["tags:t".to_string()], true)
            .await
            .unwrap()
            .unwrap();
        assert!(sets.is_empty());
    }

    #[tokio::test]
    async fn test_conditional_write_fails() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("a");
        store
            .write_object(ObjectWrite::new(key.clone()).with_expectation(Expectation::Absent))
            .await
            .unwrap();

        let err = store
            .write_object(ObjectWrite::new(key.clone()).with_expectation(Expectation::Absent))
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());

        let err = store
            .delete_object(&ObjectKey::new("missing"), Expectation::Exists)
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("a");
        store.fail_next_posting_writes(1);
        let err = store.put_posting("t", &key, None).await.unwrap_err();
        assert!(err.is_retryable());
        store.put_posting("t", &key, None).await.unwrap();

        store.set_unavailable(true);
        assert!(store.get_object(&key, false).await.is_err());
        store.set_unavailable(false);
        assert!(store.get_object(&key, false).await.unwrap().is_none());
    }
}
