//! Integration tests for TermIndexer against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Value, json};
use termsift::prelude::*;

fn schema() -> Schema {
    Schema::builder("docs")
        .indexed("title", TextCapability::new())
        .indexed("labels", KeywordCapability::new())
        .column("version")
        .build()
        .unwrap()
}

fn set(columns: Vec<(&str, Value)>) -> Vec<(String, ColumnUpdate)> {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_string(), ColumnUpdate::Set(value)))
        .collect()
}

fn setup() -> (Arc<MemoryStore>, TermIndexer, Schema) {
    let store = Arc::new(MemoryStore::new());
    let indexer = TermIndexer::new(store.clone());
    (store, indexer, schema())
}

async fn matching(store: &Arc<MemoryStore>, query: &str) -> Result<Vec<ObjectKey>> {
    let engine = QueryEngine::new(store.clone(), EngineConfig::default())?;
    engine.register_schema(schema());
    Ok(engine.try_query("docs", query, QueryOptions::new()).await?.keys)
}

#[tokio::test]
async fn test_write_then_delete_leaves_no_postings() -> Result<()> {
    let (store, indexer, schema) = setup();

    for (key, title) in [("d1", "rust in action"), ("d2", "action comics")] {
        indexer
            .write(
                &schema,
                &ObjectKey::new(key),
                set(vec![
                    ("title", json!(title)),
                    ("labels", json!(["book", key])),
                    ("version", json!(1)),
                ]),
                &WriteOptions::default(),
            )
            .await?;
    }
    assert_eq!(store.posting_list("docs.title:action").len(), 2);
    assert_eq!(store.posting_list("docs.labels:book").len(), 2);

    let summary = indexer
        .delete(&schema, &ObjectKey::new("d1"), Expectation::None)
        .await?;
    assert_eq!(summary.removed, 5);
    assert!(store.terms_for_key(&ObjectKey::new("d1")).is_empty());
    assert_eq!(store.posting_list("docs.title:action").len(), 1);

    indexer
        .delete(&schema, &ObjectKey::new("d2"), Expectation::Exists)
        .await?;
    assert_eq!(store.posting_count(), 0);
    assert_eq!(store.object_count(), 0);

    // Deleting a missing object is a no-op.
    let summary = indexer
        .delete(&schema, &ObjectKey::new("d2"), Expectation::None)
        .await?;
    assert_eq!(summary.total(), 0);

    Ok(())
}

#[tokio::test]
async fn test_repeated_writes_issue_no_posting_mutations() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");
    let columns = || {
        set(vec![
            ("title", json!("the rust book")),
            ("labels", json!(["book"])),
        ])
    };

    let first = indexer
        .write(&schema, &key, columns(), &WriteOptions::default())
        .await?;
    assert_eq!(first.added, 4);
    let after_first = store.stats();

    let second = indexer
        .write(&schema, &key, columns(), &WriteOptions::default())
        .await?;
    assert_eq!(second.total(), 0);

    // A reindex only rewrites the positional title terms.
    let reindex = indexer
        .write(&schema, &key, Vec::new(), &WriteOptions::default().with_reindex(true))
        .await?;
    assert_eq!(reindex.added, 0);
    assert_eq!(reindex.removed, 0);
    assert_eq!(reindex.refreshed, 3);

    let stats = store.stats();
    assert_eq!(stats.posting_puts, after_first.posting_puts + 3);
    assert_eq!(stats.posting_deletes, after_first.posting_deletes);
    assert_eq!(stats.object_writes, after_first.object_writes + 2);

    Ok(())
}

#[tokio::test]
async fn test_changed_text_moves_postings() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(&schema, &key, set(vec![("title", json!("red fox"))]), &WriteOptions::default())
        .await?;
    let summary = indexer
        .write(&schema, &key, set(vec![("title", json!("fox red"))]), &WriteOptions::default())
        .await?;

    // Same words, new positions.
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.refreshed, 2);

    let summary = indexer
        .write(&schema, &key, set(vec![("title", json!("blue fox"))]), &WriteOptions::default())
        .await?;
    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.refreshed, 1);

    let expected: BTreeSet<String> = ["docs.title:blue", "docs.title:fox"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(store.terms_for_key(&key), expected);

    Ok(())
}

#[tokio::test]
async fn test_failed_expectations_write_nothing() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(
            &schema,
            &key,
            set(vec![("labels", json!("draft")), ("version", json!(1))]),
            &WriteOptions::default().with_expectation(Expectation::Absent),
        )
        .await?;
    let stats = store.stats();

    let err = indexer
        .write(
            &schema,
            &key,
            set(vec![("labels", json!("final"))]),
            &WriteOptions::default().with_expectation(Expectation::Absent),
        )
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());

    let stale = Expectation::Equals {
        attribute: "version".to_string(),
        value: json!(0),
    };
    let err = indexer
        .write(
            &schema,
            &key,
            set(vec![("labels", json!("final"))]),
            &WriteOptions::default().with_expectation(stale.clone()),
        )
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());

    let err = indexer.delete(&schema, &key, stale).await.unwrap_err();
    assert!(err.is_conditional_check_failed());

    let err = indexer
        .delete(&schema, &ObjectKey::new("missing"), Expectation::Exists)
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());

    assert_eq!(store.stats(), stats);
    assert_eq!(store.posting_list("docs.labels:draft").len(), 1);

    let current = Expectation::Equals {
        attribute: "version".to_string(),
        value: json!(1),
    };
    indexer
        .write(
            &schema,
            &key,
            set(vec![("labels", json!("final")), ("version", json!(2))]),
            &WriteOptions::default().with_expectation(current),
        )
        .await?;
    assert!(store.posting_list("docs.labels:draft").is_empty());
    assert_eq!(store.posting_list("docs.labels:final").len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_retry_after_partial_failure_converges() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(&schema, &key, set(vec![("labels", json!(["a", "b"]))]), &WriteOptions::default())
        .await?;

    store.fail_next_posting_writes(1);
    let err = indexer
        .write(&schema, &key, set(vec![("labels", json!(["b", "c", "d"]))]), &WriteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let summary = indexer
        .write(&schema, &key, set(vec![("labels", json!(["b", "c", "d"]))]), &WriteOptions::default())
        .await?;
    assert_eq!(summary.added, 2);
    assert_eq!(summary.removed, 1);

    let expected: BTreeSet<String> = ["docs.labels:b", "docs.labels:c", "docs.labels:d"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(store.terms_for_key(&key), expected);

    store.fail_next_posting_writes(1);
    assert!(indexer.delete(&schema, &key, Expectation::None).await.is_err());
    indexer.delete(&schema, &key, Expectation::None).await?;
    assert_eq!(store.posting_count(), 0);
    assert_eq!(store.object_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_column_updates() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(&schema, &key, set(vec![("labels", json!(["a"]))]), &WriteOptions::default())
        .await?;

    let summary = indexer
        .write(
            &schema,
            &key,
            vec![("labels".to_string(), ColumnUpdate::Add(json!(["a", "b"])))],
            &WriteOptions::default(),
        )
        .await?;
    assert_eq!(summary.added, 1);
    assert_eq!(store.terms_for_key(&key).len(), 2);

    let summary = indexer
        .write(
            &schema,
            &key,
            vec![("labels".to_string(), ColumnUpdate::Remove)],
            &WriteOptions::default(),
        )
        .await?;
    assert_eq!(summary.removed, 2);
    assert!(store.terms_for_key(&key).is_empty());
    assert_eq!(store.object_count(), 1);

    let err = indexer
        .write(&schema, &key, set(vec![("nope", json!(1))]), &WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TermsiftError::Schema(_)));

    Ok(())
}

#[tokio::test]
async fn test_added_text_keeps_phrases_apart() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(&schema, &key, set(vec![("title", json!("the lazy dog"))]), &WriteOptions::default())
        .await?;
    indexer
        .write(
            &schema,
            &key,
            vec![("title".to_string(), ColumnUpdate::Add(json!("big red car")))],
            &WriteOptions::default(),
        )
        .await?;

    assert!(matching(&store, r#"docs.title="the red""#).await?.is_empty());
    assert!(matching(&store, r#"docs.title="dog big""#).await?.is_empty());
    assert_eq!(matching(&store, r#"docs.title="red car""#).await?, vec![key.clone()]);
    assert_eq!(matching(&store, r#"docs.title="the lazy dog""#).await?, vec![key.clone()]);

    // Adding a word the text already has only moves positions.
    let summary = indexer
        .write(
            &schema,
            &key,
            vec![("title".to_string(), ColumnUpdate::Add(json!("the end")))],
            &WriteOptions::default(),
        )
        .await?;
    assert_eq!(summary.added, 1);
    assert!(matching(&store, r#"docs.title="car the""#).await?.is_empty());
    assert_eq!(matching(&store, r#"docs.title="the end""#).await?, vec![key]);

    Ok(())
}

#[tokio::test]
async fn test_reindex_repairs_stale_freight() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    indexer
        .write(&schema, &key, set(vec![("title", json!("the lazy dog"))]), &WriteOptions::default())
        .await?;

    // Overwrite the freight of "dog" as if it followed "the".
    let stale = TextCapability::new().compute_terms(&json!("the dog"))?;
    store
        .put_posting("docs.title:dog", &key, stale["dog"].clone())
        .await?;
    assert_eq!(matching(&store, r#"docs.title="the dog""#).await?, vec![key.clone()]);

    let summary = indexer
        .write(&schema, &key, Vec::new(), &WriteOptions::default().with_reindex(true))
        .await?;
    assert_eq!(summary.refreshed, 3);
    assert!(matching(&store, r#"docs.title="the dog""#).await?.is_empty());
    assert_eq!(matching(&store, r#"docs.title="lazy dog""#).await?, vec![key]);

    Ok(())
}

#[tokio::test]
async fn test_repeated_column_in_one_write_is_rejected() -> Result<()> {
    let (store, indexer, schema) = setup();
    let key = ObjectKey::new("d1");

    let err = indexer
        .write(
            &schema,
            &key,
            set(vec![("labels", json!("x")), ("labels", json!("y"))]),
            &WriteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TermsiftError::InvalidArgument(_)));

    let err = indexer
        .write(
            &schema,
            &key,
            vec![
                ("labels".to_string(), ColumnUpdate::Set(json!("x"))),
                ("labels".to_string(), ColumnUpdate::Remove),
            ],
            &WriteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TermsiftError::InvalidArgument(_)));

    assert_eq!(store.posting_count(), 0);
    assert_eq!(store.object_count(), 0);

    Ok(())
}
