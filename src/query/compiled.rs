//! Compiled queries and the pagination driver.

use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TermsiftError};
use crate::key::ObjectKey;
use crate::query::node::{EvalContext, QueryNode};
use crate::query::parser::QueryParser;
use crate::query::Params;
use crate::schema::Schema;
use crate::store::IndexStore;

/// Posting entries a leaf reads per round trip when nothing else is set.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Options for one query execution.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Maximum number of keys to return; `None` returns every match.
    pub limit: Option<usize>,
    /// Only return keys strictly after this one.
    pub start_key: Option<ObjectKey>,
    /// Only return keys up to and including this one.
    pub end_key: Option<ObjectKey>,
    /// Read consistency; `None` uses eventually consistent reads.
    pub consistent_read: Option<bool>,
    /// Posting entries per leaf read; `None` uses [`DEFAULT_PAGE_SIZE`].
    pub page_size: Option<usize>,
    /// Parameter values, taking precedence over values bound to the query.
    pub params: Params,
}

impl QueryOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after `start_key`.
    pub fn with_start_key(mut self, start_key: ObjectKey) -> Self {
        self.start_key = Some(start_key);
        self
    }

    /// Stop after `end_key`.
    pub fn with_end_key(mut self, end_key: ObjectKey) -> Self {
        self.end_key = Some(end_key);
        self
    }

    /// Set the read consistency.
    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Set the leaf page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Bind a parameter value.
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Matching keys in ascending order.
    pub keys: Vec<ObjectKey>,
    /// Pass as `start_key` to fetch the next page; `None` when there is none.
    pub last_key: Option<ObjectKey>,
    /// Read cost units spent over all rounds.
    pub cost: u64,
}

/// A parsed query, ready to be evaluated any number of times.
///
/// The tree is shared and never mutated; each evaluation works on its own
/// copy, so leaf fetch windows and phrase expansions never leak between
/// executions.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    schema: Arc<Schema>,
    text: String,
    root: Arc<QueryNode>,
    params: Params,
}

impl CompiledQuery {
    /// Parse `text` against `schema`.
    pub fn compile(schema: Arc<Schema>, text: &str) -> Result<Self> {
        let root = QueryParser::new(Arc::clone(&schema)).parse(text)?;
        debug!("compiled {text:?} on {} as {root}", schema.table());
        Ok(Self::from_tree(schema, text, Arc::new(root)))
    }

    /// Wrap an already compiled tree.
    pub fn from_tree<S: Into<String>>(schema: Arc<Schema>, text: S, root: Arc<QueryNode>) -> Self {
        CompiledQuery {
            schema,
            text: text.into(),
            root,
            params: Params::new(),
        }
    }

    /// Bind parameter values used by every evaluation.
    pub fn bind(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Bind one parameter value.
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The schema the query was compiled against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The compiled tree.
    pub fn root(&self) -> &QueryNode {
        &self.root
    }

    /// Parameters bound to this query.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Run the query and collect up to `options.limit` matching keys.
    ///
    /// The tree is evaluated in rounds. Each round returns the matches up to
    /// the key where every leaf is proven complete, and the next round starts
    /// right after it. Evaluation stops once the tree is exhausted, the
    /// limit is reached or the cursor passes `options.end_key`.
    pub async fn evaluate(&self, store: &dyn IndexStore, options: &QueryOptions) -> Result<QueryPage> {
        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(TermsiftError::invalid_argument("page_size must be positive"));
        }
        if options.limit == Some(0) {
            return Err(TermsiftError::invalid_argument("limit must be positive"));
        }

        let mut params = self.params.clone();
        params.extend(options.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let ctx = EvalContext {
            store,
            schema: &self.schema,
            params: &params,
            page_size,
            consistent: options.consistent_read.unwrap_or(false),
        };

        let mut root = QueryNode::clone(&self.root);
        let mut page = QueryPage::default();
        let mut cursor = options.start_key.clone();
        let mut rounds = 0usize;

        loop {
            if let (Some(cursor), Some(end_key)) = (&cursor, &options.end_key) {
                if cursor >= end_key {
                    break;
                }
            }

            let result = root.evaluate(&ctx, cursor.as_ref()).await?;
            rounds += 1;
            page.cost += result.cost;
            trace!(
                "round {rounds} after {cursor:?}: {} matches, last key {:?}",
                result.matches.len(),
                result.last_key
            );

            for m in result.matches {
                if cursor.as_ref().is_some_and(|cursor| m.key <= *cursor) {
                    continue;
                }
                if options.end_key.as_ref().is_some_and(|end_key| m.key > *end_key) {
                    return Ok(self.finish(page, rounds));
                }
                page.keys.push(m.key);
                if options.limit.is_some_and(|limit| page.keys.len() >= limit) {
                    page.last_key = page.keys.last().cloned();
                    return Ok(self.finish(page, rounds));
                }
            }

            match result.last_key {
                Some(last_key) => cursor = Some(last_key),
                None => break,
            }
        }

        Ok(self.finish(page, rounds))
    }

    fn finish(&self, page: QueryPage, rounds: usize) -> QueryPage {
        debug!(
            "query {:?} returned {} keys in {rounds} rounds, cost {}",
            self.text,
            page.keys.len(),
            page.cost
        );
        page
    }
}
