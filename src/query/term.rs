//! Leaf node reading one term's posting list.

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::capability::TermCapability;
use crate::error::Result;
use crate::key::ObjectKey;
use crate::query::node::EvalContext;
use crate::query::{EvalResult, MatchResult};
use crate::store::{PostingItem, RangeRequest};

/// A node that matches every object whose posting list contains a term.
///
/// Like a term query over an inverted index, the term is used verbatim and
/// is expected to be already normalized and namespaced.
#[derive(Debug, Clone)]
pub struct IndexTermNode {
    /// The stored term key.
    term: String,
    /// Decodes freight into positions; `None` leaves freight undecoded.
    decoder: Option<Arc<dyn TermCapability>>,
    /// The page fetched by the previous round, if any.
    window: Option<FetchWindow>,
}

/// One fetched page of a posting list.
#[derive(Debug, Clone)]
struct FetchWindow {
    start_after: Option<ObjectKey>,
    matches: Vec<MatchResult>,
    last_key: Option<ObjectKey>,
}

impl FetchWindow {
    /// Whether a read starting after `start` can be answered from this page.
    fn covers(&self, start: Option<&ObjectKey>) -> bool {
        let from_window_start = match (&self.start_after, start) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(window_start), Some(start)) => start >= window_start,
        };
        let before_window_end = match (&self.last_key, start) {
            (None, _) | (_, None) => true,
            (Some(last_key), Some(start)) => start < last_key,
        };
        from_window_start && before_window_end
    }

    fn serve(&self, start: Option<&ObjectKey>) -> EvalResult {
        let from = start.map_or(0, |start| self.matches.partition_point(|m| m.key <= *start));
        EvalResult {
            matches: self.matches[from..].to_vec(),
            last_key: self.last_key.clone(),
            cost: 0,
        }
    }
}

impl IndexTermNode {
    /// Create a node for a stored term key.
    pub fn new<S: Into<String>>(term: S) -> Self {
        IndexTermNode {
            term: term.into(),
            decoder: None,
            window: None,
        }
    }

    /// Decode freight with `capability`.
    pub fn with_decoder(mut self, capability: Arc<dyn TermCapability>) -> Self {
        self.decoder = Some(capability);
        self
    }

    /// The stored term key.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Read the next page after `start_key`.
    ///
    /// A start key inside the previously fetched page is answered from that
    /// page at zero cost.
    pub async fn evaluate(
        &mut self,
        ctx: &EvalContext<'_>,
        start_key: Option<&ObjectKey>,
    ) -> Result<EvalResult> {
        if let Some(window) = &self.window {
            if window.covers(start_key) {
                trace!("term {} served from memo", self.term);
                return Ok(window.serve(start_key));
            }
        }

        let page = ctx
            .store
            .range_read(RangeRequest {
                term: self.term.clone(),
                start_after: start_key.cloned(),
                limit: ctx.page_size,
                consistent: ctx.consistent,
            })
            .await?;
        trace!(
            "term {} read {} postings after {:?}",
            self.term,
            page.items.len(),
            start_key
        );

        let matches = page
            .items
            .into_iter()
            .map(|item| self.decode(item))
            .collect::<Result<Vec<_>>>()?;

        let result = EvalResult {
            matches: matches.clone(),
            last_key: page.last_key.clone(),
            cost: page.cost,
        };
        self.window = Some(FetchWindow {
            start_after: start_key.cloned(),
            matches,
            last_key: page.last_key,
        });

        Ok(result)
    }

    fn decode(&self, item: PostingItem) -> Result<MatchResult> {
        match (&self.decoder, item.freight) {
            (Some(decoder), Some(freight)) => Ok(MatchResult::with_positions(
                item.key,
                decoder.decode_freight(&freight)?,
            )),
            _ => Ok(MatchResult::new(item.key)),
        }
    }
}

impl fmt::Display for IndexTermNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.term)
    }
}
