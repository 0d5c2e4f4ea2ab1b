//! Text capability with word segmentation and token positions.
//!
//! Values are split on Unicode word boundaries (UAX #29) and lowercased.
//! Every distinct word becomes a term whose freight lists the positions the
//! word occupies, so phrase queries can check adjacency.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use termsift::capability::{TermCapability, TextCapability};
//!
//! let capability = TextCapability::new();
//! assert_eq!(
//!     capability.canonical_phrase("Quick _ Fox").unwrap(),
//!     "\"quick\"+_+\"fox\""
//! );
//!
//! let terms = capability.compute_terms(&json!("the quick fox")).unwrap();
//! let freight = terms["quick"].as_ref().unwrap();
//! assert_eq!(capability.decode_freight(freight).unwrap(), vec![1]);
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::capability::{TermCapability, TermMap, WILDCARD, quote_token, value_strings};
use crate::error::Result;
use crate::util::varint::{decode_positions, encode_positions};

/// Position gap inserted between the elements of an array value, so a phrase
/// never matches across two elements.
const ELEMENT_POSITION_GAP: u32 = 100;

/// A capability that indexes the words of a text value with their positions.
#[derive(Clone, Debug, Default)]
pub struct TextCapability;

impl TextCapability {
    /// Create a new text capability.
    pub fn new() -> Self {
        TextCapability
    }

    fn words(text: &str) -> impl Iterator<Item = String> + '_ {
        text.unicode_words().map(|word| word.to_lowercase())
    }

    /// Split a query phrase into words and wildcard placeholders.
    ///
    /// `None` marks a placeholder.
    fn phrase_tokens(phrase: &str) -> Vec<Option<String>> {
        let mut tokens = Vec::new();
        for chunk in phrase.split_whitespace() {
            if chunk == WILDCARD {
                tokens.push(None);
            } else {
                tokens.extend(Self::words(chunk).map(Some));
            }
        }
        tokens
    }
}

impl TermCapability for TextCapability {
    fn name(&self) -> &'static str {
        "text"
    }

    fn compute_terms(&self, value: &Value) -> Result<TermMap> {
        let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut next_position = 0u32;

        for (index, text) in value_strings(value)?.iter().enumerate() {
            if index > 0 {
                next_position += ELEMENT_POSITION_GAP;
            }
            for word in Self::words(text) {
                positions.entry(word).or_default().push(next_position);
                next_position += 1;
            }
        }

        Ok(positions
            .into_iter()
            .map(|(term, positions)| (term, Some(encode_positions(&positions))))
            .collect())
    }

    fn canonical_phrase(&self, phrase: &str) -> Result<String> {
        let tokens: Vec<String> = Self::phrase_tokens(phrase)
            .into_iter()
            .map(|token| match token {
                Some(word) => quote_token(&word),
                None => WILDCARD.to_string(),
            })
            .collect();
        Ok(tokens.join("+"))
    }

    fn single_term(&self, phrase: &str) -> Result<Option<String>> {
        let mut tokens = Self::phrase_tokens(phrase);
        if tokens.len() == 1 {
            Ok(tokens.pop().flatten())
        } else {
            Ok(None)
        }
    }

    fn decode_freight(&self, freight: &[u8]) -> Result<Vec<u32>> {
        decode_positions(freight)
    }
}
