//! Ordered object keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermsiftError};

/// Separator between the hash and range parts of a compound key.
///
/// It sorts below every other character, so compound keys order exactly like
/// the `(hash, range)` pair they were built from.
const RANGE_SEPARATOR: char = '\u{0}';

/// The full key of an indexed object.
///
/// Posting entries carry the object key as their range component, so the
/// ordering of `ObjectKey` is the ordering of every posting list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a key for an object that only has a hash key.
    ///
    /// A hash containing `'\0'` reads back as a compound key.
    pub fn new<S: Into<String>>(hash: S) -> Self {
        ObjectKey(hash.into())
    }

    /// Create a key for an object addressed by a hash and a range key.
    ///
    /// The hash must not contain `'\0'`. The range may, since the key is
    /// split at the first separator.
    pub fn compound(hash: &str, range: &str) -> Result<Self> {
        if hash.contains(RANGE_SEPARATOR) {
            return Err(TermsiftError::invalid_argument(format!(
                "hash key {hash:?} contains the range separator"
            )));
        }
        Ok(ObjectKey(format!("{hash}{RANGE_SEPARATOR}{range}")))
    }

    /// The hash part of the key.
    pub fn hash_part(&self) -> &str {
        self.0
            .split_once(RANGE_SEPARATOR)
            .map_or(self.0.as_str(), |(hash, _)| hash)
    }

    /// The range part of the key, if this is a compound key.
    pub fn range_part(&self) -> Option<&str> {
        self.0.split_once(RANGE_SEPARATOR).map(|(_, range)| range)
    }

    /// The encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range_part() {
            Some(range) => write!(f, "{}/{}", self.hash_part(), range),
            None => f.write_str(&self.0),
        }
    }
}

impl From<&str> for ObjectKey {
    fn from(value: &str) -> Self {
        ObjectKey::new(value)
    }
}

impl From<String> for ObjectKey {
    fn from(value: String) -> Self {
        ObjectKey(value)
    }
}
