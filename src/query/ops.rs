//! Set operations over evaluated child results.
//!
//! Each function combines the [`EvalResult`]s of a left and a right child
//! into the result of the parent node. Inputs are sorted and unique by key,
//! and so are the outputs. The combined `last_key` is the smaller of the two
//! child bounds, since the parent is only proven complete where both
//! children are.

use std::cmp::Ordering;

use crate::key::ObjectKey;
use crate::query::{EvalResult, MatchResult};

/// The smaller of two bounds, where `None` means unbounded.
pub(crate) fn min_last_key(
    left: Option<ObjectKey>,
    right: Option<ObjectKey>,
) -> Option<ObjectKey> {
    match (left, right) {
        (Some(l), Some(r)) => Some(l.min(r)),
        (Some(l), None) => Some(l),
        (None, r) => r,
    }
}

/// Number of leading matches in `matches[from..]` with a key below `target`.
///
/// Steps exponentially before binary searching, so skipping a short run
/// stays cheap even on long lists.
fn skip_below(matches: &[MatchResult], from: usize, target: &ObjectKey) -> usize {
    let rest = &matches[from..];
    let mut bound = 1;
    while bound < rest.len() && rest[bound].key < *target {
        bound *= 2;
    }
    let end = bound.min(rest.len());
    from + rest[..end].partition_point(|m| m.key < *target)
}

/// Matches of either side (`|`).
///
/// A key present on both sides keeps the left match.
pub fn union(left: EvalResult, right: EvalResult) -> EvalResult {
    let last_key = min_last_key(left.last_key, right.last_key);
    let cost = left.cost + right.cost;

    let mut matches = Vec::with_capacity(left.matches.len() + right.matches.len());
    let mut lhs = left.matches.into_iter().peekable();
    let mut rhs = right.matches.into_iter().peekable();

    loop {
        let next = match (lhs.peek(), rhs.peek()) {
            (Some(l), Some(r)) => match l.key.cmp(&r.key) {
                Ordering::Less => lhs.next(),
                Ordering::Greater => rhs.next(),
                Ordering::Equal => {
                    rhs.next();
                    lhs.next()
                }
            },
            (Some(_), None) => lhs.next(),
            (None, Some(_)) => rhs.next(),
            (None, None) => break,
        };
        matches.extend(next);
    }

    let mut result = EvalResult {
        matches,
        last_key,
        cost,
    };
    result.truncate_to_last_key();
    result
}

/// Matches of the left side that the right side does not mask (`-`).
pub fn difference(left: EvalResult, right: EvalResult) -> EvalResult {
    let last_key = min_last_key(left.last_key, right.last_key);
    let cost = left.cost + right.cost;
    let masks = &right.matches;

    let mut matches = Vec::with_capacity(left.matches.len());
    let mut cursor = 0;

    for candidate in left.matches {
        if let Some(bound) = &last_key {
            if candidate.key > *bound {
                break;
            }
        }
        cursor = skip_below(masks, cursor, &candidate.key);
        if masks.get(cursor).is_some_and(|m| m.key == candidate.key) {
            continue;
        }
        matches.push(candidate);
    }

    EvalResult {
        matches,
        last_key,
        cost,
    }
}

/// Matches present on both sides (`&`). The left match is kept.
pub fn intersection(left: EvalResult, right: EvalResult) -> EvalResult {
    skip_merge(left, right, |l, _| Some(l))
}

/// Keys present on both sides where some left position `p` has `p + delta`
/// among the right positions.
///
/// The emitted data is the filtered left positions, so a chain of positional
/// intersections keeps anchoring on the first token of a phrase.
pub fn positional_intersection(left: EvalResult, right: EvalResult, delta: u32) -> EvalResult {
    skip_merge(left, right, |l, r| {
        let right_positions = r.data.as_deref().unwrap_or_default();
        let positions: Vec<u32> = l
            .data
            .unwrap_or_default()
            .into_iter()
            .filter(|p| {
                p.checked_add(delta)
                    .is_some_and(|target| right_positions.binary_search(&target).is_ok())
            })
            .collect();

        if positions.is_empty() {
            None
        } else {
            Some(MatchResult::with_positions(l.key, positions))
        }
    })
}

/// Sorted skip-merge that hands every key present on both sides to `combine`.
fn skip_merge<F>(left: EvalResult, right: EvalResult, mut combine: F) -> EvalResult
where
    F: FnMut(MatchResult, &MatchResult) -> Option<MatchResult>,
{
    let last_key = min_last_key(left.last_key, right.last_key);
    let cost = left.cost + right.cost;
    let lhs = &left.matches;
    let rhs = &right.matches;

    let mut pairs = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < lhs.len() && j < rhs.len() {
        match lhs[i].key.cmp(&rhs[j].key) {
            Ordering::Less => i = skip_below(lhs, i, &rhs[j].key),
            Ordering::Greater => j = skip_below(rhs, j, &lhs[i].key),
            Ordering::Equal => {
                pairs.push((i, j));
                i += 1;
                j += 1;
            }
        }
    }

    let mut pairs = pairs.into_iter().peekable();
    let mut matches = Vec::with_capacity(pairs.len());
    for (i, candidate) in left.matches.into_iter().enumerate() {
        let Some(&(_, j)) = pairs.peek().filter(|(li, _)| *li == i) else {
            continue;
        };
        pairs.next();
        matches.extend(combine(candidate, &right.matches[j]));
    }

    let mut result = EvalResult {
        matches,
        last_key,
        cost,
    };
    result.truncate_to_last_key();
    result
}
