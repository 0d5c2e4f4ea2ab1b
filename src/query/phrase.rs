//! Phrase nodes and their expansion into term lookups.
//!
//! A phrase `table.column=value` does not know its index terms at compile
//! time: the value may be a `{name}` parameter, and the column capability
//! decides how the value is normalized. The first evaluation of a phrase
//! resolves the value, asks the capability for the canonical phrase and
//! builds a subtree of [`IndexTermNode`]s chained with positional
//! intersections. The subtree is kept for the rest of the execution so the
//! leaves keep their fetch windows across rounds.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use log::debug;

use crate::capability::quote_token;
use crate::error::{Result, TermsiftError};
use crate::key::ObjectKey;
use crate::query::node::{EvalContext, QueryNode, SetOp};
use crate::query::term::IndexTermNode;
use crate::query::{EvalResult, Params};
use crate::schema::Schema;

/// A `{name}` placeholder bound at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    name: String,
}

impl ParameterNode {
    /// Create a placeholder for `name`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        ParameterNode { name: name.into() }
    }

    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look the parameter up. An unbound name is an error, never a default.
    pub fn resolve<'p>(&self, params: &'p Params) -> Result<&'p str> {
        params
            .get(&self.name)
            .map(String::as_str)
            .ok_or_else(|| TermsiftError::missing_parameter(self.name.clone()))
    }
}

/// The value side of a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhraseValue {
    /// A literal written in the query text.
    Literal(String),
    /// A parameter placeholder.
    Parameter(ParameterNode),
}

/// The subtree a phrase expanded to.
#[derive(Debug, Clone)]
enum Expansion {
    Tree(Box<QueryNode>),
    /// The phrase reduced to no tokens and matches nothing.
    Empty,
}

/// A `table.column=value` phrase.
#[derive(Debug, Clone)]
pub struct PhraseNode {
    table: String,
    column: String,
    value: PhraseValue,
    expansion: Option<Expansion>,
}

impl PhraseNode {
    /// Create a phrase node.
    pub fn new<T, C>(table: T, column: C, value: PhraseValue) -> Self
    where
        T: Into<String>,
        C: Into<String>,
    {
        PhraseNode {
            table: table.into(),
            column: column.into(),
            value,
            expansion: None,
        }
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The phrase value.
    pub fn value(&self) -> &PhraseValue {
        &self.value
    }

    /// Expand on first use, then evaluate the expansion.
    pub async fn evaluate(
        &mut self,
        ctx: &EvalContext<'_>,
        start_key: Option<&ObjectKey>,
    ) -> Result<EvalResult> {
        if self.expansion.is_none() {
            self.expansion = Some(self.expand(ctx.schema, ctx.params)?);
        }

        match &mut self.expansion {
            Some(Expansion::Tree(tree)) => tree.evaluate(ctx, start_key).await,
            _ => Ok(EvalResult::exhausted()),
        }
    }

    fn expand(&self, schema: &Schema, params: &Params) -> Result<Expansion> {
        let text = match &self.value {
            PhraseValue::Literal(text) => text.as_str(),
            PhraseValue::Parameter(parameter) => parameter.resolve(params)?,
        };

        let column = schema.indexed_column(&self.column)?;
        let Some(capability) = column.capability() else {
            return Err(TermsiftError::schema(format!(
                "column '{}.{}' is not indexed",
                self.table, self.column
            )));
        };

        let leaf = |token: &str| {
            QueryNode::Term(
                IndexTermNode::new(schema.term_key(&self.column, token))
                    .with_decoder(Arc::clone(capability)),
            )
        };

        if let Some(token) = capability.single_term(text)? {
            debug!("phrase {self} is the single term {token:?}");
            return Ok(Expansion::Tree(Box::new(leaf(&token))));
        }

        let canonical = capability.canonical_phrase(text)?;
        let expansion = match build_chain(&canonical, leaf)? {
            Some(tree) => {
                debug!("phrase {self} expanded to {tree}");
                Expansion::Tree(Box::new(tree))
            }
            None => {
                debug!("phrase {self} has no tokens");
                Expansion::Empty
            }
        };
        Ok(expansion)
    }
}

impl fmt::Display for PhraseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            PhraseValue::Literal(text) => {
                write!(f, "{}.{}={}", self.table, self.column, quote_token(text))
            }
            PhraseValue::Parameter(parameter) => {
                write!(f, "{}.{}={{{}}}", self.table, self.column, parameter.name())
            }
        }
    }
}

/// Build the positional chain for a canonical phrase.
///
/// Each real token is attached to the chain with a delta measured from the
/// first real token, since the chain keeps the first token's positions.
/// Wildcards only advance the offset. Returns `None` when the phrase holds
/// no real token.
fn build_chain<F>(canonical: &str, mut leaf: F) -> Result<Option<QueryNode>>
where
    F: FnMut(&str) -> QueryNode,
{
    let mut chain: Option<(QueryNode, u32)> = None;

    for (offset, token) in (0u32..).zip(parse_chain(canonical)?) {
        let Some(token) = token else {
            continue;
        };
        chain = Some(match chain {
            None => (leaf(&token), offset),
            Some((node, anchor)) => (
                node.merge(
                    SetOp::PositionalIntersection {
                        delta: offset - anchor,
                    },
                    leaf(&token),
                ),
                anchor,
            ),
        });
    }

    Ok(chain.map(|(node, _)| node))
}

/// Parse `token ('+' token)*` into tokens, `None` marking a wildcard.
fn parse_chain(canonical: &str) -> Result<Vec<Option<String>>> {
    let mut parser = ChainParser {
        chars: canonical.chars().peekable(),
        position: 0,
    };
    parser.parse()
}

struct ChainParser<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl ChainParser<'_> {
    fn parse(&mut self) -> Result<Vec<Option<String>>> {
        let mut tokens = Vec::new();
        if self.chars.peek().is_none() {
            return Ok(tokens);
        }

        loop {
            tokens.push(self.parse_token()?);
            match self.next() {
                None => return Ok(tokens),
                Some('+') => {}
                Some(ch) => {
                    return Err(TermsiftError::syntax(
                        format!("expected '+' in phrase, found '{ch}'"),
                        self.position - 1,
                    ));
                }
            }
        }
    }

    fn parse_token(&mut self) -> Result<Option<String>> {
        match self.next() {
            Some('"') => {}
            Some('_') => return Ok(None),
            Some(ch) => {
                return Err(TermsiftError::syntax(
                    format!("expected phrase token, found '{ch}'"),
                    self.position - 1,
                ));
            }
            None => {
                return Err(TermsiftError::syntax(
                    "expected phrase token, found end of phrase",
                    self.position,
                ));
            }
        }

        let mut token = String::new();
        loop {
            match self.next() {
                Some('"') => return Ok(Some(token)),
                Some('\\') => match self.next() {
                    Some(ch) => token.push(ch),
                    None => break,
                },
                Some(ch) => token.push(ch),
                None => break,
            }
        }
        Err(TermsiftError::syntax(
            "unterminated token in phrase",
            self.position,
        ))
    }

    fn next(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.position += 1;
        Some(ch)
    }
}
