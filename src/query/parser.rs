//! Query parser for turning query strings into query trees.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use crate::error::{Result, TermsiftError};
use crate::query::node::{QueryNode, SetOp};
use crate::query::phrase::{ParameterNode, PhraseNode, PhraseValue};
use crate::schema::{Schema, is_identifier_char};

/// Characters that end a bare (unquoted) value.
const BARE_VALUE_TERMINATORS: &[char] = &['(', ')', '|', '&'];

/// A query parser bound to one table schema.
///
/// Supported syntax:
/// - Phrases: `t.name=alice`, `t.bio="quick brown fox"`, `t.name={who}`
/// - Operators, loosest first: `|` (union), `-` (difference), `&` (intersection)
/// - Parentheses: `(t.a=1 | t.a=2) & t.b=3`
///
/// A bare value runs up to the next whitespace, parenthesis, `|` or `&`, so
/// it may contain `-`. Put whitespace before a `-` operator that follows a
/// bare value.
#[derive(Debug, Clone)]
pub struct QueryParser {
    schema: Arc<Schema>,
}

impl QueryParser {
    /// Create a parser for `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        QueryParser { schema }
    }

    /// The schema phrases are checked against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Parse a query string into a query tree.
    ///
    /// Every phrase must name this parser's table and one of its indexed
    /// columns.
    pub fn parse(&self, query_str: &str) -> Result<QueryNode> {
        let mut parser = QueryStringParser::new(query_str, &self.schema);
        parser.parse()
    }
}

/// Internal parser for parsing query strings.
struct QueryStringParser<'a> {
    chars: Peekable<Chars<'a>>,
    schema: &'a Schema,
    /// Characters consumed so far.
    position: usize,
    /// Open parentheses.
    depth: usize,
}

impl<'a> QueryStringParser<'a> {
    fn new(query_str: &'a str, schema: &'a Schema) -> Self {
        QueryStringParser {
            chars: query_str.chars().peekable(),
            schema,
            position: 0,
            depth: 0,
        }
    }

    fn parse(&mut self) -> Result<QueryNode> {
        self.skip_whitespace();
        if self.chars.peek().is_none() {
            return Err(self.error("empty query"));
        }
        self.parse_expression()
    }

    fn parse_expression(&mut self) -> Result<QueryNode> {
        let mut node = self.parse_term()?;

        loop {
            self.skip_whitespace();
            let op = match self.chars.peek() {
                None => break,
                Some(')') if self.depth > 0 => break,
                Some(')') => return Err(self.error("unexpected ')'")),
                Some('|') => SetOp::Union,
                Some('-') => SetOp::Difference,
                Some('&') => SetOp::Intersection,
                Some('+') => {
                    return Err(self.error("'+' is only allowed inside a phrase value"));
                }
                Some(ch) => {
                    let message = format!("expected operator, found '{ch}'");
                    return Err(self.error(message));
                }
            };
            self.next();

            let rhs = self.parse_term()?;
            node = node.merge(op, rhs);
        }

        Ok(node)
    }

    fn parse_term(&mut self) -> Result<QueryNode> {
        self.skip_whitespace();

        match self.chars.peek() {
            Some('(') => {
                self.next();
                self.depth += 1;
                let inner = self.parse_expression()?;
                self.skip_whitespace();
                if self.next() != Some(')') {
                    return Err(self.error("expected ')'"));
                }
                self.depth -= 1;
                Ok(QueryNode::Parenthetical(Box::new(inner)))
            }
            Some(_) => self.parse_phrase(),
            None => Err(self.error("expected phrase, found end of query")),
        }
    }

    fn parse_phrase(&mut self) -> Result<QueryNode> {
        let start = self.position;
        let table = self.parse_identifier("table name")?;
        self.expect('.')?;
        let column = self.parse_identifier("column name")?;
        self.skip_whitespace();
        self.expect('=')?;
        self.skip_whitespace();

        if table != self.schema.table() {
            return Err(TermsiftError::schema(format!(
                "phrase at {start} refers to table '{table}', expected '{}'",
                self.schema.table()
            )));
        }
        self.schema.indexed_column(&column)?;

        let value = match self.chars.peek() {
            Some('"') => PhraseValue::Literal(self.parse_quoted()?),
            Some('{') => PhraseValue::Parameter(self.parse_parameter()?),
            _ => PhraseValue::Literal(self.parse_bare_value()?),
        };

        Ok(QueryNode::Phrase(PhraseNode::new(table, column, value)))
    }

    fn parse_identifier(&mut self, expected: &str) -> Result<String> {
        let mut name = String::new();
        while let Some(&ch) = self.chars.peek() {
            if !is_identifier_char(ch) {
                break;
            }
            name.push(ch);
            self.next();
        }

        if name.is_empty() {
            let message = match self.chars.peek() {
                Some(ch) => format!("expected {expected}, found '{ch}'"),
                None => format!("expected {expected}, found end of query"),
            };
            Err(self.error(message))
        } else {
            Ok(name)
        }
    }

    fn parse_quoted(&mut self) -> Result<String> {
        let start = self.position;
        self.next();

        let mut value = String::new();
        while let Some(ch) = self.next() {
            match ch {
                '"' => return Ok(value),
                '\\' => match self.next() {
                    Some(escaped) => value.push(escaped),
                    None => break,
                },
                _ => value.push(ch),
            }
        }

        Err(TermsiftError::syntax("unterminated quoted value", start))
    }

    fn parse_parameter(&mut self) -> Result<ParameterNode> {
        self.next();
        let name = self.parse_identifier("parameter name")?;
        self.expect('}')?;
        Ok(ParameterNode::new(name))
    }

    fn parse_bare_value(&mut self) -> Result<String> {
        let mut value = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || BARE_VALUE_TERMINATORS.contains(&ch) {
                break;
            }
            value.push(ch);
            self.next();
        }

        if value.is_empty() {
            Err(self.error("expected value"))
        } else {
            Ok(value)
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.chars.peek() {
            Some(&ch) if ch == expected => {
                self.next();
                Ok(())
            }
            Some(&ch) => {
                let message = format!("expected '{expected}', found '{ch}'");
                Err(self.error(message))
            }
            None => {
                let message = format!("expected '{expected}', found end of query");
                Err(self.error(message))
            }
        }
    }

    fn next(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.position += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.next();
            } else {
                break;
            }
        }
    }

    fn error<S: Into<String>>(&self, message: S) -> TermsiftError {
        TermsiftError::syntax(message, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{KeywordCapability, TextCapability};

    fn parser() -> QueryParser {
        let schema = Schema::builder("a")
            .indexed("x", KeywordCapability::new())
            .indexed("bio", TextCapability::new())
            .column("plain")
            .build()
            .unwrap();
        QueryParser::new(Arc::new(schema))
    }

    fn explain(query: &str) -> String {
        parser().parse(query).unwrap().to_string()
    }

    #[test]
    fn test_parse_single_phrase() {
        let node = parser().parse("a.x=1").unwrap();
        match node {
            QueryNode::Phrase(phrase) => {
                assert_eq!(phrase.table(), "a");
                assert_eq!(phrase.column(), "x");
                assert_eq!(phrase.value(), &PhraseValue::Literal("1".to_string()));
            }
            other => panic!("expected phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_union_is_root() {
        let node = parser().parse("a.x=1 | a.x=2 & a.x=3").unwrap();
        let root = node.as_op().unwrap();
        assert_eq!(root.op(), SetOp::Union);
        assert_eq!(
            node.to_string(),
            r#"(a.x="1" | (a.x="2" & a.x="3"))"#
        );
    }

    #[test]
    fn test_parenthetical_overrides_precedence() {
        let node = parser().parse("(a.x=1 | a.x=2) & a.x=3").unwrap();
        let root = node.as_op().unwrap();
        assert_eq!(root.op(), SetOp::Intersection);
        assert!(matches!(root.left(), QueryNode::Parenthetical(_)));
        assert_eq!(
            node.to_string(),
            r#"((a.x="1" | a.x="2") & a.x="3")"#
        );
    }

    #[test]
    fn test_difference_binds_between() {
        assert_eq!(
            explain("a.x=1 - a.x=2 & a.x=3 | a.x=4"),
            r#"((a.x="1" - (a.x="2" & a.x="3")) | a.x="4")"#
        );
        assert_eq!(
            explain("a.x=1 - a.x=2 - a.x=3"),
            r#"((a.x="1" - a.x="2") - a.x="3")"#
        );
    }

    #[test]
    fn test_values() {
        assert_eq!(
            explain(r#"a.bio="quick \"brown\" fox""#),
            r#"a.bio="quick \"brown\" fox""#
        );
        assert_eq!(explain("a.x={who}"), "a.x={who}");
        assert_eq!(explain("a.x = spaced"), r#"a.x="spaced""#);
        assert_eq!(explain("a.x=well-known"), r#"a.x="well-known""#);
        assert_eq!(explain("(a.x=1)"), r#"a.x="1""#);
        assert_eq!(
            explain("a.x=1|a.x=2&a.x=3"),
            r#"(a.x="1" | (a.x="2" & a.x="3"))"#
        );
    }

    #[test]
    fn test_syntax_errors() {
        let parser = parser();
        for query in [
            "",
            "   ",
            "a.x",
            "a.x=",
            "a.x=1 |",
            "a.x=1 a.x=2",
            "(a.x=1",
            "a.x=1)",
            "a.x=\"open",
            "a.x={who",
            "a.x={}",
            "a.x=1 + a.x=2",
            ".x=1",
        ] {
            let err = parser.parse(query).unwrap_err();
            assert!(err.is_syntax(), "{query:?} gave {err}");
        }
    }

    #[test]
    fn test_syntax_error_position() {
        match parser().parse("a.x=1 ? a.x=2").unwrap_err() {
            TermsiftError::Syntax { position, .. } => assert_eq!(position, 6),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_schema_errors() {
        let parser = parser();
        for query in ["b.x=1", "a.missing=1", "a.plain=1", "a.x=1 | a.plain=2"] {
            let err = parser.parse(query).unwrap_err();
            assert!(matches!(err, TermsiftError::Schema(_)), "{query:?} gave {err}");
        }
    }
}
