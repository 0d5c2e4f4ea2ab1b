//! The compiled query tree.

use std::fmt;

use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;
use crate::key::ObjectKey;
use crate::query::phrase::PhraseNode;
use crate::query::term::IndexTermNode;
use crate::query::{EvalResult, Params, ops};
use crate::schema::Schema;
use crate::store::IndexStore;

/// Everything a node needs to evaluate one round.
pub struct EvalContext<'a> {
    /// The store holding the posting lists.
    pub store: &'a dyn IndexStore,
    /// Schema of the queried table.
    pub schema: &'a Schema,
    /// Values for `{name}` parameters.
    pub params: &'a Params,
    /// Posting entries each leaf reads per store round trip.
    pub page_size: usize,
    /// Whether leaves request strongly consistent reads.
    pub consistent: bool,
}

/// A binary set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// `|`
    Union,
    /// `-`
    Difference,
    /// `&`
    Intersection,
    /// Phrase proximity: right positions must sit `delta` after left ones.
    PositionalIntersection {
        /// Position offset from the left token to the right token.
        delta: u32,
    },
}

impl SetOp {
    /// Binding strength used while building the tree. Higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            SetOp::Union => 0,
            SetOp::Difference => 1,
            SetOp::Intersection => 2,
            SetOp::PositionalIntersection { .. } => 3,
        }
    }

    /// Combine two evaluated children.
    pub fn apply(&self, left: EvalResult, right: EvalResult) -> EvalResult {
        match self {
            SetOp::Union => ops::union(left, right),
            SetOp::Difference => ops::difference(left, right),
            SetOp::Intersection => ops::intersection(left, right),
            SetOp::PositionalIntersection { delta } => {
                ops::positional_intersection(left, right, *delta)
            }
        }
    }
}

impl fmt::Display for SetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOp::Union => f.write_str("|"),
            SetOp::Difference => f.write_str("-"),
            SetOp::Intersection => f.write_str("&"),
            SetOp::PositionalIntersection { delta } => write!(f, "+{delta}"),
        }
    }
}

/// An internal node combining two subtrees.
#[derive(Debug, Clone)]
pub struct OpNode {
    op: SetOp,
    left: Box<QueryNode>,
    right: Box<QueryNode>,
}

impl OpNode {
    /// Create an operator node.
    pub fn new(op: SetOp, left: QueryNode, right: QueryNode) -> Self {
        OpNode {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The operation.
    pub fn op(&self) -> SetOp {
        self.op
    }

    /// The left subtree.
    pub fn left(&self) -> &QueryNode {
        &self.left
    }

    /// The right subtree.
    pub fn right(&self) -> &QueryNode {
        &self.right
    }

    async fn evaluate(
        &mut self,
        ctx: &EvalContext<'_>,
        start_key: Option<&ObjectKey>,
    ) -> Result<EvalResult> {
        let (left, right) = futures::try_join!(
            self.left.evaluate(ctx, start_key),
            self.right.evaluate(ctx, start_key)
        )?;
        Ok(self.op.apply(left, right))
    }
}

/// A node of the query tree.
#[derive(Debug, Clone)]
pub enum QueryNode {
    /// Reads one term's posting list.
    Term(IndexTermNode),
    /// `table.column=value`, expanded into terms when first evaluated.
    Phrase(PhraseNode),
    /// A parenthesized subexpression. Never rebalanced by [`merge`](Self::merge).
    Parenthetical(Box<QueryNode>),
    /// A set operation.
    Op(OpNode),
}

impl QueryNode {
    /// Binding strength of this node while building the tree.
    ///
    /// Leaves and parentheticals are atomic and report the maximum.
    pub fn precedence(&self) -> u8 {
        match self {
            QueryNode::Op(node) => node.op.precedence(),
            _ => u8::MAX,
        }
    }

    /// Attach `rhs` with `op`, keeping looser operators nearer the root.
    ///
    /// When this node binds looser than `op`, `rhs` is merged into this
    /// node's right subtree. Otherwise a new `op` node becomes the root with
    /// this node as its left child, so operators of equal precedence group
    /// from the left.
    pub fn merge(self, op: SetOp, rhs: QueryNode) -> QueryNode {
        match self {
            QueryNode::Op(mut node) if node.op.precedence() < op.precedence() => {
                let right = std::mem::replace(&mut *node.right, QueryNode::empty());
                *node.right = right.merge(op, rhs);
                QueryNode::Op(node)
            }
            lhs => QueryNode::Op(OpNode::new(op, lhs, rhs)),
        }
    }

    /// The operator node, if this is one.
    pub fn as_op(&self) -> Option<&OpNode> {
        match self {
            QueryNode::Op(node) => Some(node),
            _ => None,
        }
    }

    /// Evaluate one round starting just after `start_key`.
    ///
    /// Both children of an operator are evaluated concurrently.
    pub fn evaluate<'a>(
        &'a mut self,
        ctx: &'a EvalContext<'a>,
        start_key: Option<&'a ObjectKey>,
    ) -> BoxFuture<'a, Result<EvalResult>> {
        async move {
            match self {
                QueryNode::Term(term) => term.evaluate(ctx, start_key).await,
                QueryNode::Phrase(phrase) => phrase.evaluate(ctx, start_key).await,
                QueryNode::Parenthetical(inner) => inner.evaluate(ctx, start_key).await,
                QueryNode::Op(node) => node.evaluate(ctx, start_key).await,
            }
        }
        .boxed()
    }

    /// Placeholder used while a subtree is moved out during [`merge`](Self::merge).
    fn empty() -> QueryNode {
        QueryNode::Term(IndexTermNode::new(String::new()))
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term(term) => write!(f, "{term}"),
            QueryNode::Phrase(phrase) => write!(f, "{phrase}"),
            QueryNode::Parenthetical(inner) => write!(f, "{inner}"),
            QueryNode::Op(node) => write!(f, "({} {} {})", node.left, node.op, node.right),
        }
    }
}
