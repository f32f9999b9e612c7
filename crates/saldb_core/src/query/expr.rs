//! Query expression trees.

use crate::index::{PATH_INDEX, TYPE_INDEX};
use crate::value::Value;
use std::fmt;

/// Comparison operator of a leaf expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal to.
    Eq,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        };
        f.write_str(op)
    }
}

/// An immutable query expression.
///
/// Leaves name an index, or a field when full scans are allowed. Build
/// trees with [`Expr::field`] and the combinators:
///
/// ```rust,ignore
/// let expr = Expr::of_type("Document")
///     .and(Expr::field("created").gt(date(2020, 6, 1)))
///     .and(Expr::field("Body.text").contains("rust"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Compare the target's value with a literal.
    Compare {
        /// Index or field name.
        target: String,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        value: Value,
    },
    /// Match objects whose text contains every token of `text`.
    Contains {
        /// Index or field name.
        target: String,
        /// Tokens to look for.
        text: String,
    },
    /// Every sub-expression matches.
    And(Vec<Expr>),
    /// At least one sub-expression matches.
    Or(Vec<Expr>),
}

impl Expr {
    /// Starts a leaf on an index or field name.
    pub fn field(target: impl Into<String>) -> Target {
        Target(target.into())
    }

    /// Matches objects of type `name`.
    pub fn of_type(name: impl Into<String>) -> Self {
        Self::field(TYPE_INDEX).eq(name.into())
    }

    /// Matches the object at traversal path `path`.
    pub fn at_path(path: impl Into<String>) -> Self {
        Self::field(PATH_INDEX).eq(path.into())
    }

    /// Combines with `other` so both must match.
    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        match self {
            Self::And(mut children) => {
                push_flat(&mut children, other, true);
                Self::And(children)
            }
            first => {
                let mut children = vec![first];
                push_flat(&mut children, other, true);
                Self::And(children)
            }
        }
    }

    /// Combines with `other` so either may match.
    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        match self {
            Self::Or(mut children) => {
                push_flat(&mut children, other, false);
                Self::Or(children)
            }
            first => {
                let mut children = vec![first];
                push_flat(&mut children, other, false);
                Self::Or(children)
            }
        }
    }

    /// Conjunction of every expression in `exprs`.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self::And(exprs.into_iter().collect())
    }

    /// Disjunction of every expression in `exprs`.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self::Or(exprs.into_iter().collect())
    }
}

fn push_flat(children: &mut Vec<Expr>, expr: Expr, conjunction: bool) {
    match (expr, conjunction) {
        (Expr::And(inner), true) | (Expr::Or(inner), false) => children.extend(inner),
        (other, _) => children.push(other),
    }
}

/// Leaf under construction; see [`Expr::field`].
#[derive(Debug, Clone)]
pub struct Target(String);

impl Target {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Expr {
        Expr::Compare {
            target: self.0,
            op,
            value: value.into(),
        }
    }

    /// Equal to `value`.
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Eq, value)
    }

    /// Less than `value`.
    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Lt, value)
    }

    /// Less than or equal to `value`.
    pub fn lte(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Lte, value)
    }

    /// Greater than `value`.
    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Gt, value)
    }

    /// Greater than or equal to `value`.
    pub fn gte(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Gte, value)
    }

    /// Contains every token of `text`.
    pub fn contains(self, text: impl Into<String>) -> Expr {
        Expr::Contains {
            target: self.0,
            text: text.into(),
        }
    }
}

/// Ordering and truncation of a query's results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Index or field whose natural order sorts the results.
    pub order_by: Option<String>,
    /// Sort descending.
    pub reverse: bool,
    /// Maximum number of ids yielded.
    pub limit: Option<usize>,
}

impl QueryOptions {
    /// Unordered, unlimited results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts by `target`.
    #[must_use]
    pub fn order_by(mut self, target: impl Into<String>) -> Self {
        self.order_by = Some(target.into());
        self
    }

    /// Sorts descending.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Yields at most `n` ids.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}
