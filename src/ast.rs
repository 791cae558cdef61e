//! The raw filter AST produced by the text front end.
//!
//! Paths are still dotted strings and nothing has been checked against the
//! metadata store; [`crate::metadata::MetadataStore::resolve_filter`] turns
//! a raw tree into a validated [`crate::expression::Expression`].

use crate::operator::Operator;
use crate::value::Value;

/// Condition tree as written in the filter text.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Logical conjunction (`;` in the filter grammar).
    And(Box<FilterNode>, Box<FilterNode>),
    /// Logical disjunction (`,` in the filter grammar).
    Or(Box<FilterNode>, Box<FilterNode>),
    /// Negation; not reachable from the grammar itself, but produced when a
    /// wildcard match is negated (`!='Dune*'`).
    Not(Box<FilterNode>),
    /// Leaf comparison against a dotted field path.
    Comparison {
        path: String,
        operator: Operator,
        values: Vec<Value>,
    },
}

impl FilterNode {
    pub fn comparison(
        path: impl Into<String>,
        operator: Operator,
        values: Vec<Value>,
    ) -> FilterNode {
        FilterNode::Comparison {
            path: path.into(),
            operator,
            values,
        }
    }

    pub fn and(left: FilterNode, right: FilterNode) -> FilterNode {
        FilterNode::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: FilterNode, right: FilterNode) -> FilterNode {
        FilterNode::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: FilterNode) -> FilterNode {
        FilterNode::Not(Box::new(inner))
    }
}
