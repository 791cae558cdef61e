//! The boolean expression tree built from leaf predicates.
//!
//! Leaves are validated at construction through [`Operator::apply`];
//! composite nodes take already-validated children and add no checks of
//! their own. The tree is an immutable value object: evaluation is a pure
//! function of `(expression, candidate row)` and the same tree can be
//! compiled to SQL by [`crate::sql_compiler`].

use serde_json::Value as JsonValue;

use crate::operator::Operator;
use crate::path::Path;
use crate::value::Value;

/// A single filter condition: path, operator, ordered values.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    path: Path,
    operator: Operator,
    values: Vec<Value>,
}

impl Predicate {
    /// Used by [`Operator::apply`] once the arity and type contracts have
    /// been checked.
    pub(crate) fn new_unchecked(path: Path, operator: Operator, values: Vec<Value>) -> Self {
        Predicate {
            path,
            operator,
            values,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Evaluates this predicate against an in-memory row, navigating nested
    /// objects along the path.
    pub fn matches(&self, row: &JsonValue) -> bool {
        self.operator.matches(lookup(row, &self.path), &self.values)
    }
}

/// Boolean composition of predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Predicate(Predicate),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn and(left: Expression, right: Expression) -> Expression {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Expression {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Expression) -> Expression {
        Expression::Not(Box::new(inner))
    }

    /// Recursive, short-circuiting evaluation: `And`/`Or` evaluate the left
    /// child first and may skip the right.
    pub fn evaluate(&self, row: &JsonValue) -> bool {
        match self {
            Expression::Predicate(p) => p.matches(row),
            Expression::And(left, right) => left.evaluate(row) && right.evaluate(row),
            Expression::Or(left, right) => left.evaluate(row) || right.evaluate(row),
            Expression::Not(inner) => !inner.evaluate(row),
        }
    }

    /// All leaf predicates in left-to-right, depth-first order. This is also
    /// the order in which their bind parameters appear in the compiled
    /// fragment.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Expression::Predicate(p) => out.push(p),
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect(out);
                right.collect(out);
            }
            Expression::Not(inner) => inner.collect(out),
        }
    }
}

impl From<Predicate> for Expression {
    fn from(predicate: Predicate) -> Self {
        Expression::Predicate(predicate)
    }
}

/// Navigates a row along the path's field names, returning the terminal
/// value if every intermediate hop is an object.
pub(crate) fn lookup<'a>(row: &'a JsonValue, path: &Path) -> Option<&'a JsonValue> {
    let mut current = row;
    for element in path.elements() {
        current = current.get(element.field_name())?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{FieldKind, PathElement};
    use crate::value::FieldType;
    use serde_json::json;

    fn pred(field: &str, operator: Operator, values: Vec<Value>) -> Expression {
        let path = Path::new(vec![PathElement::new(
            "book",
            field,
            FieldKind::Scalar(FieldType::String),
        )]);
        operator.apply(path, values).unwrap().into()
    }

    fn book() -> JsonValue {
        json!({
            "title": "Dune",
            "genre": "SciFi",
            "publisher": { "editor": { "name": "Herbert" } }
        })
    }

    #[test]
    fn test_evaluation_over_composites() {
        let expr = Expression::and(
            pred("title", Operator::Eq, vec!["Dune".into()]),
            Expression::or(
                pred("genre", Operator::Eq, vec!["SciFi".into()]),
                pred("genre", Operator::Eq, vec!["Fantasy".into()]),
            ),
        );
        assert!(expr.evaluate(&book()));
        assert!(!Expression::not(expr).evaluate(&book()));
    }

    #[test]
    fn test_nested_path_lookup() {
        let path = Path::new(vec![
            PathElement::new(
                "book",
                "publisher",
                FieldKind::Relationship {
                    target: "publisher".to_string(),
                },
            ),
            PathElement::new(
                "publisher",
                "editor",
                FieldKind::Relationship {
                    target: "editor".to_string(),
                },
            ),
            PathElement::new("editor", "name", FieldKind::Scalar(FieldType::String)),
        ]);
        let expr: Expression = Operator::Prefix
            .apply(path, vec!["Her".into()])
            .unwrap()
            .into();
        assert!(expr.evaluate(&book()));
        assert!(!expr.evaluate(&json!({ "title": "no publisher" })));
    }

    #[test]
    fn test_predicate_collection_order() {
        let expr = Expression::and(
            pred("title", Operator::Eq, vec!["Dune".into()]),
            Expression::or(
                pred("genre", Operator::Eq, vec!["SciFi".into()]),
                pred("genre", Operator::Eq, vec!["Fantasy".into()]),
            ),
        );
        let values: Vec<_> = expr
            .predicates()
            .iter()
            .flat_map(|p| p.values().iter().cloned())
            .collect();
        assert_eq!(
            values,
            vec![
                Value::from("Dune"),
                Value::from("SciFi"),
                Value::from("Fantasy")
            ]
        );
    }
}
