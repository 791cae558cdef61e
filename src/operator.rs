//! The operator catalog.
//!
//! Every comparison/match operator the filter model supports, with its
//! argument-count contract, its value-kind contract, and its in-memory
//! evaluation function. The in-memory semantics are the reference semantics:
//! the SQL compilation in [`crate::sql_compiler`] must match them exactly
//! (`Prefix` is case-sensitive `starts_with`, `Postfix` is `ends_with`,
//! `Infix` is substring containment).

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::{QueryError, Result};
use crate::expression::Predicate;
use crate::path::Path;
use crate::value::{FieldType, Value};

/// Constraint on the kind of values an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Any scalar value.
    Any,
    /// Values with a total order (strings, numbers, dates); excludes bools.
    Comparable,
    /// String values only.
    StringOnly,
    /// The operator takes no values at all.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Prefix,
    Postfix,
    Infix,
    IsNull,
    NotNull,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::In,
        Operator::NotIn,
        Operator::Prefix,
        Operator::Postfix,
        Operator::Infix,
        Operator::IsNull,
        Operator::NotNull,
    ];

    /// The filter-grammar symbol for this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "=lt=",
            Operator::Le => "=le=",
            Operator::Gt => "=gt=",
            Operator::Ge => "=ge=",
            Operator::In => "=in=",
            Operator::NotIn => "=out=",
            Operator::Prefix => "=prefix=",
            Operator::Postfix => "=postfix=",
            Operator::Infix => "=infix=",
            Operator::IsNull => "=isnull=",
            Operator::NotNull => "=notnull=",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "equals",
            Operator::Ne => "not equals",
            Operator::Lt => "less than",
            Operator::Le => "less than or equal",
            Operator::Gt => "greater than",
            Operator::Ge => "greater than or equal",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Prefix => "prefix match",
            Operator::Postfix => "postfix match",
            Operator::Infix => "infix match",
            Operator::IsNull => "is null",
            Operator::NotNull => "is not null",
        }
    }

    /// Minimum and maximum number of values; `None` means unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Operator::IsNull | Operator::NotNull => (0, Some(0)),
            Operator::In | Operator::NotIn => (1, None),
            _ => (1, Some(1)),
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            Operator::Eq | Operator::Ne | Operator::In | Operator::NotIn => ValueKind::Any,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => ValueKind::Comparable,
            Operator::Prefix | Operator::Postfix | Operator::Infix => ValueKind::StringOnly,
            Operator::IsNull | Operator::NotNull => ValueKind::None,
        }
    }

    /// Whether this operator can be applied to a field of the declared type.
    pub fn supports_field_type(&self, field_type: FieldType) -> bool {
        match self.value_kind() {
            ValueKind::StringOnly => field_type == FieldType::String,
            ValueKind::Comparable => field_type.is_orderable(),
            ValueKind::Any | ValueKind::None => true,
        }
    }

    /// Constructs a validated leaf predicate.
    ///
    /// Checks, in order: value count against the arity contract, value kinds
    /// against the operator contract, operator applicability to the declared
    /// type of the path's terminal field, and value compatibility with that
    /// type.
    pub fn apply(self, path: Path, values: Vec<Value>) -> Result<Predicate> {
        let (min, max) = self.arity();
        let actual = values.len();
        if actual < min || max.is_some_and(|max| actual > max) {
            let expected = match (min, max) {
                (min, Some(max)) if min == max && min == 1 => "exactly 1 value".to_string(),
                (min, Some(max)) if min == max => format!("exactly {} values", min),
                (min, None) => format!("at least {} value(s)", min),
                (min, Some(max)) => format!("between {} and {} values", min, max),
            };
            return Err(QueryError::InvalidValueCount {
                operator: self.name(),
                expected,
                actual,
            });
        }

        match self.value_kind() {
            ValueKind::StringOnly => {
                if let Some(bad) = values.iter().find(|v| v.as_str().is_none()) {
                    return Err(QueryError::InvalidValueType {
                        operator: self.name(),
                        detail: format!("expected a string, got {}", bad.kind_name()),
                    });
                }
            }
            ValueKind::Comparable => {
                if let Some(bad) = values.iter().find(|v| matches!(v, Value::Bool(_))) {
                    return Err(QueryError::InvalidValueType {
                        operator: self.name(),
                        detail: format!("expected an orderable value, got {}", bad.kind_name()),
                    });
                }
            }
            ValueKind::Any | ValueKind::None => {}
        }

        let field_type = path.terminal_type().ok_or_else(|| {
            QueryError::invalid_path(path.dotted(), "path must end in a scalar attribute")
        })?;
        if !self.supports_field_type(field_type) {
            return Err(QueryError::invalid_operation(format!(
                "operator {} is not supported for {} field '{}'",
                self.name(),
                field_type,
                path.dotted(),
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.fits(field_type)) {
            return Err(QueryError::InvalidValueType {
                operator: self.name(),
                detail: format!(
                    "{} value is incompatible with {} field '{}'",
                    bad.kind_name(),
                    field_type,
                    path.dotted(),
                ),
            });
        }

        Ok(Predicate::new_unchecked(path, self, values))
    }

    /// In-memory evaluation against a candidate field value.
    ///
    /// `field` is `None` when the row has no such field; JSON null and a
    /// missing field behave identically (SQL three-valued logic collapsed to
    /// false for everything but the null checks).
    pub fn matches(&self, field: Option<&JsonValue>, values: &[Value]) -> bool {
        let field = match field {
            Some(JsonValue::Null) | None => {
                return matches!(self, Operator::IsNull);
            }
            Some(v) => v,
        };

        match self {
            Operator::IsNull => false,
            Operator::NotNull => true,
            Operator::Eq => values.first().is_some_and(|v| json_eq(field, v)),
            Operator::Ne => values.first().is_some_and(|v| !json_eq(field, v)),
            Operator::In => values.iter().any(|v| json_eq(field, v)),
            Operator::NotIn => !values.iter().any(|v| json_eq(field, v)),
            Operator::Lt => json_cmp(field, values) == Some(Ordering::Less),
            Operator::Le => {
                matches!(json_cmp(field, values), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::Gt => json_cmp(field, values) == Some(Ordering::Greater),
            Operator::Ge => matches!(
                json_cmp(field, values),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Prefix => string_match(field, values, |s, v| s.starts_with(v)),
            Operator::Postfix => string_match(field, values, |s, v| s.ends_with(v)),
            Operator::Infix => string_match(field, values, |s, v| s.contains(v)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn string_match(field: &JsonValue, values: &[Value], test: fn(&str, &str) -> bool) -> bool {
    match (field.as_str(), values.first().and_then(Value::as_str)) {
        (Some(field), Some(value)) => test(field, value),
        _ => false,
    }
}

fn json_eq(field: &JsonValue, value: &Value) -> bool {
    match (field, value) {
        (JsonValue::String(f), Value::String(v)) => f == v,
        (JsonValue::Number(f), Value::Int(v)) => match f.as_i64() {
            Some(f) => f == *v,
            None => f.as_f64() == Some(*v as f64),
        },
        (JsonValue::Number(f), Value::Float(v)) => f.as_f64() == Some(*v),
        (JsonValue::Bool(f), Value::Bool(v)) => f == v,
        _ => false,
    }
}

fn json_cmp(field: &JsonValue, values: &[Value]) -> Option<Ordering> {
    let value = values.first()?;
    match (field, value) {
        (JsonValue::String(f), Value::String(v)) => Some(f.as_str().cmp(v.as_str())),
        (JsonValue::Number(f), Value::Int(v)) => match f.as_i64() {
            Some(f) => Some(f.cmp(v)),
            None => f.as_f64()?.partial_cmp(&(*v as f64)),
        },
        (JsonValue::Number(f), Value::Float(v)) => f.as_f64()?.partial_cmp(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{FieldKind, PathElement};
    use serde_json::json;

    fn string_path(field: &str) -> Path {
        Path::new(vec![PathElement::new(
            "book",
            field,
            FieldKind::Scalar(FieldType::String),
        )])
    }

    fn int_path(field: &str) -> Path {
        Path::new(vec![PathElement::new(
            "book",
            field,
            FieldKind::Scalar(FieldType::Int),
        )])
    }

    #[test]
    fn test_arity_violations_fail_for_every_operator() {
        for op in Operator::ALL {
            let (min, max) = op.arity();
            // One value short of the minimum, when that is possible.
            if min > 0 {
                let err = op
                    .apply(string_path("title"), vec![])
                    .expect_err("short value list must be rejected");
                assert!(matches!(err, QueryError::InvalidValueCount { .. }), "{op}");
            }
            // One value past the maximum, when there is one.
            if let Some(max) = max {
                let values = vec![Value::from("x"); max + 1];
                let err = op
                    .apply(string_path("title"), values)
                    .expect_err("long value list must be rejected");
                assert!(matches!(err, QueryError::InvalidValueCount { .. }), "{op}");
            }
        }
    }

    #[test]
    fn test_string_operators_reject_numbers() {
        for op in [Operator::Prefix, Operator::Postfix, Operator::Infix] {
            let err = op.apply(string_path("title"), vec![Value::from(3i64)]);
            assert!(matches!(
                err,
                Err(QueryError::InvalidValueType { .. })
            ));
        }
    }

    #[test]
    fn test_string_operators_reject_non_string_fields() {
        let err = Operator::Prefix.apply(int_path("chapterCount"), vec![Value::from("3")]);
        assert!(matches!(err, Err(QueryError::InvalidOperation { .. })));
    }

    #[test]
    fn test_value_must_fit_field_type() {
        let err = Operator::Eq.apply(int_path("chapterCount"), vec![Value::from("three")]);
        assert!(matches!(err, Err(QueryError::InvalidValueType { .. })));
    }

    #[test]
    fn test_isnull_takes_no_values() {
        assert!(Operator::IsNull.apply(string_path("title"), vec![]).is_ok());
        let err = Operator::IsNull.apply(string_path("title"), vec![Value::from("x")]);
        assert!(matches!(err, Err(QueryError::InvalidValueCount { .. })));
    }

    #[test]
    fn test_string_match_semantics() {
        let hello = json!("Hello");
        let values = |s: &str| vec![Value::from(s)];
        assert!(Operator::Prefix.matches(Some(&hello), &values("He")));
        assert!(Operator::Postfix.matches(Some(&hello), &values("lo")));
        assert!(Operator::Infix.matches(Some(&hello), &values("ell")));
        // Case-sensitive.
        assert!(!Operator::Prefix.matches(Some(&hello), &values("he")));
        assert!(!Operator::Postfix.matches(Some(&hello), &values("LO")));
        assert!(!Operator::Infix.matches(Some(&hello), &values("ELL")));
    }

    #[test]
    fn test_range_and_set_semantics() {
        let five = json!(5);
        assert!(Operator::Lt.matches(Some(&five), &[Value::from(6i64)]));
        assert!(Operator::Le.matches(Some(&five), &[Value::from(5i64)]));
        assert!(Operator::Gt.matches(Some(&five), &[Value::from(4i64)]));
        assert!(!Operator::Gt.matches(Some(&five), &[Value::from(5i64)]));
        assert!(Operator::In.matches(Some(&five), &[Value::from(1i64), Value::from(5i64)]));
        assert!(Operator::NotIn.matches(Some(&five), &[Value::from(1i64), Value::from(2i64)]));
    }

    #[test]
    fn test_null_handling() {
        let null = json!(null);
        assert!(Operator::IsNull.matches(Some(&null), &[]));
        assert!(Operator::IsNull.matches(None, &[]));
        assert!(!Operator::NotNull.matches(Some(&null), &[]));
        // Null never satisfies a comparison, not even not-equals.
        assert!(!Operator::Ne.matches(Some(&null), &[Value::from("x")]));
        assert!(!Operator::NotIn.matches(None, &[Value::from("x")]));
    }
}
