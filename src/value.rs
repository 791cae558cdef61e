//! Scalar value and field-type vocabulary shared by the predicate model,
//! the metadata store and both query backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of an entity attribute.
///
/// `Date` values travel as ISO-8601 strings, which order lexically the same
/// way they order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Date,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
        }
    }

    /// Whether values of this type have a total order usable by range
    /// operators and MIN/MAX aggregation.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, FieldType::Bool)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A predicate argument, later surfaced as a positional bind parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
        }
    }

    /// Whether this value can be bound against a field of the declared type.
    /// Ints widen to float columns and vice versa; dates bind as strings.
    pub fn fits(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Value::String(_), FieldType::String | FieldType::Date) => true,
            (Value::Int(_), FieldType::Int | FieldType::Float) => true,
            (Value::Float(_), FieldType::Float | FieldType::Int) => true,
            (Value::Bool(_), FieldType::Bool) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{}'", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&Value> for sea_query::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => sea_query::Value::String(Some(Box::new(s.clone()))),
            Value::Int(n) => sea_query::Value::BigInt(Some(*n)),
            Value::Float(n) => sea_query::Value::Double(Some(*n)),
            Value::Bool(b) => sea_query::Value::Bool(Some(*b)),
        }
    }
}

impl TryFrom<sea_query::Value> for Value {
    type Error = crate::error::QueryError;

    fn try_from(value: sea_query::Value) -> Result<Self, Self::Error> {
        match value {
            sea_query::Value::String(Some(s)) => Ok(Value::String(*s)),
            sea_query::Value::BigInt(Some(n)) => Ok(Value::Int(n)),
            sea_query::Value::Int(Some(n)) => Ok(Value::Int(i64::from(n))),
            sea_query::Value::SmallInt(Some(n)) => Ok(Value::Int(i64::from(n))),
            sea_query::Value::TinyInt(Some(n)) => Ok(Value::Int(i64::from(n))),
            // Pagination windows come back as unsigned values.
            sea_query::Value::BigUnsigned(Some(n)) => i64::try_from(n).map(Value::Int).map_err(|_| {
                crate::error::QueryError::invalid_operation("bind value exceeds i64 range")
            }),
            sea_query::Value::Unsigned(Some(n)) => Ok(Value::Int(i64::from(n))),
            sea_query::Value::SmallUnsigned(Some(n)) => Ok(Value::Int(i64::from(n))),
            sea_query::Value::TinyUnsigned(Some(n)) => Ok(Value::Int(i64::from(n))),
            sea_query::Value::Double(Some(n)) => Ok(Value::Float(n)),
            sea_query::Value::Float(Some(n)) => Ok(Value::Float(f64::from(n))),
            sea_query::Value::Bool(Some(b)) => Ok(Value::Bool(b)),
            other => Err(crate::error::QueryError::invalid_operation(format!(
                "unsupported bind value: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_fits_field_type() {
        assert!(Value::from("Dune").fits(FieldType::String));
        assert!(Value::from("2020-01-01").fits(FieldType::Date));
        assert!(Value::from(3i64).fits(FieldType::Float));
        assert!(Value::from(3.5).fits(FieldType::Int));
        assert!(!Value::from("Dune").fits(FieldType::Int));
        assert!(!Value::from(true).fits(FieldType::String));
    }

    #[test]
    fn test_sea_query_round_trip() {
        let values = vec![
            Value::from("SciFi"),
            Value::from(42i64),
            Value::from(1.5),
            Value::from(false),
        ];
        for value in values {
            let sea: sea_query::Value = (&value).into();
            assert_eq!(Value::try_from(sea).unwrap(), value);
        }
    }
}
