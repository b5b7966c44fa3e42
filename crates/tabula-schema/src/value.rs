//! Scalar types and runtime values.

use std::cmp::Ordering;
use std::fmt;

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The scalar type of a field or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// TEXT
    Text,
    /// INTEGER (4 bytes)
    Int,
    /// BIGINT (8 bytes)
    BigInt,
    /// DOUBLE PRECISION
    Float,
    /// NUMERIC (arbitrary precision)
    Decimal,
    /// BOOLEAN
    Boolean,
    /// TIMESTAMPTZ
    Timestamp,
    /// BYTEA
    Bytes,
    /// JSONB
    Json,
    /// UUID
    Uuid,
}

impl ScalarType {
    /// The Postgres type used for columns of this type.
    pub fn sql_type(self) -> &'static str {
        match self {
            ScalarType::Text => "TEXT",
            ScalarType::Int => "INTEGER",
            ScalarType::BigInt => "BIGINT",
            ScalarType::Float => "DOUBLE PRECISION",
            ScalarType::Decimal => "NUMERIC",
            ScalarType::Boolean => "BOOLEAN",
            ScalarType::Timestamp => "TIMESTAMPTZ",
            ScalarType::Bytes => "BYTEA",
            ScalarType::Json => "JSONB",
            ScalarType::Uuid => "UUID",
        }
    }

    /// Map an `information_schema.columns.data_type` back to a scalar type.
    pub fn from_information_schema(data_type: &str) -> Option<Self> {
        Some(match data_type {
            "text" | "character varying" | "character" => ScalarType::Text,
            "integer" | "smallint" => ScalarType::Int,
            "bigint" => ScalarType::BigInt,
            "double precision" | "real" => ScalarType::Float,
            "numeric" => ScalarType::Decimal,
            "boolean" => ScalarType::Boolean,
            "timestamp with time zone" => ScalarType::Timestamp,
            "bytea" => ScalarType::Bytes,
            "jsonb" | "json" => ScalarType::Json,
            "uuid" => ScalarType::Uuid,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::BigInt)
    }

    pub fn is_text(self) -> bool {
        self == ScalarType::Text
    }

    /// Whether `<`, `>` and ORDER BY make sense for this type.
    pub fn is_orderable(self) -> bool {
        !matches!(self, ScalarType::Json | ScalarType::Bytes)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Text => "text",
            ScalarType::Int => "integer",
            ScalarType::BigInt => "large integer",
            ScalarType::Float => "float",
            ScalarType::Decimal => "decimal",
            ScalarType::Boolean => "boolean",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Bytes => "bytes",
            ScalarType::Json => "json",
            ScalarType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A value that cannot be converted to the requested type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot use {found} value `{value}` as {expected}")]
pub struct ValueError {
    pub expected: ScalarType,
    pub found: &'static str,
    pub value: String,
}

/// A dynamically typed value, as stored in records and predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(Timestamp),
    Json(serde_json::Value),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::BigInt(_) => "large integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
        }
    }

    /// The scalar type this value naturally belongs to. `None` for `Null`.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ScalarType::Boolean,
            Value::Int(_) => ScalarType::Int,
            Value::BigInt(_) => ScalarType::BigInt,
            Value::Float(_) => ScalarType::Float,
            Value::Decimal(_) => ScalarType::Decimal,
            Value::Text(_) => ScalarType::Text,
            Value::Bytes(_) => ScalarType::Bytes,
            Value::Timestamp(_) => ScalarType::Timestamp,
            Value::Json(_) => ScalarType::Json,
            Value::Uuid(_) => ScalarType::Uuid,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert this value to `ty` without losing information.
    ///
    /// `Null` converts to every type; nullability is the caller's concern.
    pub fn coerce_to(&self, ty: ScalarType) -> Result<Value, ValueError> {
        let coerced = match (self, ty) {
            (Value::Null, _) => Some(Value::Null),

            (Value::Bool(b), ScalarType::Boolean) => Some(Value::Bool(*b)),

            (Value::Int(n), ScalarType::Int) => Some(Value::Int(*n)),
            (Value::Int(n), ScalarType::BigInt) => Some(Value::BigInt(i64::from(*n))),
            (Value::Int(n), ScalarType::Float) => Some(Value::Float(f64::from(*n))),
            (Value::Int(n), ScalarType::Decimal) => Some(Value::Decimal(Decimal::from(*n))),

            (Value::BigInt(n), ScalarType::BigInt) => Some(Value::BigInt(*n)),
            (Value::BigInt(n), ScalarType::Int) => i32::try_from(*n).ok().map(Value::Int),
            (Value::BigInt(n), ScalarType::Float) => {
                // f64 represents every integer up to 2^53 exactly
                const EXACT: i64 = 1 << 53;
                (-EXACT..=EXACT)
                    .contains(n)
                    .then(|| Value::Float(*n as f64))
            }
            (Value::BigInt(n), ScalarType::Decimal) => Some(Value::Decimal(Decimal::from(*n))),

            (Value::Float(f), ScalarType::Float) => Some(Value::Float(*f)),
            // shortest round-trip form, so 9.99 becomes 9.99 and not its binary expansion
            (Value::Float(f), ScalarType::Decimal) => {
                f.to_string().parse::<Decimal>().ok().map(Value::Decimal)
            }

            (Value::Decimal(d), ScalarType::Decimal) => Some(Value::Decimal(*d)),

            (Value::Text(s), ScalarType::Text) => Some(Value::Text(s.clone())),
            (Value::Text(s), ScalarType::Timestamp) => {
                s.parse::<Timestamp>().ok().map(Value::Timestamp)
            }
            (Value::Text(s), ScalarType::Uuid) => Uuid::parse_str(s).ok().map(Value::Uuid),
            (Value::Text(s), ScalarType::Decimal) => {
                s.parse::<Decimal>().ok().map(Value::Decimal)
            }

            (Value::Bytes(b), ScalarType::Bytes) => Some(Value::Bytes(b.clone())),
            (Value::Timestamp(t), ScalarType::Timestamp) => Some(Value::Timestamp(*t)),
            (Value::Uuid(u), ScalarType::Uuid) => Some(Value::Uuid(*u)),
            (Value::Uuid(u), ScalarType::Text) => Some(Value::Text(u.to_string())),

            (Value::Json(j), ScalarType::Json) => Some(Value::Json(j.clone())),
            (other, ScalarType::Json) => Some(Value::Json(other.to_json())),

            _ => None,
        };

        coerced.ok_or_else(|| ValueError {
            expected: ty,
            found: self.type_name(),
            value: self.to_string(),
        })
    }

    /// Compare two values of compatible types.
    ///
    /// Numbers compare across widths. Returns `None` for `Null`, for values
    /// of unrelated types, and for NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Json(a), Value::Json(b)) => (a == b).then_some(Ordering::Equal),
            (Value::Decimal(a), _) => other.as_i64().map(|b| a.cmp(&Decimal::from(b))),
            (_, Value::Decimal(b)) => self.as_i64().map(|a| Decimal::from(a).cmp(b)),
            (Value::Float(a), _) => other.as_i64().and_then(|b| a.partial_cmp(&(b as f64))),
            (_, Value::Float(b)) => self.as_i64().and_then(|a| (a as f64).partial_cmp(b)),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    /// Convert a JSON value into the closest runtime value.
    ///
    /// Integers that fit 32 bits become `Int`, larger ones `BigInt`; arrays
    /// and objects stay `Json`.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::BigInt(i),
                    }
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Json(serde_json::Value::Number(n))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }

    /// Convert to plain JSON (the untagged form).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(n) => J::from(*n),
            Value::BigInt(n) => J::from(*n),
            Value::Float(f) => J::from(*f),
            Value::Decimal(d) => J::String(d.to_string()),
            Value::Text(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|byte| J::from(*byte)).collect()),
            Value::Timestamp(t) => J::String(t.to_string()),
            Value::Json(j) => j.clone(),
            Value::Uuid(u) => J::String(u.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::BigInt(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::BigInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
