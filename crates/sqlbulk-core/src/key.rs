//! Hashable primary-key values.

use crate::value::Value;

/// One normalised key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum KeyPart {
    Null,
    Int(i64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(v) => KeyPart::Int(i64::from(*v)),
            Value::TinyInt(v) => KeyPart::Int(i64::from(*v)),
            Value::SmallInt(v) => KeyPart::Int(i64::from(*v)),
            Value::Int(v) => KeyPart::Int(i64::from(*v)),
            Value::BigInt(v) | Value::Time(v) | Value::Timestamp(v) | Value::TimestampTz(v) => {
                KeyPart::Int(*v)
            }
            Value::Date(v) => KeyPart::Int(i64::from(*v)),
            Value::Float(v) => KeyPart::Float(f64::from(*v).to_bits()),
            Value::Double(v) => KeyPart::Float(v.to_bits()),
            Value::Decimal(s) | Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Bytes(b) => KeyPart::Bytes(b.clone()),
            Value::Uuid(u) => KeyPart::Bytes(u.to_vec()),
            Value::Json(j) => KeyPart::Text(j.to_string()),
            Value::Table(_) => KeyPart::Null,
        }
    }
}

/// A primary key normalised for equality across representations.
///
/// Integer widths collapse to `i64` and UUIDs to their bytes, so a key read
/// back from the database as `BigInt(1)` matches a source entity whose key
/// is `Int(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(Vec<KeyPart>);

impl RowKey {
    /// Build a key from its component values, in key order.
    pub fn new(values: &[Value]) -> Self {
        Self(values.iter().map(KeyPart::from).collect())
    }

    /// Whether any component is NULL.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(|p| matches!(p, KeyPart::Null))
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
