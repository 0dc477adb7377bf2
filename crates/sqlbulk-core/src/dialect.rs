//! SQL dialects and per-dialect value coercion.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::field::FieldInfo;
use crate::identifiers::{quote_ident, quote_ident_bracket};
use crate::types::SqlType;
use crate::value::Value;

/// SQL dialect for statement generation.
///
/// The two dialects differ in what a single statement can do: SQLite has no
/// MERGE and no OUTPUT on a CTE delete, so bulk operations are emulated with
/// temp tables inside a transaction; SQL Server runs each operation as one
/// MERGE/OUTPUT statement and accepts structured table-valued parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// SQLite dialect (uses ?1, ?2 placeholders)
    #[default]
    Sqlite,
    /// SQL Server dialect (uses @p1, @p2 placeholders)
    SqlServer,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{index}"),
            Dialect::SqlServer => format!("@p{index}"),
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Sqlite => quote_ident(name),
            Dialect::SqlServer => quote_ident_bracket(name),
        }
    }

    /// Whether bulk operations must be emulated with temp tables.
    pub const fn uses_temp_tables(self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Whether the dialect accepts structured table-valued parameters.
    pub const fn supports_structured_params(self) -> bool {
        matches!(self, Dialect::SqlServer)
    }

    /// Storage type name for a column, honouring an explicit override.
    pub fn storage_type(self, field: &FieldInfo) -> String {
        if let Some(ty) = field.sql_type_override {
            return ty.to_string();
        }
        match self {
            Dialect::Sqlite => sqlite_type(&field.sql_type).to_string(),
            Dialect::SqlServer => sqlserver_type(&field.sql_type),
        }
    }

    /// Coerce a raw result value to the column's declared type.
    ///
    /// SQLite stores booleans and narrow integers as 64-bit integers and
    /// UUIDs, JSON and decimals as text or blobs; SQL Server drivers may
    /// return integer columns in a wider representation than declared.
    /// Values that cannot represent the declared type are a `TypeError`.
    #[allow(clippy::result_large_err)]
    pub fn coerce(self, value: Value, ty: &SqlType) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            SqlType::TinyInt => narrow_int(&value, "TINYINT", |v| i8::try_from(v).ok().map(Value::TinyInt)),
            SqlType::SmallInt => narrow_int(&value, "SMALLINT", |v| i16::try_from(v).ok().map(Value::SmallInt)),
            SqlType::Integer => narrow_int(&value, "INTEGER", |v| i32::try_from(v).ok().map(Value::Int)),
            SqlType::BigInt => match value {
                Value::BigInt(_) => Ok(value),
                other => other.as_i64().map(Value::BigInt).ok_or_else(|| mismatch("BIGINT", &other)),
            },
            SqlType::Boolean => value.as_bool().map(Value::Bool).ok_or_else(|| mismatch("BOOLEAN", &value)),
            #[allow(clippy::cast_possible_truncation)]
            SqlType::Real => match value {
                Value::Float(_) => Ok(value),
                other => other
                    .as_f64()
                    .map(|v| Value::Float(v as f32))
                    .ok_or_else(|| mismatch("REAL", &other)),
            },
            SqlType::Double => match value {
                Value::Double(_) => Ok(value),
                other => other.as_f64().map(Value::Double).ok_or_else(|| mismatch("DOUBLE", &other)),
            },
            SqlType::Decimal { .. } => match value {
                Value::Decimal(_) => Ok(value),
                Value::Text(s) => Ok(Value::Decimal(s)),
                Value::Float(v) => Ok(Value::Decimal(v.to_string())),
                Value::Double(v) => Ok(Value::Decimal(v.to_string())),
                other => other
                    .as_i64()
                    .map(|v| Value::Decimal(v.to_string()))
                    .ok_or_else(|| mismatch("DECIMAL", &other)),
            },
            SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text => match value {
                Value::Text(_) => Ok(value),
                Value::Decimal(s) => Ok(Value::Text(s)),
                other => Err(mismatch("TEXT", &other)),
            },
            SqlType::VarBinary(_) | SqlType::Blob => match value {
                Value::Bytes(_) => Ok(value),
                Value::Uuid(u) => Ok(Value::Bytes(u.to_vec())),
                other => Err(mismatch("BLOB", &other)),
            },
            SqlType::Uuid => match value {
                Value::Uuid(_) => Ok(value),
                Value::Bytes(ref b) if b.len() == 16 => {
                    let mut arr = [0u8; 16];
                    arr.copy_from_slice(b);
                    Ok(Value::Uuid(arr))
                }
                Value::Text(ref s) => parse_uuid(s).map(Value::Uuid).ok_or_else(|| mismatch("UUID", &value)),
                other => Err(mismatch("UUID", &other)),
            },
            SqlType::Json => match value {
                Value::Json(_) => Ok(value),
                Value::Text(s) => serde_json::from_str(&s).map(Value::Json).map_err(|e| {
                    Error::Type(TypeError {
                        expected: "JSON",
                        actual: format!("invalid JSON: {e}"),
                        column: None,
                    })
                }),
                other => Err(mismatch("JSON", &other)),
            },
            SqlType::Date => match value {
                Value::Date(_) => Ok(value),
                Value::Text(ref s) => parse_date(s).map(Value::Date).ok_or_else(|| mismatch("DATE", &value)),
                other => narrow_int(&other, "DATE", |v| i32::try_from(v).ok().map(Value::Date)),
            },
            SqlType::Time => match value {
                Value::Time(_) => Ok(value),
                other => other.as_i64().map(Value::Time).ok_or_else(|| mismatch("TIME", &other)),
            },
            SqlType::Timestamp => match value {
                Value::Timestamp(_) => Ok(value),
                Value::TimestampTz(v) => Ok(Value::Timestamp(v)),
                other => other.as_i64().map(Value::Timestamp).ok_or_else(|| mismatch("TIMESTAMP", &other)),
            },
            SqlType::TimestampTz => match value {
                Value::TimestampTz(_) => Ok(value),
                Value::Timestamp(v) => Ok(Value::TimestampTz(v)),
                other => other
                    .as_i64()
                    .map(Value::TimestampTz)
                    .ok_or_else(|| mismatch("TIMESTAMPTZ", &other)),
            },
            SqlType::Custom(_) => Ok(value),
        }
    }
}

fn sqlite_type(ty: &SqlType) -> &'static str {
    match ty {
        SqlType::TinyInt
        | SqlType::SmallInt
        | SqlType::Integer
        | SqlType::BigInt
        | SqlType::Boolean
        | SqlType::Date
        | SqlType::Time
        | SqlType::Timestamp
        | SqlType::TimestampTz => "INTEGER",
        SqlType::Real | SqlType::Double => "REAL",
        SqlType::Decimal { .. } => "NUMERIC",
        SqlType::VarBinary(_) | SqlType::Blob | SqlType::Uuid => "BLOB",
        SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text | SqlType::Json => "TEXT",
        SqlType::Custom(name) => name,
    }
}

fn sqlserver_type(ty: &SqlType) -> String {
    match ty {
        SqlType::TinyInt => "TINYINT".to_string(),
        SqlType::SmallInt => "SMALLINT".to_string(),
        SqlType::Integer => "INT".to_string(),
        SqlType::BigInt => "BIGINT".to_string(),
        SqlType::Real => "REAL".to_string(),
        SqlType::Double => "FLOAT".to_string(),
        SqlType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
        SqlType::Boolean => "BIT".to_string(),
        SqlType::Char(len) => format!("NCHAR({len})"),
        SqlType::VarChar(len) => format!("NVARCHAR({len})"),
        SqlType::Text | SqlType::Json => "NVARCHAR(MAX)".to_string(),
        SqlType::VarBinary(len) => format!("VARBINARY({len})"),
        SqlType::Blob => "VARBINARY(MAX)".to_string(),
        SqlType::Date => "DATE".to_string(),
        SqlType::Time => "TIME".to_string(),
        SqlType::Timestamp => "DATETIME2".to_string(),
        SqlType::TimestampTz => "DATETIMEOFFSET".to_string(),
        SqlType::Uuid => "UNIQUEIDENTIFIER".to_string(),
        SqlType::Custom(name) => (*name).to_string(),
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

#[allow(clippy::result_large_err)]
fn narrow_int(value: &Value, expected: &'static str, narrow: impl Fn(i64) -> Option<Value>) -> Result<Value> {
    let v = value.as_i64().ok_or_else(|| mismatch(expected, value))?;
    narrow(v).ok_or_else(|| {
        Error::Type(TypeError {
            expected,
            actual: format!("value {v} out of range"),
            column: None,
        })
    })
}

/// Parse a hyphenated or bare 32-digit hex UUID.
fn parse_uuid(s: &str) -> Option<[u8; 16]> {
    let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, pair) in hex.chunks(2).enumerate() {
        let digits = std::str::from_utf8(pair).ok()?;
        out[i] = u8::from_str_radix(digits, 16).ok()?;
    }
    Some(out)
}

/// Parse `YYYY-MM-DD` into days since 1970-01-01.
fn parse_date(s: &str) -> Option<i32> {
    let mut parts = s.get(..10)?.splitn(3, '-');
    let y: i64 = parts.next()?.parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let d: i64 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    // Civil-from-days inverse over the proleptic Gregorian calendar.
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    i32::try_from(era * 146_097 + doe - 719_468).ok()
}
