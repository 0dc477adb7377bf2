//! Core types and traits for sqlbulk.
//!
//! This crate provides the foundations shared by statement synthesis and the
//! public facade:
//!
//! - `Entity` trait and `EntityDescriptor` for table/column/key metadata
//! - `Value` and `Row` for parameters and result rows
//! - `Connection` trait for statement execution under a `Cx` context
//! - `Dialect` with per-dialect quoting and value coercion
//! - `RowKey` for dialect-normalised primary key comparison

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, Cx, Outcome, RegionId, TaskId};

pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod key;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, IsolationLevel, TransactionOps};
pub use dialect::Dialect;
pub use entity::{Entity, EntityDescriptor};
pub use error::{
    ArgumentError, ConfigError, ConnectionError, ConnectionErrorKind, DecodeError, Error,
    ProvisionError, QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind,
    TypeError,
};
pub use field::{Field, FieldInfo};
pub use identifiers::{quote_ident, quote_ident_bracket, sanitize_identifier};
pub use key::RowKey;
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{SqlType, TypeInfo};
pub use value::{TableParam, Value};
