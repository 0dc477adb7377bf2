//! Entity metadata consumed by the bulk layer.
//!
//! The `Entity` trait is the narrow interface to the host data layer's model
//! metadata: table identity, ordered columns, primary key, and conversion to
//! and from rows. `EntityDescriptor` compiles that metadata once per call into
//! an index table so that row decoding never searches by name per value.

use crate::Result;
use crate::error::Error;
use crate::field::FieldInfo;
use crate::row::{ColumnInfo, Row};
use crate::value::Value;
use std::sync::Arc;

/// Trait for types that map to a database table.
///
/// # Example
///
/// ```ignore
/// impl Entity for Product {
///     const TABLE_NAME: &'static str = "products";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///
///     fn fields() -> &'static [FieldInfo] {
///         static FIELDS: [FieldInfo; 2] = [
///             FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
///             FieldInfo::new("name", "name", SqlType::Text),
///         ];
///         &FIELDS
///     }
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { id: row.get_named("id")?, name: row.get_named("name")? })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync + Clone + Default + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// Optional schema qualifier (e.g. "dbo").
    const SCHEMA_NAME: Option<&'static str> = None;

    /// The primary key column name(s), in key order.
    const PRIMARY_KEY: &'static [&'static str];

    /// Field metadata for all columns, in column order.
    fn fields() -> &'static [FieldInfo];

    /// Convert this instance to `(column_name, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct an instance from a row keyed by column name.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key column(s).
    fn primary_key_value(&self) -> Vec<Value> {
        let row = self.to_row();
        Self::PRIMARY_KEY
            .iter()
            .map(|key| {
                row.iter()
                    .find(|(name, _)| name == key)
                    .map_or(Value::Null, |(_, v)| v.clone())
            })
            .collect()
    }
}

/// Compiled per-type metadata: ordered columns, key positions, and the shared
/// name table used to rebuild entities from value vectors.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    table: &'static str,
    schema: Option<&'static str>,
    fields: &'static [FieldInfo],
    key_indices: Vec<usize>,
    non_key_indices: Vec<usize>,
    columns: Arc<ColumnInfo>,
}

impl EntityDescriptor {
    /// Describe an entity type.
    ///
    /// Fails with an argument error if the entity declares no primary key or
    /// names a key column that is not among its fields.
    #[allow(clippy::result_large_err)]
    pub fn of<M: Entity>() -> Result<Self> {
        let fields = M::fields();
        if M::PRIMARY_KEY.is_empty() {
            return Err(Error::argument(
                "entity",
                format!("entity for table '{}' has no primary key", M::TABLE_NAME),
            ));
        }

        let columns = Arc::new(ColumnInfo::new(
            fields.iter().map(|f| f.column_name.to_string()).collect(),
        ));

        let mut key_indices = Vec::with_capacity(M::PRIMARY_KEY.len());
        for key in M::PRIMARY_KEY {
            let idx = columns.index_of(key).ok_or_else(|| {
                Error::argument(
                    "entity",
                    format!(
                        "primary key column '{}' is not a column of '{}'",
                        key,
                        M::TABLE_NAME
                    ),
                )
            })?;
            key_indices.push(idx);
        }

        let non_key_indices = (0..fields.len())
            .filter(|i| !key_indices.contains(i))
            .collect();

        Ok(Self {
            table: M::TABLE_NAME,
            schema: M::SCHEMA_NAME,
            fields,
            key_indices,
            non_key_indices,
            columns,
        })
    }

    /// Unqualified table name.
    pub fn table_name(&self) -> &'static str {
        self.table
    }

    /// Schema qualifier, if any.
    pub fn schema_name(&self) -> Option<&'static str> {
        self.schema
    }

    /// All fields in column order.
    pub fn fields(&self) -> &'static [FieldInfo] {
        self.fields
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    /// Column positions of the primary key, in key order.
    pub fn key_indices(&self) -> &[usize] {
        &self.key_indices
    }

    /// Column positions of every non-key column, in column order.
    pub fn non_key_indices(&self) -> &[usize] {
        &self.non_key_indices
    }

    /// Primary key fields, in key order.
    pub fn key_fields(&self) -> impl Iterator<Item = &'static FieldInfo> + '_ {
        self.key_indices.iter().map(|&i| &self.fields[i])
    }

    /// Check if the column at `index` is part of the primary key.
    pub fn is_key(&self, index: usize) -> bool {
        self.key_indices.contains(&index)
    }

    /// Whether any key column is generated by the database.
    pub fn has_generated_key(&self) -> bool {
        self.key_fields().any(|f| f.auto_increment)
    }

    /// Position of a column by name.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.index_of(column)
    }

    /// Shared column name table.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Extract an entity's values in column order.
    ///
    /// Columns the entity does not report are treated as NULL.
    pub fn values_of<M: Entity>(&self, entity: &M) -> Vec<Value> {
        let mut values = vec![Value::Null; self.fields.len()];
        for (name, value) in entity.to_row() {
            if let Some(idx) = self.columns.index_of(name) {
                values[idx] = value;
            }
        }
        values
    }

    /// Project the key columns out of a column-ordered value vector.
    pub fn key_values(&self, values: &[Value]) -> Vec<Value> {
        self.key_indices
            .iter()
            .map(|&i| values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Rebuild an entity from a column-ordered value vector.
    #[allow(clippy::result_large_err)]
    pub fn build<M: Entity>(&self, values: Vec<Value>) -> Result<M> {
        if values.len() != self.fields.len() {
            return Err(Error::decode(format!(
                "expected {} values for '{}', got {}",
                self.fields.len(),
                self.table,
                values.len()
            )));
        }
        M::from_row(&Row::with_columns(Arc::clone(&self.columns), values))
    }
}
