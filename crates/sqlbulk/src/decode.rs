//! Result row decoding.
//!
//! Bulk statements return rows in one of the fixed layouts described in
//! [`sqlbulk_query::generate`]. [`EntityDecoder`] turns those rows back into
//! entities, looking columns up by name so both dialects share one decoder.
//!
//! Pre-images (deleted rows, the old side of an update) are decoded from the
//! row itself. Rows the caller supplied (inserted rows, the new side of an
//! update) are taken from the source collection by key, then corrected for
//! columns the statement did not write.

use sqlbulk_core::{Dialect, Entity, EntityDescriptor, Error, Result, Row, RowKey, Value};
use sqlbulk_query::{ACTION_COLUMN, ActionLabel, NEW_PREFIX, OLD_PREFIX, SyncMode};
use std::collections::HashMap;
use std::marker::PhantomData;

/// One classified row of a sync result.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction<M> {
    Inserted(M),
    /// `(old, new)`
    Updated(M, M),
    Deleted(M),
}

/// Decodes result rows for entity `M` against one source collection.
#[derive(Debug)]
pub struct EntityDecoder<'a, M: Entity> {
    entity: &'a EntityDescriptor,
    dialect: Dialect,
    source: &'a [Vec<Value>],
    index: HashMap<RowKey, usize>,
    defaults: Vec<Value>,
    _marker: PhantomData<fn() -> M>,
}

impl<'a, M: Entity> EntityDecoder<'a, M> {
    /// Create a decoder. `source` holds the caller's rows as column-ordered
    /// values; keys are assumed unique.
    pub fn new(entity: &'a EntityDescriptor, dialect: Dialect, source: &'a [Vec<Value>]) -> Self {
        let index = source
            .iter()
            .enumerate()
            .map(|(i, values)| (RowKey::new(&entity.key_values(values)), i))
            .collect();
        Self {
            entity,
            dialect,
            source,
            index,
            defaults: entity.values_of(&M::default()),
            _marker: PhantomData,
        }
    }

    /// Decode a row holding exactly the entity's columns, unprefixed.
    #[allow(clippy::result_large_err)]
    pub fn decode_full(&self, row: &Row) -> Result<M> {
        check_width(row, self.entity.column_count(), true)?;
        self.decode_prefixed(row, "")
    }

    /// Decode the entity from the columns named `<prefix><column>`.
    #[allow(clippy::result_large_err)]
    pub fn decode_prefixed(&self, row: &Row, prefix: &str) -> Result<M> {
        let values = self.decode_values(row, prefix)?;
        self.entity.build(values)
    }

    /// Column-ordered values read from `<prefix><column>`, coerced to each
    /// column's declared type. Absent nullable columns read as NULL.
    #[allow(clippy::result_large_err)]
    pub fn decode_values(&self, row: &Row, prefix: &str) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.entity.column_count());
        for (i, field) in self.entity.fields().iter().enumerate() {
            let name = format!("{prefix}{}", field.column_name);
            let value = match row.get_by_name(&name) {
                Some(raw) => self.dialect.coerce(raw.clone(), &field.sql_type)?,
                None if field.nullable && !self.entity.is_key(i) => Value::Null,
                None => return Err(Error::decode_column(name, "column missing from result row")),
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Key read from `<prefix><key column>`.
    #[allow(clippy::result_large_err)]
    pub fn key_of(&self, row: &Row, prefix: &str) -> Result<RowKey> {
        let mut values = Vec::with_capacity(self.entity.key_indices().len());
        for field in self.entity.key_fields() {
            let name = format!("{prefix}{}", field.column_name);
            let raw = row
                .get_by_name(&name)
                .ok_or_else(|| Error::decode_column(name.clone(), "key column missing from result row"))?;
            let value = self.dialect.coerce(raw.clone(), &field.sql_type)?;
            if value.is_null() {
                return Err(Error::decode_column(name, "key column is NULL"));
            }
            values.push(value);
        }
        Ok(RowKey::new(&values))
    }

    /// The source row with the given key.
    #[allow(clippy::result_large_err)]
    pub fn lookup_source(&self, key: &RowKey) -> Result<&'a [Value]> {
        self.index
            .get(key)
            .map(|&i| self.source[i].as_slice())
            .ok_or_else(|| Error::decode(format!("result key {key:?} is not in the source collection")))
    }

    /// Reset non-key columns outside `included` to the entity default, the
    /// state an insert leaves them in.
    pub fn reset_excluded(&self, values: &mut [Value], included: &[usize]) {
        for &i in self.entity.non_key_indices() {
            if !included.contains(&i) {
                values[i] = self.defaults[i].clone();
            }
        }
    }

    /// Copy non-key columns outside `included` from the pre-image, the state
    /// an update leaves them in.
    pub fn overlay_excluded(&self, values: &mut [Value], pre_image: &[Value], included: &[usize]) {
        for &i in self.entity.non_key_indices() {
            if !included.contains(&i) {
                values[i] = pre_image[i].clone();
            }
        }
    }

    /// Decode an insert result row (key columns only) into the source entity
    /// it came from.
    #[allow(clippy::result_large_err)]
    pub fn decode_inserted(&self, row: &Row, included: &[usize]) -> Result<M> {
        check_width(row, self.entity.key_indices().len(), true)?;
        let key = self.key_of(row, "")?;
        let mut values = self.lookup_source(&key)?.to_vec();
        self.reset_excluded(&mut values, included);
        self.entity.build(values)
    }

    /// Decode one row of a sync result.
    #[allow(clippy::result_large_err)]
    pub fn decode_sync_row(
        &self,
        row: &Row,
        mode: SyncMode,
        insert_columns: &[usize],
        update_columns: &[usize],
    ) -> Result<SyncAction<M>> {
        check_width(
            row,
            1 + self.entity.column_count() + self.entity.key_indices().len(),
            false,
        )?;
        let label = row
            .get_by_name(ACTION_COLUMN)
            .and_then(Value::as_str)
            .and_then(ActionLabel::parse)
            .ok_or_else(|| Error::decode_column(ACTION_COLUMN, "missing or unknown action"))?;

        match label {
            ActionLabel::Insert => {
                let key = self.key_of(row, NEW_PREFIX)?;
                let mut values = self.lookup_source(&key)?.to_vec();
                self.reset_excluded(&mut values, insert_columns);
                Ok(SyncAction::Inserted(self.entity.build(values)?))
            }
            ActionLabel::Update if mode.updates() => {
                let old = self.decode_values(row, OLD_PREFIX)?;
                let key = self.key_of(row, NEW_PREFIX)?;
                let mut new = self.lookup_source(&key)?.to_vec();
                self.overlay_excluded(&mut new, &old, update_columns);
                Ok(SyncAction::Updated(self.entity.build(old)?, self.entity.build(new)?))
            }
            ActionLabel::Delete if mode.deletes() => {
                Ok(SyncAction::Deleted(self.decode_prefixed(row, OLD_PREFIX)?))
            }
            other => Err(Error::decode_column(
                ACTION_COLUMN,
                format!("action {} is not produced in {:?} mode", other.as_str(), mode),
            )),
        }
    }
}

#[allow(clippy::result_large_err)]
fn check_width(row: &Row, expected: usize, exact: bool) -> Result<()> {
    let ok = if exact { row.len() == expected } else { row.len() >= expected };
    if ok {
        Ok(())
    } else {
        Err(Error::decode(format!(
            "result row has {} columns, expected {}{}",
            row.len(),
            if exact { "" } else { "at least " },
            expected
        )))
    }
}
