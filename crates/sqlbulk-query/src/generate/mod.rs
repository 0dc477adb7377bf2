//! Per-dialect statement synthesis for bulk operations.
//!
//! Each generator turns a request into a [`BulkPlan`]. The result rows of
//! every plan follow a fixed layout so one decoder serves both dialects:
//!
//! | operation | result columns |
//! |---|---|
//! | delete | every entity column (pre-image) |
//! | insert-if-not-exist | key columns of inserted rows |
//! | update | every entity column (post-image) |
//! | sync / upsert | `__action`, `old_<col>` for every column, `new_<key>` for every key column |
//!
//! The SQLite generator may add further `new_<col>` columns to the sync
//! layout; decoders locate columns by name.

mod sqlite;
mod sqlserver;

pub use sqlite::SqliteBulkGenerator;
pub use sqlserver::SqlServerBulkGenerator;

use crate::expr::Expr;
use crate::input::RowSource;
use crate::sql::BulkPlan;
use sqlbulk_core::{Dialect, EntityDescriptor, Error, Result};

/// Name of the action discriminator column in sync results.
pub const ACTION_COLUMN: &str = "__action";
/// Prefix of the pre-image (target side) column block.
pub const OLD_PREFIX: &str = "old_";
/// Prefix of the source side column block.
pub const NEW_PREFIX: &str = "new_";

/// Prefix of every alias and CTE name a generated statement introduces.
///
/// Tables whose name starts with it are rejected, so no alias can shadow the
/// table a statement works on.
pub const RESERVED_PREFIX: &str = "__bulk_";
/// Alias of the target table, or of the CTE standing in for it.
const TARGET: &str = "__bulk_target";
/// Alias of the source rows.
const SOURCE: &str = "__bulk_source";
/// Alias of a staged temp table.
const STAGED: &str = "__bulk_staged";

/// Which actions a sync statement may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Insert, update and delete.
    Sync,
    /// Insert and delete; rows present on both sides are left untouched.
    SyncWithoutUpdate,
    /// Insert and update over the whole table; nothing is deleted.
    Upsert,
}

impl SyncMode {
    pub const fn updates(self) -> bool {
        matches!(self, SyncMode::Sync | SyncMode::Upsert)
    }

    pub const fn deletes(self) -> bool {
        matches!(self, SyncMode::Sync | SyncMode::SyncWithoutUpdate)
    }
}

/// The action a sync result row reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionLabel {
    Insert,
    Update,
    Delete,
}

impl ActionLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionLabel::Insert => "INSERT",
            ActionLabel::Update => "UPDATE",
            ActionLabel::Delete => "DELETE",
        }
    }

    /// Parse a discriminator value, as emitted by either dialect.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "INSERT" => Some(ActionLabel::Insert),
            "UPDATE" => Some(ActionLabel::Update),
            "DELETE" => Some(ActionLabel::Delete),
            _ => None,
        }
    }
}

/// Delete every target row matching a filter.
#[derive(Debug, Clone, Copy)]
pub struct DeleteRequest<'a> {
    pub entity: &'a EntityDescriptor,
    pub filter: Option<&'a Expr>,
    pub has_triggers: bool,
}

/// Insert source rows whose key is absent from the table.
#[derive(Debug, Clone, Copy)]
pub struct InsertRequest<'a> {
    pub entity: &'a EntityDescriptor,
    pub source: &'a RowSource,
    pub has_triggers: bool,
}

/// Update rows matching source keys, optionally gated by a condition over
/// `current`/`incoming`.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    pub entity: &'a EntityDescriptor,
    pub source: &'a RowSource,
    /// Non-key column positions to assign.
    pub columns: &'a [usize],
    pub condition: Option<&'a Expr>,
    pub has_triggers: bool,
}

/// Reconcile a target against source rows.
#[derive(Debug, Clone, Copy)]
pub struct SyncRequest<'a> {
    pub entity: &'a EntityDescriptor,
    /// Target filter; ignored in upsert mode, which targets the whole table.
    pub filter: Option<&'a Expr>,
    pub source: &'a RowSource,
    /// Non-key column positions written on insert.
    pub insert_columns: &'a [usize],
    /// Non-key column positions written on update.
    pub update_columns: &'a [usize],
    pub mode: SyncMode,
    pub has_triggers: bool,
}

/// Statement synthesis for one dialect.
pub trait BulkGenerator: Send + Sync {
    /// The dialect this generator emits.
    fn dialect(&self) -> Dialect;

    /// Plan for deleting the target, returning pre-images.
    #[allow(clippy::result_large_err)]
    fn delete(&self, req: &DeleteRequest<'_>) -> Result<BulkPlan>;

    /// Plan for inserting absent source rows, returning their keys.
    #[allow(clippy::result_large_err)]
    fn insert_if_not_exist(&self, req: &InsertRequest<'_>) -> Result<BulkPlan>;

    /// Plan for updating matching rows, returning post-images.
    #[allow(clippy::result_large_err)]
    fn update(&self, req: &UpdateRequest<'_>) -> Result<BulkPlan>;

    /// Plan for sync, sync-without-update or upsert, returning action rows.
    #[allow(clippy::result_large_err)]
    fn sync(&self, req: &SyncRequest<'_>) -> Result<BulkPlan>;
}

/// Get the generator for a dialect.
pub fn generator_for_dialect(dialect: Dialect) -> Box<dyn BulkGenerator> {
    match dialect {
        Dialect::Sqlite => Box::new(SqliteBulkGenerator::new()),
        Dialect::SqlServer => Box::new(SqlServerBulkGenerator::new()),
    }
}

/// Column names of the entity in column order.
pub(crate) fn all_columns(entity: &EntityDescriptor) -> Vec<&'static str> {
    entity.fields().iter().map(|f| f.column_name).collect()
}

/// Column names of the key, in key order.
pub(crate) fn key_columns(entity: &EntityDescriptor) -> Vec<&'static str> {
    entity.key_fields().map(|f| f.column_name).collect()
}

/// Column names at the given positions.
pub(crate) fn columns_at(entity: &EntityDescriptor, positions: &[usize]) -> Vec<&'static str> {
    positions
        .iter()
        .map(|&i| entity.fields()[i].column_name)
        .collect()
}

/// Insert column list: keys first, then the selected non-key columns in order.
pub(crate) fn insert_columns(entity: &EntityDescriptor, non_key: &[usize]) -> Vec<&'static str> {
    let mut positions: Vec<usize> = entity.key_indices().to_vec();
    positions.extend(non_key.iter().copied().filter(|i| !entity.is_key(*i)));
    positions.sort_unstable();
    columns_at(entity, &positions)
}

#[allow(clippy::result_large_err)]
pub(crate) fn require_unreserved(entity: &EntityDescriptor) -> Result<()> {
    if entity.table_name().starts_with(RESERVED_PREFIX) {
        return Err(Error::argument(
            "entity",
            format!(
                "table name '{}' uses the reserved prefix '{RESERVED_PREFIX}'",
                entity.table_name()
            ),
        ));
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
pub(crate) fn require_source(source: &RowSource) -> Result<()> {
    if source.is_empty() {
        return Err(Error::argument("source", "source collection is empty"));
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
pub(crate) fn require_columns(entity: &EntityDescriptor, columns: &[usize]) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::config(format!(
            "no non-key column selected for '{}'",
            entity.table_name()
        )));
    }
    if let Some(&bad) = columns.iter().find(|&&i| i >= entity.column_count() || entity.is_key(i)) {
        return Err(Error::config(format!(
            "column position {} is not a non-key column of '{}'",
            bad,
            entity.table_name()
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert!(SyncMode::Sync.updates() && SyncMode::Sync.deletes());
        assert!(!SyncMode::SyncWithoutUpdate.updates());
        assert!(!SyncMode::Upsert.deletes());
    }

    #[test]
    fn test_action_labels_parse_padded_values() {
        assert_eq!(ActionLabel::parse("UPDATE"), Some(ActionLabel::Update));
        assert_eq!(ActionLabel::parse("DELETE  "), Some(ActionLabel::Delete));
        assert_eq!(ActionLabel::parse("MERGE"), None);
    }

    #[test]
    fn test_insert_columns_keep_entity_order() {
        let entity = fixtures::products();
        assert_eq!(insert_columns(&entity, &[2]), vec!["id", "price"]);
        assert_eq!(insert_columns(&entity, &[1, 2]), vec!["id", "name", "price"]);
    }

    #[test]
    fn test_dispatch_by_dialect() {
        assert_eq!(generator_for_dialect(Dialect::Sqlite).dialect(), Dialect::Sqlite);
        assert_eq!(generator_for_dialect(Dialect::SqlServer).dialect(), Dialect::SqlServer);
    }

    #[test]
    fn test_key_columns_in_update_set_are_rejected() {
        let entity = fixtures::products();
        assert!(require_columns(&entity, &[0]).is_err());
        assert!(require_columns(&entity, &[]).is_err());
        assert!(require_columns(&entity, &[1]).is_ok());
    }
}
