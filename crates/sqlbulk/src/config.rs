//! Configuration for bulk operations.
//!
//! A [`BulkConfig`] is built once, validated, and then shared immutably by a
//! [`BulkContext`](crate::BulkContext). Per-entity options are keyed by the
//! entity's Rust type.

use serde::{Deserialize, Serialize};
use sqlbulk_core::{Entity, Error, FieldInfo, Result};
use sqlbulk_query::Thresholds;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Overrides the `(column name, storage type)` pairs used when provisioning a
/// table type, e.g. to widen a text column.
pub type ColumnInterceptor = Arc<dyn Fn(&[FieldInfo]) -> Vec<(String, String)> + Send + Sync>;

/// Index kind of the primary key on provisioned table types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableTypeIndex {
    #[default]
    Clustered,
    NonClustered,
}

impl TableTypeIndex {
    pub const fn as_sql(self) -> &'static str {
        match self {
            TableTypeIndex::Clustered => "CLUSTERED",
            TableTypeIndex::NonClustered => "NONCLUSTERED",
        }
    }
}

/// Options for SQL Server table types backing structured parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableTypeOptions {
    /// Schema the types are created in.
    pub schema: String,
    /// Create memory-optimized types. Requires a nonclustered key index.
    pub memory_optimized: bool,
    pub index: TableTypeIndex,
}

impl Default for TableTypeOptions {
    fn default() -> Self {
        Self {
            schema: "dbo".to_string(),
            memory_optimized: false,
            index: TableTypeIndex::Clustered,
        }
    }
}

impl TableTypeOptions {
    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Enable or disable memory-optimized types.
    pub fn memory_optimized(mut self, enabled: bool) -> Self {
        self.memory_optimized = enabled;
        self
    }

    /// Set the key index kind.
    pub fn index(mut self, index: TableTypeIndex) -> Self {
        self.index = index;
        self
    }
}

/// Options for one entity type.
#[derive(Clone, Default)]
pub struct EntityOptions {
    /// Replaces the global thresholds for this entity.
    pub thresholds: Option<Thresholds>,
    /// The table has row-modifying triggers; OUTPUT is staged through a
    /// table variable.
    pub has_triggers: bool,
    pub column_interceptor: Option<ColumnInterceptor>,
}

impl fmt::Debug for EntityOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityOptions")
            .field("thresholds", &self.thresholds)
            .field("has_triggers", &self.has_triggers)
            .field("column_interceptor", &self.column_interceptor.is_some())
            .finish()
    }
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the input thresholds.
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Mark the table as having triggers.
    pub fn has_triggers(mut self, value: bool) -> Self {
        self.has_triggers = value;
        self
    }

    /// Install a column-type interceptor.
    pub fn column_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&[FieldInfo]) -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.column_interceptor = Some(Arc::new(interceptor));
        self
    }
}

/// Configuration shared by every operation of a context.
#[derive(Debug, Clone, Default)]
pub struct BulkConfig {
    /// Input thresholds for entities without an override.
    pub thresholds: Thresholds,
    pub table_types: TableTypeOptions,
    entities: HashMap<TypeId, EntityOptions>,
}

impl BulkConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global input thresholds.
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the table-type options.
    pub fn table_types(mut self, options: TableTypeOptions) -> Self {
        self.table_types = options;
        self
    }

    /// Register options for entity `M`, replacing any earlier registration.
    pub fn entity<M: Entity>(mut self, options: EntityOptions) -> Self {
        self.entities.insert(TypeId::of::<M>(), options);
        self
    }

    /// Options registered for entity `M`.
    pub fn entity_options<M: Entity>(&self) -> Option<&EntityOptions> {
        self.entities.get(&TypeId::of::<M>())
    }

    /// Effective thresholds for entity `M`.
    pub fn thresholds_for<M: Entity>(&self) -> Thresholds {
        self.entity_options::<M>()
            .and_then(|o| o.thresholds)
            .unwrap_or(self.thresholds)
    }

    /// Whether entity `M`'s table has triggers.
    pub fn has_triggers<M: Entity>(&self) -> bool {
        self.entity_options::<M>().is_some_and(|o| o.has_triggers)
    }

    /// Column-type interceptor for entity `M`, if any.
    pub fn interceptor_for<M: Entity>(&self) -> Option<&ColumnInterceptor> {
        self.entity_options::<M>()
            .and_then(|o| o.column_interceptor.as_ref())
    }

    /// Check the configuration for values no operation can work with.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        check_thresholds(&self.thresholds, "global")?;
        for options in self.entities.values() {
            if let Some(t) = &options.thresholds {
                check_thresholds(t, "entity")?;
            }
        }
        if self.table_types.schema.trim().is_empty() {
            return Err(Error::config("table type schema must not be empty"));
        }
        if self.table_types.memory_optimized && self.table_types.index == TableTypeIndex::Clustered {
            return Err(Error::config(
                "memory-optimized table types require a nonclustered key index",
            ));
        }
        Ok(())
    }
}

#[allow(clippy::result_large_err)]
fn check_thresholds(thresholds: &Thresholds, scope: &str) -> Result<()> {
    if thresholds.row_threshold == 0 || thresholds.parameter_count_threshold == 0 {
        return Err(Error::config(format!(
            "{scope} thresholds must be greater than zero (rows: {}, parameters: {})",
            thresholds.row_threshold, thresholds.parameter_count_threshold
        )));
    }
    Ok(())
}
