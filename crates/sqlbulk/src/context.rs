//! The bulk operations facade.

use crate::config::BulkConfig;
use crate::decode::{EntityDecoder, SyncAction};
use crate::execute::run_plan;
use crate::provision::{TableTypeCache, TableTypeProvisioner};
use crate::results::{SyncResult, SyncWithoutUpdateResult, UpsertResult};
use asupersync::{Cx, Outcome};
use sqlbulk_core::{Connection, Entity, EntityDescriptor, Error, Result, Row, RowKey, Value};
use sqlbulk_query::expr::{CURRENT, INCOMING};
use sqlbulk_query::{
    BulkGenerator, BulkPlan, Clusivity, DeleteRequest, Expr, InputMode, InsertRequest, RowSource, SyncMode,
    SyncRequest, Target, UpdateRequest, generator_for_dialect, select_input_mode,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Options for [`BulkContext::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Non-key columns to assign.
    pub columns: Clusivity,
    /// Row condition over [`Expr::current`] (the stored row) and
    /// [`Expr::incoming`] (the source row); rows where it does not hold are
    /// left alone.
    pub condition: Option<Expr>,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: Clusivity) -> Self {
        self.columns = columns;
        self
    }

    pub fn condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Options for the sync family of operations.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Non-key columns written when a row is inserted.
    ///
    /// Excluded columns are left to the database, which may store a column
    /// default or NULL. The returned inserted entities do not read them
    /// back: they carry the `M::default()` value for every excluded column.
    pub insert_columns: Clusivity,
    /// Non-key columns written when a row is updated.
    pub update_columns: Clusivity,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_columns(mut self, columns: Clusivity) -> Self {
        self.insert_columns = columns;
        self
    }

    pub fn update_columns(mut self, columns: Clusivity) -> Self {
        self.update_columns = columns;
        self
    }
}

/// Set-based bulk operations over one connection.
///
/// Every operation takes a `Cx`; cancellation is observed before each
/// statement and before each result row is decoded, and surfaces as
/// `Outcome::Cancelled`. Multi-statement plans run in their own transaction.
///
/// # Example
///
/// ```ignore
/// let bulk = BulkContext::new(conn);
/// let result = bulk
///     .sync(&cx, &Target::<Product>::all().filter(Expr::col("shop").eq(7)), &products, SyncOptions::new())
///     .await;
/// ```
pub struct BulkContext<C: Connection> {
    conn: C,
    config: Arc<BulkConfig>,
    cache: Arc<TableTypeCache>,
    generator: Box<dyn BulkGenerator>,
}

impl<C: Connection + fmt::Debug> fmt::Debug for BulkContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkContext")
            .field("conn", &self.conn)
            .field("config", &self.config)
            .field("dialect", &self.generator.dialect())
            .finish_non_exhaustive()
    }
}

impl<C: Connection> BulkContext<C> {
    /// Create a context with the default configuration.
    pub fn new(conn: C) -> Self {
        let generator = generator_for_dialect(conn.dialect());
        Self {
            conn,
            config: Arc::new(BulkConfig::default()),
            cache: Arc::new(TableTypeCache::new()),
            generator,
        }
    }

    /// Create a context with a validated configuration.
    #[allow(clippy::result_large_err)]
    pub fn with_config(conn: C, config: BulkConfig) -> Result<Self> {
        config.validate()?;
        let generator = generator_for_dialect(conn.dialect());
        Ok(Self {
            conn,
            config: Arc::new(config),
            cache: Arc::new(TableTypeCache::new()),
            generator,
        })
    }

    /// Share a table-type cache with other contexts on the same database.
    pub fn with_cache(mut self, cache: Arc<TableTypeCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TableTypeCache> {
        &self.cache
    }

    /// Consume the context, returning the connection.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Delete every row matched by `target`, returning the deleted rows.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME))]
    pub async fn delete<M: Entity>(&self, cx: &Cx, target: &Target<M>) -> Outcome<Vec<M>, Error> {
        let entity = match EntityDescriptor::of::<M>() {
            Ok(entity) => entity,
            Err(e) => return Outcome::Err(e),
        };
        self.delete_described(cx, &entity, target).await
    }

    async fn delete_described<M: Entity>(
        &self,
        cx: &Cx,
        entity: &EntityDescriptor,
        target: &Target<M>,
    ) -> Outcome<Vec<M>, Error> {
        let plan = match self.generator.delete(&DeleteRequest {
            entity,
            filter: target.filter_expr(),
            has_triggers: self.config.has_triggers::<M>(),
        }) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };

        let rows = match self.run(cx, &plan).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let decoder = EntityDecoder::<M>::new(entity, self.conn.dialect(), &[]);
        decode_rows(cx, &rows, |row| decoder.decode_full(row))
    }

    /// Insert the rows of `source` whose key is not in the table, returning
    /// the inserted rows. Existing rows are never modified.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME, rows = source.len()))]
    pub async fn insert_if_not_exist<M: Entity>(&self, cx: &Cx, source: &[M]) -> Outcome<Vec<M>, Error> {
        let entity = match EntityDescriptor::of::<M>() {
            Ok(entity) => entity,
            Err(e) => return Outcome::Err(e),
        };
        let values = match source_values(&entity, source) {
            Ok(values) => values,
            Err(e) => return Outcome::Err(e),
        };
        if values.is_empty() {
            return Outcome::Ok(Vec::new());
        }

        let row_source = match self.row_source::<M>(cx, &entity, values.clone()).await {
            Outcome::Ok(s) => s,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let plan = match self.generator.insert_if_not_exist(&InsertRequest {
            entity: &entity,
            source: &row_source,
            has_triggers: self.config.has_triggers::<M>(),
        }) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };

        let rows = match self.run(cx, &plan).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let decoder = EntityDecoder::<M>::new(&entity, self.conn.dialect(), &values);
        decode_rows(cx, &rows, |row| decoder.decode_inserted(row, entity.non_key_indices()))
    }

    /// Update the stored rows matching `source` by key, returning their
    /// post-update images.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME, rows = source.len()))]
    pub async fn update<M: Entity>(
        &self,
        cx: &Cx,
        source: &[M],
        options: UpdateOptions,
    ) -> Outcome<Vec<M>, Error> {
        let entity = match EntityDescriptor::of::<M>() {
            Ok(entity) => entity,
            Err(e) => return Outcome::Err(e),
        };
        let prepared = options
            .columns
            .resolve(&entity)
            .and_then(|columns| {
                if let Some(condition) = &options.condition {
                    check_condition(&entity, condition)?;
                }
                Ok(columns)
            })
            .and_then(|columns| Ok((columns, source_values(&entity, source)?)));
        let (columns, values) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::Err(e),
        };
        if values.is_empty() {
            return Outcome::Ok(Vec::new());
        }

        let row_source = match self.row_source::<M>(cx, &entity, values).await {
            Outcome::Ok(s) => s,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let plan = match self.generator.update(&UpdateRequest {
            entity: &entity,
            source: &row_source,
            columns: &columns,
            condition: options.condition.as_ref(),
            has_triggers: self.config.has_triggers::<M>(),
        }) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };

        let rows = match self.run(cx, &plan).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let decoder = EntityDecoder::<M>::new(&entity, self.conn.dialect(), &[]);
        decode_rows(cx, &rows, |row| decoder.decode_full(row))
    }

    /// Make the rows matched by `target` equal to `source`: insert missing
    /// keys, update shared keys, delete keys absent from `source`.
    ///
    /// Reported entities are rebuilt from the source and the pre-images, not
    /// re-read: columns excluded by [`SyncOptions::insert_columns`] hold
    /// `M::default()` values on inserted entities even when the table stored
    /// a column default, and columns excluded by
    /// [`SyncOptions::update_columns`] hold the pre-image values.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME, rows = source.len()))]
    pub async fn sync<M: Entity>(
        &self,
        cx: &Cx,
        target: &Target<M>,
        source: &[M],
        options: SyncOptions,
    ) -> Outcome<SyncResult<M>, Error> {
        self.sync_with_mode(cx, target, source, &options, SyncMode::Sync)
            .await
    }

    /// Like [`sync`](Self::sync), but rows present on both sides are left
    /// untouched and not reported.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME, rows = source.len()))]
    pub async fn sync_without_update<M: Entity>(
        &self,
        cx: &Cx,
        target: &Target<M>,
        source: &[M],
        options: SyncOptions,
    ) -> Outcome<SyncWithoutUpdateResult<M>, Error> {
        match self
            .sync_with_mode(cx, target, source, &options, SyncMode::SyncWithoutUpdate)
            .await
        {
            Outcome::Ok(result) => Outcome::Ok(result.into()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Insert or update every row of `source` against the whole table.
    /// Nothing is deleted. Excluded columns are reported as for
    /// [`sync`](Self::sync).
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::TABLE_NAME, rows = source.len()))]
    pub async fn upsert<M: Entity>(
        &self,
        cx: &Cx,
        source: &[M],
        options: SyncOptions,
    ) -> Outcome<UpsertResult<M>, Error> {
        match self
            .sync_with_mode(cx, &Target::all(), source, &options, SyncMode::Upsert)
            .await
        {
            Outcome::Ok(result) => Outcome::Ok(result.into()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    async fn sync_with_mode<M: Entity>(
        &self,
        cx: &Cx,
        target: &Target<M>,
        source: &[M],
        options: &SyncOptions,
        mode: SyncMode,
    ) -> Outcome<SyncResult<M>, Error> {
        let entity = match EntityDescriptor::of::<M>() {
            Ok(entity) => entity,
            Err(e) => return Outcome::Err(e),
        };
        let prepared = options.insert_columns.resolve(&entity).and_then(|insert| {
            let update = if mode.updates() {
                options.update_columns.resolve(&entity)?
            } else {
                Vec::new()
            };
            Ok((insert, update, source_values(&entity, source)?))
        });
        let (insert_columns, update_columns, values) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::Err(e),
        };

        if values.is_empty() {
            if !mode.deletes() {
                return Outcome::Ok(SyncResult::default());
            }
            // Every target row is absent from the source.
            return match self.delete_described(cx, &entity, target).await {
                Outcome::Ok(deleted) => Outcome::Ok(SyncResult {
                    deleted,
                    ..SyncResult::default()
                }),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            };
        }

        let row_source = match self.row_source::<M>(cx, &entity, values.clone()).await {
            Outcome::Ok(s) => s,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let plan = match self.generator.sync(&SyncRequest {
            entity: &entity,
            filter: target.filter_expr(),
            source: &row_source,
            insert_columns: &insert_columns,
            update_columns: &update_columns,
            mode,
            has_triggers: self.config.has_triggers::<M>(),
        }) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };

        let rows = match self.run(cx, &plan).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let decoder = EntityDecoder::<M>::new(&entity, self.conn.dialect(), &values);
        let mut result = SyncResult::default();
        for row in &rows {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            match decoder.decode_sync_row(row, mode, &insert_columns, &update_columns) {
                Ok(SyncAction::Inserted(m)) => result.inserted.push(m),
                Ok(SyncAction::Updated(old, new)) => result.updated.push((old, new)),
                Ok(SyncAction::Deleted(m)) => result.deleted.push(m),
                Err(e) => return Outcome::Err(e),
            }
        }
        debug_assert!(buckets_disjoint(&result), "sync result buckets share a key");

        tracing::debug!(
            inserted = result.inserted.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            "Sync complete"
        );
        Outcome::Ok(result)
    }

    /// Render source values inline or as a structured parameter, provisioning
    /// the table type when needed.
    async fn row_source<M: Entity>(
        &self,
        cx: &Cx,
        entity: &EntityDescriptor,
        values: Vec<Vec<Value>>,
    ) -> Outcome<RowSource, Error> {
        let dialect = self.conn.dialect();
        let columns: Vec<&'static str> = entity.fields().iter().map(|f| f.column_name).collect();
        let thresholds = self.config.thresholds_for::<M>();
        let mode = select_input_mode(dialect, &thresholds, columns.len(), values.len());
        tracing::debug!(?dialect, ?mode, rows = values.len(), "Selected bulk input mode");

        match mode {
            InputMode::Inline => Outcome::Ok(RowSource::inline(columns, values)),
            InputMode::Structured => {
                let provisioner = TableTypeProvisioner::new(&self.cache, &self.config.table_types);
                match provisioner
                    .ensure(cx, &self.conn, entity, self.config.interceptor_for::<M>())
                    .await
                {
                    Outcome::Ok(type_name) => {
                        Outcome::Ok(RowSource::structured(columns, values, type_name))
                    }
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
        }
    }

    async fn run(&self, cx: &Cx, plan: &BulkPlan) -> Outcome<Vec<Row>, Error> {
        tracing::debug!(
            steps = plan.steps.len(),
            params = plan.param_count(),
            transactional = plan.transactional,
            "Running bulk plan"
        );
        run_plan(cx, &self.conn, plan).await
    }
}

/// Column-ordered values of every source entity, rejecting NULL and
/// duplicate keys.
#[allow(clippy::result_large_err)]
fn source_values<M: Entity>(entity: &EntityDescriptor, source: &[M]) -> Result<Vec<Vec<Value>>> {
    let mut seen = HashSet::with_capacity(source.len());
    let mut values = Vec::with_capacity(source.len());
    for (i, item) in source.iter().enumerate() {
        let row = entity.values_of(item);
        let key = RowKey::new(&entity.key_values(&row));
        if key.has_null() {
            return Err(Error::argument(
                "source",
                format!("row {i} has a NULL primary key value"),
            ));
        }
        if !seen.insert(key) {
            return Err(Error::argument(
                "source",
                format!("row {i} repeats the primary key of an earlier row"),
            ));
        }
        values.push(row);
    }
    Ok(values)
}

/// Condition columns must be entity columns qualified by `current` or
/// `incoming`.
#[allow(clippy::result_large_err)]
fn check_condition(entity: &EntityDescriptor, condition: &Expr) -> Result<()> {
    for (qualifier, column) in condition.columns() {
        match qualifier {
            Some(q) if q == CURRENT || q == INCOMING => {}
            _ => {
                return Err(Error::argument(
                    "condition",
                    format!("column '{column}' must be referenced through Expr::current or Expr::incoming"),
                ));
            }
        }
        if entity.index_of(column).is_none() {
            return Err(Error::argument(
                "condition",
                format!("unknown column '{column}' in update condition"),
            ));
        }
    }
    Ok(())
}

fn decode_rows<M, F>(cx: &Cx, rows: &[Row], mut decode: F) -> Outcome<Vec<M>, Error>
where
    F: FnMut(&Row) -> Result<M>,
{
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        match decode(row) {
            Ok(m) => out.push(m),
            Err(e) => return Outcome::Err(e),
        }
    }
    Outcome::Ok(out)
}

fn buckets_disjoint<M: Entity>(result: &SyncResult<M>) -> bool {
    let mut seen = HashSet::new();
    result
        .inserted
        .iter()
        .chain(result.deleted.iter())
        .chain(result.updated.iter().map(|(_, new)| new))
        .all(|m| seen.insert(RowKey::new(&m.primary_key_value())))
}
