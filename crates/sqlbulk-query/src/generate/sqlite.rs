//! SQLite: temp-table emulation.
//!
//! SQLite has neither MERGE nor OUTPUT on a CTE delete, so every operation
//! stages its working set in a connection-local temp table and runs as a
//! transactional sequence: stage, mutate, select the staged rows, drop.

use super::{
    ACTION_COLUMN, ActionLabel, BulkGenerator, DeleteRequest, InsertRequest, NEW_PREFIX,
    OLD_PREFIX, SOURCE, STAGED, SyncMode, SyncRequest, TARGET, UpdateRequest, all_columns,
    columns_at, key_columns, require_columns, require_source, require_unreserved,
};
use crate::expr::{CURRENT, INCOMING};
use crate::sql::{
    BulkPlan, ColumnList, KeyPredicate, PlanStep, Projection, QualifiedColumns, Qualifier,
    SqlWriter, Statement,
};
use crate::target::write_target_select;
use sqlbulk_core::{Dialect, EntityDescriptor, Result, sanitize_identifier};
use std::sync::atomic::{AtomicU64, Ordering};

const TEMP_SCHEMA: &str = "temp";

/// Temp-table based generator for SQLite.
#[derive(Debug, Default)]
pub struct SqliteBulkGenerator {
    next_temp: AtomicU64,
}

impl SqliteBulkGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn temp_name(&self, entity: &EntityDescriptor) -> String {
        let n = self.next_temp.fetch_add(1, Ordering::Relaxed);
        format!("bulk_{}_{}", sanitize_identifier(entity.table_name()), n)
    }

    fn writer() -> SqlWriter {
        SqlWriter::new(Dialect::Sqlite)
    }

    fn select_temp(tmp: &str, columns: &[&str]) -> Statement {
        let mut w = Self::writer();
        w.push("SELECT ")
            .node(&ColumnList { columns })
            .push(" FROM ")
            .qualified(TEMP_SCHEMA, tmp);
        w.finish()
    }

    fn drop_temp(tmp: &str) -> PlanStep {
        let mut w = Self::writer();
        w.push("DROP TABLE ").qualified(TEMP_SCHEMA, tmp);
        PlanStep::Execute(w.finish())
    }

    fn plan(steps: Vec<PlanStep>) -> BulkPlan {
        BulkPlan {
            steps,
            transactional: true,
        }
    }
}

impl BulkGenerator for SqliteBulkGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn delete(&self, req: &DeleteRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        let entity = req.entity;
        let tmp = self.temp_name(entity);
        let columns = all_columns(entity);
        let keys = key_columns(entity);

        let mut w = Self::writer();
        w.push("CREATE TEMP TABLE ").ident(&tmp).push(" AS ");
        write_target_select(&mut w, entity, req.filter);
        let stage = w.finish();

        let mut w = Self::writer();
        w.push("DELETE FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" WHERE EXISTS (SELECT 1 FROM ")
            .qualified(TEMP_SCHEMA, &tmp)
            .push(" AS ")
            .ident(STAGED)
            .push(" WHERE ")
            .node(&KeyPredicate {
                left: STAGED,
                right: entity.table_name(),
                keys: &keys,
            })
            .push(")");
        let delete = w.finish();

        tracing::trace!(table = entity.table_name(), temp = %tmp, "planned sqlite delete");
        Ok(Self::plan(vec![
            PlanStep::Execute(stage),
            PlanStep::Execute(delete),
            PlanStep::Query(Self::select_temp(&tmp, &columns)),
            Self::drop_temp(&tmp),
        ]))
    }

    fn insert_if_not_exist(&self, req: &InsertRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        let entity = req.entity;
        let tmp = self.temp_name(entity);
        let columns = req.source.columns();
        let keys = key_columns(entity);

        let mut w = Self::writer();
        w.push("CREATE TEMP TABLE ").ident(&tmp).push(" AS WITH ");
        req.source.write_cte(&mut w, SOURCE);
        w.push(" SELECT ")
            .node(&QualifiedColumns {
                qualifier: Qualifier::Alias(SOURCE),
                columns,
            })
            .push(" FROM ")
            .ident(SOURCE)
            .push(" WHERE NOT EXISTS (SELECT 1 FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" AS ")
            .ident(TARGET)
            .push(" WHERE ")
            .node(&KeyPredicate {
                left: TARGET,
                right: SOURCE,
                keys: &keys,
            })
            .push(")");
        let stage = w.finish();

        let mut w = Self::writer();
        w.push("INSERT INTO ")
            .table(entity.schema_name(), entity.table_name())
            .push(" (")
            .node(&ColumnList { columns })
            .push(") SELECT ")
            .node(&ColumnList { columns })
            .push(" FROM ")
            .qualified(TEMP_SCHEMA, &tmp);
        let insert = w.finish();

        tracing::trace!(table = entity.table_name(), temp = %tmp, rows = req.source.len(), "planned sqlite insert-if-not-exist");
        Ok(Self::plan(vec![
            PlanStep::Execute(stage),
            PlanStep::Execute(insert),
            PlanStep::Query(Self::select_temp(&tmp, &keys)),
            Self::drop_temp(&tmp),
        ]))
    }

    fn update(&self, req: &UpdateRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        require_columns(req.entity, req.columns)?;
        let entity = req.entity;
        let tmp = self.temp_name(entity);
        let columns = all_columns(entity);
        let keys = key_columns(entity);
        let assigned = columns_at(entity, req.columns);

        let mut w = Self::writer();
        w.push("CREATE TEMP TABLE ").ident(&tmp).push(" AS WITH ");
        req.source.write_cte(&mut w, INCOMING);
        w.push(" SELECT ")
            .node(&QualifiedColumns {
                qualifier: Qualifier::Alias(INCOMING),
                columns: req.source.columns(),
            })
            .push(" FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" AS ")
            .ident(CURRENT)
            .push(" JOIN ")
            .ident(INCOMING)
            .push(" ON ")
            .node(&KeyPredicate {
                left: CURRENT,
                right: INCOMING,
                keys: &keys,
            });
        if let Some(condition) = req.condition {
            w.push(" WHERE ").node(condition);
        }
        let stage = w.finish();

        let mut w = Self::writer();
        w.push("UPDATE ")
            .table(entity.schema_name(), entity.table_name())
            .push(" SET ")
            .join(assigned.iter(), ", ", |w, c| {
                w.ident(c).push(" = ").qualified(STAGED, c);
            })
            .push(" FROM ")
            .qualified(TEMP_SCHEMA, &tmp)
            .push(" AS ")
            .ident(STAGED)
            .push(" WHERE ")
            .node(&KeyPredicate {
                left: entity.table_name(),
                right: STAGED,
                keys: &keys,
            });
        let update = w.finish();

        let mut w = Self::writer();
        w.push("SELECT ")
            .node(&QualifiedColumns {
                qualifier: Qualifier::Alias(TARGET),
                columns: &columns,
            })
            .push(" FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" AS ")
            .ident(TARGET)
            .push(" JOIN ")
            .qualified(TEMP_SCHEMA, &tmp)
            .push(" AS ")
            .ident(STAGED)
            .push(" ON ")
            .node(&KeyPredicate {
                left: TARGET,
                right: STAGED,
                keys: &keys,
            });
        let select = w.finish();

        tracing::trace!(table = entity.table_name(), temp = %tmp, rows = req.source.len(), "planned sqlite update");
        Ok(Self::plan(vec![
            PlanStep::Execute(stage),
            PlanStep::Execute(update),
            PlanStep::Query(select),
            Self::drop_temp(&tmp),
        ]))
    }

    fn sync(&self, req: &SyncRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        require_columns(req.entity, req.insert_columns)?;
        if req.mode.updates() {
            require_columns(req.entity, req.update_columns)?;
        }
        let entity = req.entity;
        let tmp = self.temp_name(entity);
        let columns = all_columns(entity);
        let keys = key_columns(entity);
        let first_key = keys[0];
        let filter = match req.mode {
            SyncMode::Upsert => None,
            SyncMode::Sync | SyncMode::SyncWithoutUpdate => req.filter,
        };

        // Stage one labelled row per action.
        let mut w = Self::writer();
        w.push("CREATE TEMP TABLE ").ident(&tmp).push(" AS WITH ").ident(TARGET).push(" AS (");
        write_target_select(&mut w, entity, filter);
        w.push("), ");
        req.source.write_cte(&mut w, SOURCE);
        w.push(" SELECT CASE WHEN ")
            .qualified(TARGET, first_key)
            .push(" IS NULL THEN '")
            .push(ActionLabel::Insert.as_str())
            .push("' ELSE '")
            .push(ActionLabel::Update.as_str())
            .push("' END AS ")
            .ident(ACTION_COLUMN)
            .push(", ")
            .node(&Projection {
                qualifier: Some(Qualifier::Alias(TARGET)),
                columns: &columns,
                prefix: OLD_PREFIX,
            })
            .push(", ")
            .node(&Projection {
                qualifier: Some(Qualifier::Alias(SOURCE)),
                columns: &columns,
                prefix: NEW_PREFIX,
            })
            .push(" FROM ")
            .ident(SOURCE)
            .push(" LEFT JOIN ")
            .ident(TARGET)
            .push(" ON ")
            .node(&KeyPredicate {
                left: TARGET,
                right: SOURCE,
                keys: &keys,
            });
        if !req.mode.updates() {
            w.push(" WHERE ").qualified(TARGET, first_key).push(" IS NULL");
        }
        if req.mode.deletes() {
            w.push(" UNION ALL SELECT '")
                .push(ActionLabel::Delete.as_str())
                .push("', ")
                .node(&Projection {
                    qualifier: Some(Qualifier::Alias(TARGET)),
                    columns: &columns,
                    prefix: OLD_PREFIX,
                })
                .push(", ")
                .node(&Projection {
                    qualifier: None,
                    columns: &columns,
                    prefix: NEW_PREFIX,
                })
                .push(" FROM ")
                .ident(TARGET)
                .push(" LEFT JOIN ")
                .ident(SOURCE)
                .push(" ON ")
                .node(&KeyPredicate {
                    left: TARGET,
                    right: SOURCE,
                    keys: &keys,
                })
                .push(" WHERE ")
                .qualified(SOURCE, first_key)
                .push(" IS NULL");
        }
        let stage = w.finish();

        let mut steps = vec![PlanStep::Execute(stage)];

        if req.mode.deletes() {
            let mut w = Self::writer();
            w.push("DELETE FROM ")
                .table(entity.schema_name(), entity.table_name())
                .push(" WHERE EXISTS (SELECT 1 FROM ")
                .qualified(TEMP_SCHEMA, &tmp)
                .push(" AS ")
                .ident(STAGED)
                .push(" WHERE ")
                .qualified(STAGED, ACTION_COLUMN)
                .push(" = '")
                .push(ActionLabel::Delete.as_str())
                .push("'");
            for key in &keys {
                w.push(" AND ")
                    .qualified(STAGED, &format!("{OLD_PREFIX}{key}"))
                    .push(" = ")
                    .qualified(entity.table_name(), key);
            }
            w.push(")");
            steps.push(PlanStep::Execute(w.finish()));
        }

        // Excluded insert columns become NULL, which REPLACE turns into the
        // column default for NOT NULL columns; excluded update columns keep
        // the pre-image.
        let mut w = Self::writer();
        w.push("INSERT OR REPLACE INTO ")
            .table(entity.schema_name(), entity.table_name())
            .push(" (")
            .node(&ColumnList { columns: &columns })
            .push(") SELECT ");
        let fields = entity.fields();
        w.join(0..fields.len(), ", ", |w, i| {
            let column = fields[i].column_name;
            let new = format!("{NEW_PREFIX}{column}");
            if entity.is_key(i) {
                w.ident(&new);
                return;
            }
            let inserted = req.insert_columns.contains(&i);
            let updated = req.update_columns.contains(&i);
            if inserted && (updated || !req.mode.updates()) {
                w.ident(&new);
                return;
            }
            w.push("CASE WHEN ")
                .ident(ACTION_COLUMN)
                .push(" = '")
                .push(ActionLabel::Insert.as_str())
                .push("' THEN ");
            if inserted {
                w.ident(&new);
            } else {
                w.push("NULL");
            }
            w.push(" ELSE ");
            if updated {
                w.ident(&new);
            } else {
                w.ident(&format!("{OLD_PREFIX}{column}"));
            }
            w.push(" END");
        });
        w.push(" FROM ")
            .qualified(TEMP_SCHEMA, &tmp)
            .push(" WHERE ")
            .ident(ACTION_COLUMN)
            .push(" <> '")
            .push(ActionLabel::Delete.as_str())
            .push("'");
        steps.push(PlanStep::Execute(w.finish()));

        let mut result_columns = vec![ACTION_COLUMN.to_string()];
        result_columns.extend(columns.iter().map(|c| format!("{OLD_PREFIX}{c}")));
        result_columns.extend(columns.iter().map(|c| format!("{NEW_PREFIX}{c}")));
        let result_refs: Vec<&str> = result_columns.iter().map(String::as_str).collect();
        steps.push(PlanStep::Query(Self::select_temp(&tmp, &result_refs)));
        steps.push(Self::drop_temp(&tmp));

        tracing::trace!(table = entity.table_name(), temp = %tmp, mode = ?req.mode, rows = req.source.len(), "planned sqlite sync");
        Ok(Self::plan(steps))
    }
}
