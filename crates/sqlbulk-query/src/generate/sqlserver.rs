//! SQL Server: native MERGE/OUTPUT.
//!
//! Every operation is one batch whose OUTPUT clause streams the result rows.
//! Tables with triggers reject a bare OUTPUT, so for them the rows go
//! `OUTPUT ... INTO @out` and the batch ends by selecting the table variable.

use super::{
    ACTION_COLUMN, BulkGenerator, DeleteRequest, InsertRequest, NEW_PREFIX, OLD_PREFIX, SOURCE,
    SyncMode, SyncRequest, TARGET, UpdateRequest, all_columns, columns_at, insert_columns,
    key_columns, require_columns, require_source, require_unreserved,
};
use crate::expr::{CURRENT, INCOMING};
use crate::sql::{BulkPlan, ColumnList, KeyPredicate, QualifiedColumns, Qualifier, SqlWriter};
use crate::target::write_target_select;
use sqlbulk_core::{Dialect, EntityDescriptor, Result};

const OUT_VAR: &str = "@out";

/// One column emitted by an OUTPUT clause.
struct OutputColumn {
    /// `INSERTED`, `DELETED`, or `$action` when `column` is empty.
    source: &'static str,
    column: &'static str,
    alias: String,
    storage_type: String,
}

/// MERGE/OUTPUT generator for SQL Server.
#[derive(Debug, Default)]
pub struct SqlServerBulkGenerator;

impl SqlServerBulkGenerator {
    pub fn new() -> Self {
        Self
    }

    fn writer() -> SqlWriter {
        SqlWriter::new(Dialect::SqlServer)
    }

    fn columns_from(entity: &EntityDescriptor, source: &'static str, names: &[&'static str]) -> Vec<OutputColumn> {
        names
            .iter()
            .map(|&c| OutputColumn {
                source,
                column: c,
                alias: c.to_string(),
                storage_type: Self::storage_type_of(entity, c),
            })
            .collect()
    }

    fn storage_type_of(entity: &EntityDescriptor, column: &str) -> String {
        entity
            .index_of(column)
            .map(|i| Dialect::SqlServer.storage_type(&entity.fields()[i]))
            .unwrap_or_else(|| "SQL_VARIANT".to_string())
    }

    /// `DECLARE @out TABLE ([a] BIGINT, ...); ` when staging is needed.
    fn write_declare(w: &mut SqlWriter, staged: bool, outputs: &[OutputColumn]) {
        if !staged {
            return;
        }
        w.push("DECLARE ").push(OUT_VAR).push(" TABLE (");
        w.join(outputs.iter(), ", ", |w, o| {
            w.ident(&o.alias).push(" ").push(&o.storage_type);
        });
        w.push("); ");
    }

    /// ` OUTPUT ...[ INTO @out]`
    fn write_output(w: &mut SqlWriter, staged: bool, aliased: bool, outputs: &[OutputColumn]) {
        w.push(" OUTPUT ");
        w.join(outputs.iter(), ", ", |w, o| {
            if o.column.is_empty() {
                w.push(o.source);
            } else {
                w.push(o.source).push(".").ident(o.column);
            }
            if aliased && !staged {
                w.push(" AS ").ident(&o.alias);
            }
        });
        if staged {
            w.push(" INTO ").push(OUT_VAR);
        }
    }

    /// `; SELECT [a], ... FROM @out` when staging is needed.
    fn write_staged_select(w: &mut SqlWriter, staged: bool, outputs: &[OutputColumn]) {
        if !staged {
            return;
        }
        w.push(" SELECT ");
        w.join(outputs.iter(), ", ", |w, o| {
            w.ident(&o.alias);
        });
        w.push(" FROM ").push(OUT_VAR).push(";");
    }

    fn write_identity_insert(w: &mut SqlWriter, entity: &EntityDescriptor, on: bool) {
        if !entity.has_generated_key() {
            return;
        }
        w.push("SET IDENTITY_INSERT ")
            .table(entity.schema_name(), entity.table_name())
            .push(if on { " ON; " } else { " OFF;" });
    }
}

impl BulkGenerator for SqlServerBulkGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn delete(&self, req: &DeleteRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        let entity = req.entity;
        let staged = req.has_triggers;
        let outputs = Self::columns_from(entity, "DELETED", &all_columns(entity));

        let mut w = Self::writer();
        Self::write_declare(&mut w, staged, &outputs);
        w.push("WITH ").ident(TARGET).push(" AS (");
        write_target_select(&mut w, entity, req.filter);
        w.push(") DELETE FROM ").ident(TARGET);
        Self::write_output(&mut w, staged, false, &outputs);
        w.push(";");
        Self::write_staged_select(&mut w, staged, &outputs);

        tracing::trace!(table = entity.table_name(), staged, "planned sql server delete");
        Ok(BulkPlan::single(w.finish()))
    }

    fn insert_if_not_exist(&self, req: &InsertRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        let entity = req.entity;
        let staged = req.has_triggers;
        let columns = req.source.columns();
        let keys = key_columns(entity);
        let outputs = Self::columns_from(entity, "INSERTED", &keys);

        let mut w = Self::writer();
        Self::write_identity_insert(&mut w, entity, true);
        Self::write_declare(&mut w, staged, &outputs);
        w.push("INSERT INTO ")
            .table(entity.schema_name(), entity.table_name())
            .push(" (")
            .node(&ColumnList { columns })
            .push(")");
        Self::write_output(&mut w, staged, false, &outputs);
        w.push(" SELECT ").node(&QualifiedColumns {
            qualifier: Qualifier::Alias(SOURCE),
            columns,
        });
        w.push(" FROM ");
        req.source.write_derived(&mut w, SOURCE);
        w.push(" WHERE NOT EXISTS (SELECT 1 FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" AS ")
            .ident(TARGET)
            .push(" WHERE ")
            .node(&KeyPredicate {
                left: TARGET,
                right: SOURCE,
                keys: &keys,
            })
            .push(");");
        if entity.has_generated_key() {
            w.push(" ");
            Self::write_identity_insert(&mut w, entity, false);
        }
        Self::write_staged_select(&mut w, staged, &outputs);

        tracing::trace!(table = entity.table_name(), staged, mode = ?req.source.mode(), rows = req.source.len(), "planned sql server insert-if-not-exist");
        Ok(BulkPlan::single(w.finish()))
    }

    fn update(&self, req: &UpdateRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        require_columns(req.entity, req.columns)?;
        let entity = req.entity;
        let staged = req.has_triggers;
        let keys = key_columns(entity);
        let assigned = columns_at(entity, req.columns);
        let outputs = Self::columns_from(entity, "INSERTED", &all_columns(entity));

        let mut w = Self::writer();
        Self::write_declare(&mut w, staged, &outputs);
        w.push("UPDATE ")
            .ident(CURRENT)
            .push(" SET ")
            .join(assigned.iter(), ", ", |w, c| {
                w.ident(c).push(" = ").qualified(INCOMING, c);
            });
        Self::write_output(&mut w, staged, false, &outputs);
        w.push(" FROM ")
            .table(entity.schema_name(), entity.table_name())
            .push(" AS ")
            .ident(CURRENT)
            .push(" INNER JOIN ");
        req.source.write_derived(&mut w, INCOMING);
        w.push(" ON ").node(&KeyPredicate {
            left: CURRENT,
            right: INCOMING,
            keys: &keys,
        });
        if let Some(condition) = req.condition {
            w.push(" WHERE ").node(condition);
        }
        w.push(";");
        Self::write_staged_select(&mut w, staged, &outputs);

        tracing::trace!(table = entity.table_name(), staged, mode = ?req.source.mode(), rows = req.source.len(), "planned sql server update");
        Ok(BulkPlan::single(w.finish()))
    }

    fn sync(&self, req: &SyncRequest<'_>) -> Result<BulkPlan> {
        require_unreserved(req.entity)?;
        require_source(req.source)?;
        require_columns(req.entity, req.insert_columns)?;
        if req.mode.updates() {
            require_columns(req.entity, req.update_columns)?;
        }
        let entity = req.entity;
        let staged = req.has_triggers;
        let keys = key_columns(entity);
        let columns = all_columns(entity);
        let inserted = insert_columns(entity, req.insert_columns);
        let updated = columns_at(entity, req.update_columns);

        let mut outputs = vec![OutputColumn {
            source: "$action",
            column: "",
            alias: ACTION_COLUMN.to_string(),
            storage_type: "NVARCHAR(10)".to_string(),
        }];
        outputs.extend(columns.iter().map(|&c| OutputColumn {
            source: "DELETED",
            column: c,
            alias: format!("{OLD_PREFIX}{c}"),
            storage_type: Self::storage_type_of(entity, c),
        }));
        outputs.extend(keys.iter().map(|&c| OutputColumn {
            source: "INSERTED",
            column: c,
            alias: format!("{NEW_PREFIX}{c}"),
            storage_type: Self::storage_type_of(entity, c),
        }));

        let mut w = Self::writer();
        Self::write_identity_insert(&mut w, entity, true);
        Self::write_declare(&mut w, staged, &outputs);
        match req.mode {
            SyncMode::Upsert => {
                w.push("MERGE INTO ")
                    .table(entity.schema_name(), entity.table_name())
                    .push(" AS ")
                    .ident(TARGET);
            }
            SyncMode::Sync | SyncMode::SyncWithoutUpdate => {
                w.push("WITH ").ident(TARGET).push(" AS (");
                write_target_select(&mut w, entity, req.filter);
                w.push(") MERGE INTO ").ident(TARGET);
            }
        }
        w.push(" USING ");
        req.source.write_derived(&mut w, SOURCE);
        w.push(" ON ")
            .node(&KeyPredicate {
                left: TARGET,
                right: SOURCE,
                keys: &keys,
            })
            .push(" WHEN NOT MATCHED BY TARGET THEN INSERT (")
            .node(&ColumnList { columns: &inserted })
            .push(") VALUES (")
            .node(&QualifiedColumns {
                qualifier: Qualifier::Alias(SOURCE),
                columns: &inserted,
            })
            .push(")");
        if req.mode.updates() {
            w.push(" WHEN MATCHED THEN UPDATE SET ")
                .join(updated.iter(), ", ", |w, c| {
                    w.ident(c).push(" = ").qualified(SOURCE, c);
                });
        }
        if req.mode.deletes() {
            w.push(" WHEN NOT MATCHED BY SOURCE THEN DELETE");
        }
        Self::write_output(&mut w, staged, true, &outputs);
        w.push(";");
        if entity.has_generated_key() {
            w.push(" ");
            Self::write_identity_insert(&mut w, entity, false);
        }
        Self::write_staged_select(&mut w, staged, &outputs);

        tracing::trace!(table = entity.table_name(), staged, mode = ?req.mode, input = ?req.source.mode(), rows = req.source.len(), "planned sql server merge");
        Ok(BulkPlan::single(w.finish()))
    }
}
