//! Dialect-aware SQL synthesis for set-based bulk operations.
//!
//! `sqlbulk-query` is the **statement construction layer**. It turns entity
//! metadata, a target filter and a set of source rows into an executable
//! [`BulkPlan`] for one of two dialects.
//!
//! # Role In The Architecture
//!
//! - **Statement builder**: [`SqlWriter`] and clause nodes keep SQL text and
//!   bound parameters in step.
//! - **Filters**: [`Expr`] and [`Target`] describe which rows an operation acts on.
//! - **Column selection**: [`Clusivity`] narrows the columns a mutation touches.
//! - **Input strategy**: [`select_input_mode`] picks inline `VALUES` or a
//!   structured table-valued parameter.
//! - **Generators**: [`SqliteBulkGenerator`] emulates with temp tables,
//!   [`SqlServerBulkGenerator`] uses MERGE/OUTPUT.
//!
//! Plans execute through the `Connection` trait from `sqlbulk-core`; most
//! users reach these types through the `sqlbulk` facade crate.

pub mod clusivity;
pub mod expr;
pub mod generate;
pub mod input;
pub mod sql;
pub mod target;

pub use clusivity::{Clusivity, ColumnSet};
pub use expr::{BinaryOp, Expr};
pub use generate::{
    ACTION_COLUMN, ActionLabel, BulkGenerator, DeleteRequest, InsertRequest, NEW_PREFIX,
    OLD_PREFIX, SqlServerBulkGenerator, SqliteBulkGenerator, SyncMode, SyncRequest, UpdateRequest,
    generator_for_dialect,
};
pub use input::{InputMode, RowSource, Thresholds, select_input_mode};
pub use sql::{BulkPlan, PlanStep, SqlWriter, Statement, ToSql};
pub use target::Target;
