//! sqlbulk - set-based bulk operations for SQLite and SQL Server.
//!
//! One call moves a whole collection of entities through the database:
//!
//! - [`BulkContext::delete`] removes every row matched by a [`Target`] and
//!   returns the deleted rows
//! - [`BulkContext::insert_if_not_exist`] inserts only rows whose key is new
//! - [`BulkContext::update`] updates rows by key, optionally gated by a
//!   condition over the stored (`current`) and supplied (`incoming`) row
//! - [`BulkContext::sync`], [`BulkContext::sync_without_update`] and
//!   [`BulkContext::upsert`] reconcile a target with a source collection and
//!   report what was inserted, updated and deleted
//!
//! SQL Server runs each operation as a single MERGE/OUTPUT statement and sends
//! large collections as one table-valued parameter. SQLite emulates the same
//! semantics with temp tables inside a transaction.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbulk::prelude::*;
//!
//! async fn nightly(cx: &Cx, conn: impl Connection, prices: Vec<Price>) {
//!     let bulk = BulkContext::new(conn);
//!     let target = Target::<Price>::all().filter(Expr::col("region").eq("eu"));
//!     match bulk.sync(cx, &target, &prices, SyncOptions::new()).await {
//!         Outcome::Ok(result) => println!("{} rows changed", result.total()),
//!         Outcome::Err(e) => eprintln!("sync failed: {e}"),
//!         Outcome::Cancelled(_) | Outcome::Panicked(_) => {}
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod decode;
mod execute;
pub mod provision;
pub mod results;

pub use config::{BulkConfig, ColumnInterceptor, EntityOptions, TableTypeIndex, TableTypeOptions};
pub use context::{BulkContext, SyncOptions, UpdateOptions};
pub use decode::{EntityDecoder, SyncAction};
pub use provision::{TableTypeCache, TableTypeProvisioner};
pub use results::{SyncResult, SyncWithoutUpdateResult, UpsertResult};

pub use sqlbulk_core::{
    Budget,
    Connection,
    Cx,
    Dialect,
    Entity,
    EntityDescriptor,
    Error,
    Field,
    FieldInfo,
    IsolationLevel,
    Outcome,
    RegionId,
    Result,
    Row,
    SqlType,
    TableParam,
    TaskId,
    TransactionOps,
    Value,
};
pub use sqlbulk_query::{
    BulkGenerator, BulkPlan, Clusivity, ColumnSet, Expr, InputMode, SyncMode, Target, Thresholds,
    generator_for_dialect,
};

/// Everything needed to run bulk operations.
pub mod prelude {
    pub use crate::{
        BulkConfig, BulkContext, Clusivity, ColumnSet, Connection, Cx, Entity, EntityOptions,
        Error, Expr, Field, FieldInfo, Outcome, Result, Row, SqlType, SyncOptions, SyncResult,
        SyncWithoutUpdateResult, Target, Thresholds, UpdateOptions, UpsertResult, Value,
    };
}
