//! Declarative target filters.

use crate::expr::Expr;
use crate::sql::{ColumnList, SqlWriter};
use sqlbulk_core::{Entity, EntityDescriptor};
use std::marker::PhantomData;

/// The rows of `M`'s table an operation acts on: the whole table, or the
/// subset matching a filter.
///
/// ```ignore
/// let stale = Target::<Session>::all().filter(Expr::col("expires_at").lt(now));
/// ```
#[derive(Debug, Clone)]
pub struct Target<M: Entity> {
    filter: Option<Expr>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Entity> Default for Target<M> {
    fn default() -> Self {
        Self::all()
    }
}

impl<M: Entity> Target<M> {
    /// Every row of the table.
    pub fn all() -> Self {
        Self {
            filter: None,
            _marker: PhantomData,
        }
    }

    /// Restrict the target; repeated calls are combined with AND.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// The compiled filter, if any.
    pub fn filter_expr(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }
}

/// Write `SELECT <all columns> FROM <table> [WHERE <filter>]`.
pub fn write_target_select(w: &mut SqlWriter, entity: &EntityDescriptor, filter: Option<&Expr>) {
    let columns: Vec<&str> = entity.fields().iter().map(|f| f.column_name).collect();
    w.push("SELECT ")
        .node(&ColumnList { columns: &columns })
        .push(" FROM ")
        .table(entity.schema_name(), entity.table_name());
    if let Some(filter) = filter {
        w.push(" WHERE ").node(filter);
    }
}
