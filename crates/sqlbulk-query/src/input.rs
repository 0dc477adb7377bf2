//! Bulk-input strategy.
//!
//! Source rows reach the database either as inline `VALUES` tuples with one
//! parameter per value, or as a single structured table-valued parameter.
//! The choice is made once per call from the row and column counts.

use crate::sql::{ColumnList, SqlWriter};
use serde::{Deserialize, Serialize};
use sqlbulk_core::{Dialect, TableParam, Value};

/// Limits above which source rows are sent as a structured parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// More rows than this selects the structured path.
    pub row_threshold: usize,
    /// More bound values (rows × columns) than this selects the structured path.
    pub parameter_count_threshold: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            row_threshold: 50,
            parameter_count_threshold: 500,
        }
    }
}

impl Thresholds {
    pub fn new(row_threshold: usize, parameter_count_threshold: usize) -> Self {
        Self {
            row_threshold,
            parameter_count_threshold,
        }
    }

    /// Set the row threshold.
    pub fn row_threshold(mut self, rows: usize) -> Self {
        self.row_threshold = rows;
        self
    }

    /// Set the parameter-count threshold.
    pub fn parameter_count_threshold(mut self, params: usize) -> Self {
        self.parameter_count_threshold = params;
        self
    }

    /// Whether `rows` rows of `columns` columns exceed either limit.
    pub fn use_structured(&self, columns: usize, rows: usize) -> bool {
        rows > self.row_threshold || rows.saturating_mul(columns) > self.parameter_count_threshold
    }
}

/// How source rows are passed to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// `VALUES (...), (...)` with one placeholder per value.
    Inline,
    /// One table-valued parameter.
    Structured,
}

/// Pick the input mode for a call. Dialects without structured parameters
/// always inline.
pub fn select_input_mode(dialect: Dialect, thresholds: &Thresholds, columns: usize, rows: usize) -> InputMode {
    if dialect.supports_structured_params() && thresholds.use_structured(columns, rows) {
        InputMode::Structured
    } else {
        InputMode::Inline
    }
}

/// Source rows in column order, ready to render into a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSource {
    columns: Vec<&'static str>,
    rows: Vec<Vec<Value>>,
    table_type: Option<String>,
}

impl RowSource {
    /// Rows rendered as inline `VALUES` tuples.
    pub fn inline(columns: Vec<&'static str>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            table_type: None,
        }
    }

    /// Rows bound as one structured parameter of the given table type.
    pub fn structured(columns: Vec<&'static str>, rows: Vec<Vec<Value>>, table_type: impl Into<String>) -> Self {
        Self {
            columns,
            rows,
            table_type: Some(table_type.into()),
        }
    }

    pub fn mode(&self) -> InputMode {
        if self.table_type.is_some() {
            InputMode::Structured
        } else {
            InputMode::Inline
        }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn write_values(&self, w: &mut SqlWriter) {
        w.push("VALUES ");
        w.join(self.rows.iter(), ", ", |w, row| {
            w.push("(");
            w.join(row.iter(), ", ", |w, v| {
                w.param(v.clone());
            });
            w.push(")");
        });
    }

    fn write_table_param(&self, w: &mut SqlWriter, type_name: &str) {
        w.param(Value::Table(TableParam {
            type_name: type_name.to_string(),
            columns: self.columns.iter().map(|c| (*c).to_string()).collect(),
            rows: self.rows.clone(),
        }));
    }

    /// Write the source as a common table expression body:
    /// `"alias"("a", "b") AS (VALUES ...)`.
    pub fn write_cte(&self, w: &mut SqlWriter, alias: &str) {
        w.ident(alias)
            .push("(")
            .node(&ColumnList { columns: &self.columns })
            .push(") AS (");
        match &self.table_type {
            Some(type_name) => {
                w.push("SELECT ").node(&ColumnList { columns: &self.columns }).push(" FROM ");
                self.write_table_param(w, type_name);
            }
            None => self.write_values(w),
        }
        w.push(")");
    }

    /// Write the source as a derived table usable in `FROM`, `JOIN` or
    /// `USING`: `(VALUES ...) AS [alias] ([a], [b])` or `@p1 AS [alias]`.
    pub fn write_derived(&self, w: &mut SqlWriter, alias: &str) {
        match &self.table_type {
            Some(type_name) => {
                self.write_table_param(w, type_name);
                w.push(" AS ").ident(alias);
            }
            None => {
                w.push("(");
                self.write_values(w);
                w.push(") AS ")
                    .ident(alias)
                    .push(" (")
                    .node(&ColumnList { columns: &self.columns })
                    .push(")");
            }
        }
    }
}
