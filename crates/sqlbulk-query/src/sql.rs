//! Structured statement construction.
//!
//! `SqlWriter` owns the SQL text and the parameter list together, so every
//! placeholder it emits is numbered in the order its value was bound. Clause
//! nodes implement [`ToSql`] and write themselves into a writer.

use sqlbulk_core::{Dialect, Value};

/// A single executable statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One step of a bulk plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Run for effect; rows affected are ignored.
    Execute(Statement),
    /// Run and keep the returned rows as the operation's result.
    Query(Statement),
}

impl PlanStep {
    pub fn statement(&self) -> &Statement {
        match self {
            PlanStep::Execute(s) | PlanStep::Query(s) => s,
        }
    }
}

/// An ordered sequence of statements implementing one bulk operation.
///
/// Exactly one step is a [`PlanStep::Query`]; its rows are the raw result.
/// Transactional plans must run inside a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkPlan {
    pub steps: Vec<PlanStep>,
    pub transactional: bool,
}

impl BulkPlan {
    /// A plan made of one result-producing statement.
    pub fn single(statement: Statement) -> Self {
        Self {
            steps: vec![PlanStep::Query(statement)],
            transactional: false,
        }
    }

    /// The result-producing statement.
    pub fn result_statement(&self) -> Option<&Statement> {
        self.steps.iter().find_map(|step| match step {
            PlanStep::Query(s) => Some(s),
            PlanStep::Execute(_) => None,
        })
    }

    /// Total number of bound parameters across every step.
    pub fn param_count(&self) -> usize {
        self.steps.iter().map(|s| s.statement().params.len()).sum()
    }
}

/// Something that can render itself into a statement.
pub trait ToSql {
    fn to_sql(&self, w: &mut SqlWriter);
}

/// Accumulates SQL text and bound parameters for one statement.
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(256),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Append `qualifier.name`, both quoted.
    pub fn qualified(&mut self, qualifier: &str, name: &str) -> &mut Self {
        self.ident(qualifier).push(".").ident(name)
    }

    /// Append an optionally schema-qualified table name.
    pub fn table(&mut self, schema: Option<&str>, name: &str) -> &mut Self {
        match schema {
            Some(schema) => self.qualified(schema, name),
            None => self.ident(name),
        }
    }

    /// Bind a value and append its placeholder.
    pub fn param(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append a clause node.
    pub fn node(&mut self, node: &impl ToSql) -> &mut Self {
        node.to_sql(self);
        self
    }

    /// Append items separated by `sep`.
    pub fn join<T>(&mut self, items: impl IntoIterator<Item = T>, sep: &str, mut each: impl FnMut(&mut Self, T)) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            each(self, item);
        }
        self
    }

    /// SQL written so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// `"a", "b", "c"`
#[derive(Debug, Clone, Copy)]
pub struct ColumnList<'a> {
    pub columns: &'a [&'a str],
}

impl ToSql for ColumnList<'_> {
    fn to_sql(&self, w: &mut SqlWriter) {
        w.join(self.columns.iter(), ", ", |w, c| {
            w.ident(c);
        });
    }
}

/// `"t"."a", "t"."b"`, or `DELETED.[a]` when the qualifier is a keyword.
#[derive(Debug, Clone, Copy)]
pub struct QualifiedColumns<'a> {
    pub qualifier: Qualifier<'a>,
    pub columns: &'a [&'a str],
}

/// How a column reference is qualified.
#[derive(Debug, Clone, Copy)]
pub enum Qualifier<'a> {
    /// A quoted table alias.
    Alias(&'a str),
    /// An unquoted pseudo-table such as `INSERTED` or `DELETED`.
    Keyword(&'a str),
}

impl Qualifier<'_> {
    fn write(self, w: &mut SqlWriter) {
        match self {
            Qualifier::Alias(a) => {
                w.ident(a);
            }
            Qualifier::Keyword(k) => {
                w.push(k);
            }
        }
    }
}

impl ToSql for QualifiedColumns<'_> {
    fn to_sql(&self, w: &mut SqlWriter) {
        w.join(self.columns.iter(), ", ", |w, c| {
            self.qualifier.write(w);
            w.push(".").ident(c);
        });
    }
}

/// `"l"."k1" = "r"."k1" AND "l"."k2" = "r"."k2"`
#[derive(Debug, Clone, Copy)]
pub struct KeyPredicate<'a> {
    pub left: &'a str,
    pub right: &'a str,
    pub keys: &'a [&'a str],
}

impl ToSql for KeyPredicate<'_> {
    fn to_sql(&self, w: &mut SqlWriter) {
        w.join(self.keys.iter(), " AND ", |w, k| {
            w.qualified(self.left, k).push(" = ").qualified(self.right, k);
        });
    }
}

/// `"t"."a" AS "old_a", "t"."b" AS "old_b"`
///
/// With no qualifier the projection emits `NULL AS "old_a"` for every column,
/// which is how a union arm fills the block its side does not have.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    pub qualifier: Option<Qualifier<'a>>,
    pub columns: &'a [&'a str],
    pub prefix: &'a str,
}

impl ToSql for Projection<'_> {
    fn to_sql(&self, w: &mut SqlWriter) {
        w.join(self.columns.iter(), ", ", |w, c| {
            match self.qualifier {
                Some(q) => {
                    q.write(w);
                    w.push(".").ident(c);
                }
                None => {
                    w.push("NULL");
                }
            }
            w.push(" AS ").ident(&format!("{}{}", self.prefix, c));
        });
    }
}
