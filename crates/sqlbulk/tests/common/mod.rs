//! Scripted connection and fixtures shared by the integration tests.

#![allow(dead_code)]

pub mod sqlite;

use asupersync::types::CancelKind;
use sqlbulk::{Connection, Cx, Dialect, Entity, Error, FieldInfo, IsolationLevel, Outcome, Row};
use sqlbulk::{SqlType, TransactionOps, Value};
use sqlbulk_core::{QueryError, QueryErrorKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got a value"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_cancelled<T>(outcome: Outcome<T, Error>) {
    match outcome {
        Outcome::Cancelled(_) => {}
        Outcome::Ok(_) => panic!("expected cancellation, got a value"),
        Outcome::Err(e) => panic!("expected cancellation, got error: {e}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Request cancellation of `cx` the way a caller dropping interest would.
pub fn cancel(cx: &Cx) {
    cx.cancel_with(CancelKind::User, Some("caller gave up"));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    QueryOne,
    Execute,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub sql: String,
    pub params: Vec<Value>,
    pub in_transaction: bool,
}

/// Error a scripted statement fails with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    AlreadyExists,
    Constraint,
}

impl Failure {
    fn to_error(self, sql: &str) -> Error {
        let (kind, code, message) = match self {
            Failure::AlreadyExists => (
                QueryErrorKind::AlreadyExists,
                219,
                "The type already exists in the database",
            ),
            Failure::Constraint => (
                QueryErrorKind::Constraint,
                2627,
                "Violation of PRIMARY KEY constraint",
            ),
        };
        Error::Query(QueryError {
            kind,
            sql: Some(sql.to_string()),
            sqlstate: None,
            code: Some(code),
            message: message.to_string(),
            source: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Answers to `query`, in order; an exhausted queue answers no rows.
    pub query_results: VecDeque<Vec<Row>>,
    pub query_one_results: VecDeque<Option<Row>>,
    /// The first statement containing the pattern fails, once.
    pub failures: Vec<(String, Failure)>,
    /// The context is cancelled once a statement containing the pattern has run.
    pub cancel_after: Option<(String, Cx)>,
}

fn record(
    state: &Mutex<MockState>,
    kind: CallKind,
    sql: &str,
    params: &[Value],
    in_transaction: bool,
) -> Result<(), Error> {
    let mut guard = state.lock().expect("lock poisoned");
    guard.calls.push(Call {
        kind,
        sql: sql.to_string(),
        params: params.to_vec(),
        in_transaction,
    });
    if let Some(pos) = guard.failures.iter().position(|(p, _)| sql.contains(p.as_str())) {
        let (_, failure) = guard.failures.remove(pos);
        return Err(failure.to_error(sql));
    }
    if guard
        .cancel_after
        .as_ref()
        .is_some_and(|(p, _)| sql.contains(p.as_str()))
    {
        if let Some((_, cx)) = guard.cancel_after.take() {
            cancel(&cx);
        }
    }
    Ok(())
}

fn next_rows(state: &Mutex<MockState>) -> Vec<Row> {
    state
        .lock()
        .expect("lock poisoned")
        .query_results
        .pop_front()
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
    dialect: Dialect,
    identity: String,
}

impl MockConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect,
            identity: "mock/bulk".to_string(),
        }
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .query_results
            .push_back(rows);
        self
    }

    pub fn with_query_one(self, row: Option<Row>) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .query_one_results
            .push_back(row);
        self
    }

    pub fn failing_on(self, pattern: &str, failure: Failure) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .failures
            .push((pattern.to_string(), failure));
        self
    }

    pub fn cancelling_after(self, pattern: &str, cx: &Cx) -> Self {
        self.state.lock().expect("lock poisoned").cancel_after =
            Some((pattern.to_string(), cx.clone()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().expect("lock poisoned").calls.clone()
    }

    /// `(begins, commits, rollbacks)`
    pub fn transactions(&self) -> (usize, usize, usize) {
        let guard = self.state.lock().expect("lock poisoned");
        (guard.begins, guard.commits, guard.rollbacks)
    }
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTransaction
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database_identity(&self) -> String {
        self.identity.clone()
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = match record(&self.state, CallKind::Query, sql, params, false) {
            Ok(()) => Outcome::Ok(next_rows(&self.state)),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let outcome = match record(&self.state, CallKind::QueryOne, sql, params, false) {
            Ok(()) => Outcome::Ok(
                self.state
                    .lock()
                    .expect("lock poisoned")
                    .query_one_results
                    .pop_front()
                    .flatten(),
            ),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match record(&self.state, CallKind::Execute, sql, params, false) {
            Ok(()) => Outcome::Ok(0),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn begin_with(
        &self,
        _cx: &Cx,
        _isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.state.lock().expect("lock poisoned").begins += 1;
        let tx = MockTransaction {
            state: Arc::clone(&self.state),
        };
        async move { Outcome::Ok(tx) }
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

impl TransactionOps for MockTransaction {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = match record(&self.state, CallKind::Query, sql, params, true) {
            Ok(()) => Outcome::Ok(next_rows(&self.state)),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match record(&self.state, CallKind::Execute, sql, params, true) {
            Ok(()) => Outcome::Ok(1),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("lock poisoned").commits += 1;
        async { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("lock poisoned").rollbacks += 1;
        async { Outcome::Ok(()) }
    }
}

/// `products(id BIGINT PK, name NVARCHAR(100), price FLOAT, note TEXT NULL)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub note: Option<String>,
}

impl Product {
    pub fn new(id: i64, name: &str, price: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            price,
            note: None,
        }
    }
}

impl Entity for Product {
    const TABLE_NAME: &'static str = "products";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 4] = [
            FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            FieldInfo::new("name", "name", SqlType::VarChar(100)),
            FieldInfo::new("price", "price", SqlType::Double),
            FieldInfo::new("note", "note", SqlType::Text).nullable(true),
        ];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("price", self.price.into()),
            ("note", self.note.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> sqlbulk::Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            price: row.get_named("price")?,
            note: row.get_named("note")?,
        })
    }
}

/// Entity without a primary key.
#[derive(Debug, Clone, Default)]
pub struct Keyless {
    pub label: String,
}

impl Entity for Keyless {
    const TABLE_NAME: &'static str = "labels";
    const PRIMARY_KEY: &'static [&'static str] = &[];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 1] = [FieldInfo::new("label", "label", SqlType::Text)];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("label", self.label.clone().into())]
    }

    fn from_row(row: &Row) -> sqlbulk::Result<Self> {
        Ok(Self {
            label: row.get_named("label")?,
        })
    }
}

fn product_values(p: &Product) -> Vec<Value> {
    vec![
        Value::BigInt(p.id),
        Value::Text(p.name.clone()),
        Value::Double(p.price),
        p.note.clone().map_or(Value::Null, Value::Text),
    ]
}

fn prefixed(prefix: &str) -> Vec<String> {
    ["id", "name", "price", "note"]
        .iter()
        .map(|c| format!("{prefix}{c}"))
        .collect()
}

/// A full, unprefixed product row.
pub fn product_row(p: &Product) -> Row {
    Row::new(prefixed(""), product_values(p))
}

/// A key-only row as returned by insert-if-not-exist.
pub fn key_row(id: i64) -> Row {
    Row::new(vec!["id".to_string()], vec![Value::BigInt(id)])
}

/// A MERGE OUTPUT row: `__action`, `old_*`, `new_id`.
pub fn merge_row(action: &str, old: Option<&Product>, new_id: Option<i64>) -> Row {
    let mut names = vec!["__action".to_string()];
    names.extend(prefixed("old_"));
    names.push("new_id".to_string());

    let mut values = vec![Value::Text(action.to_string())];
    values.extend(old.map_or_else(|| vec![Value::Null; 4], product_values));
    values.push(new_id.map_or(Value::Null, Value::BigInt));
    Row::new(names, values)
}

/// A SQLite staging row: `__action`, `old_*`, `new_*`.
pub fn staged_row(action: &str, old: Option<&Product>, new: Option<&Product>) -> Row {
    let mut names = vec!["__action".to_string()];
    names.extend(prefixed("old_"));
    names.extend(prefixed("new_"));

    let mut values = vec![Value::Text(action.to_string())];
    values.extend(old.map_or_else(|| vec![Value::Null; 4], product_values));
    values.extend(new.map_or_else(|| vec![Value::Null; 4], product_values));
    Row::new(names, values)
}
