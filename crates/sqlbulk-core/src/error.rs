//! Error types for bulk operations.

use std::fmt;

/// The primary error type for all sqlbulk operations.
///
/// Cancellation is not an error: it surfaces as `Outcome::Cancelled`.
#[derive(Debug)]
pub enum Error {
    /// Invalid caller input, detected before any I/O
    Argument(ArgumentError),
    /// Configuration errors (empty column set, bad thresholds)
    Config(ConfigError),
    /// Connection-related errors (disconnect, timeout)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Result rows did not match the expected layout
    Decode(DecodeError),
    /// Structured-parameter type provisioning failed
    Provision(ProvisionError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Operation timed out
    Timeout,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ArgumentError {
    /// Name of the offending argument
    pub argument: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    /// Native engine error number (e.g. SQL Server `219`)
    pub code: Option<i32>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table, column or type not found
    NotFound,
    /// Object already exists
    AlreadyExists,
    /// Permission denied
    Permission,
    /// Deadlock detected
    Deadlock,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct DecodeError {
    pub message: String,
    /// Column involved in the mismatch, if any
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ProvisionError {
    /// Generated type name that could not be provisioned
    pub type_name: String,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub enum TransactionErrorKind {
    /// Already committed
    AlreadyCommitted,
    /// Already rolled back
    AlreadyRolledBack,
    /// Nested transaction not supported
    NestedNotSupported,
}

impl Error {
    /// Build an argument error.
    pub fn argument(argument: &'static str, message: impl Into<String>) -> Self {
        Error::Argument(ArgumentError {
            argument,
            message: message.into(),
        })
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(DecodeError {
            message: message.into(),
            column: None,
        })
    }

    /// Build a decode error tied to a column.
    pub fn decode_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode(DecodeError {
            message: message.into(),
            column: Some(column.into()),
        })
    }

    /// Is this a failure detected before any I/O was performed?
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Error::Argument(_))
    }

    /// Is this an error produced while materializing result rows?
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Type(_))
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Build a generic database error for the given statement.
    pub fn database(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Database,
            sql: Some(sql.into()),
            sqlstate: None,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505") || matches!(self.code, Some(2627 | 2601))
    }

    /// Did the engine report that the object being created already exists?
    ///
    /// SQL Server reports error 219 for `CREATE TYPE` on an existing type and
    /// 2714 for other objects.
    pub fn is_already_exists(&self) -> bool {
        self.kind == QueryErrorKind::AlreadyExists
            || matches!(self.code, Some(219 | 2714))
            || self.sqlstate.as_deref() == Some("42S01")
            || self.message.to_ascii_lowercase().contains("already exists")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Argument(e) => write!(f, "Invalid argument '{}': {}", e.argument, e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Provision(e) => write!(f, "Provisioning error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Provision(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "{} (column '{}')", self.message, col),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type '{}': {}", self.type_name, self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<ProvisionError> for Error {
    fn from(err: ProvisionError) -> Self {
        Error::Provision(err)
    }
}

/// Result type alias for sqlbulk operations.
pub type Result<T> = std::result::Result<T, Error>;
