use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// The single error kind surfaced by the whole layer.
///
/// Configuration mistakes (missing database name, missing table name, an
/// unresolved alias, ...) and translated native failures both end up here,
/// the latter carrying the native error code when the driver reports one.
/// Codes are kept as text: engines report numbers and SQLSTATE strings
/// alike.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DatabaseError {
    pub message: String,
    pub code: Option<String>,
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl ToString) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }

    /// Attach the failing SQL text to the message, the way the statement
    /// execution path reports errors.
    pub fn for_sql(mut self, sql: &str) -> Self {
        self.message = format!("{} in {}", self.message, sql);
        self
    }

    /// True when the native message matches a known deadlock phrasing.
    pub fn is_deadlock(&self) -> bool {
        contains_any(&self.message, DEADLOCK_PHRASES)
    }

    /// True when the native message indicates the connection died rather
    /// than the query being wrong. Lets a reconnect policy tell the two
    /// apart.
    pub fn is_lost_connection(&self) -> bool {
        contains_any(&self.message, LOST_CONNECTION_PHRASES)
    }
}

/// Failure of a unit of work running under `Connection::transaction`.
///
/// Deadlocks abort the retry loop and propagate immediately; any other
/// failure rolls back and may be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error(transparent)]
    Deadlock(DatabaseError),
    #[error(transparent)]
    Failed(DatabaseError),
}

impl From<DatabaseError> for TransactionError {
    fn from(error: DatabaseError) -> Self {
        if error.is_deadlock() {
            TransactionError::Deadlock(error)
        } else {
            TransactionError::Failed(error)
        }
    }
}

impl From<TransactionError> for DatabaseError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::Deadlock(e) | TransactionError::Failed(e) => e,
        }
    }
}

const DEADLOCK_PHRASES: &[&str] = &[
    "deadlock found when trying to get lock", // MySQL
    "deadlock detected",                      // PostgreSQL
    "has been chosen as the deadlock victim", // SQL Server
    "the database file is locked",            // SQLite
    "database is locked",                     // SQLite
    "database table is locked",               // SQLite
    "a table in the database is locked",      // SQLite
];

const LOST_CONNECTION_PHRASES: &[&str] = &[
    "no connection to the server",                 // libpq
    "server has gone away",                        // MySQL
    "lost connection",                             // MySQL
    "resource deadlock avoided",                   // MySQL
    "decryption failed or bad record mac",         // PostgreSQL
    "server closed the connection unexpectedly",   // PostgreSQL
    "ssl connection has been closed unexpectedly", // PostgreSQL
    "is dead or not enabled",                      // SQL Server
];

fn contains_any(message: &str, phrases: &[&str]) -> bool {
    let message = message.to_lowercase();
    phrases.iter().any(|phrase| message.contains(phrase))
}
