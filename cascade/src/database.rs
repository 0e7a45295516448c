//! Trait and helper types to abstract the embedded SQL store.
//!

use crate::value::Value;
use crate::Error;
use std::fmt;
use std::sync::Arc;

/// An SQL abstraction for use by the evaluator as well as the launcher.
///
/// Exactly one instance per process wraps the shared connection; handlers
/// clone the interface, not the connection.
///
#[derive(Clone)]
pub struct DatabaseIf(Arc<dyn DbConn + Send + Sync>);

impl DatabaseIf {
    /// Create an interface to `conn`.
    ///
    pub fn new(conn: Arc<dyn DbConn + Send + Sync>) -> Self {
        Self(conn)
    }

    /// Execute a batch of statements, e.g. a schema bootstrap.
    ///
    pub fn batch(&self, sql: &str) -> Result<(), Error> {
        self.0.batch(sql)
    }

    /// Execute a non-SELECT statement.
    ///
    /// `sql` may be parameterized using `?` to indicate the position of the
    /// parameter in `values`.
    ///
    pub fn exec(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<ExecOutcome, Error> {
        self.0.exec(sql, values)
    }

    /// Execute an SQL query and return the resulting rows, each a vector
    /// of column-name/value pairs in column order.
    ///
    pub fn query(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<Vec<SqlRow>, Error> {
        self.0.query(sql, values)
    }
}

/// One result row: column-name/value pairs in column order.
///
pub type SqlRow = Vec<(String, Value)>;

/// What a non-SELECT statement reports back.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutcome {
    /// The number of affected rows.
    ///
    pub changes: usize,

    /// The row id generated by the most recent successful INSERT.
    ///
    pub last_insert_id: i64,
}

/// An SQL abstraction trait for database adapter developers.
///
/// The prepared-statement cache is the adapter's concern: repeated calls
/// with the same `sql` text must prepare it at most once, and concurrent
/// first use of the same text must be safe.
///
pub trait DbConn: Send + Sync {
    /// Execute a batch of statements separated by `';'`.
    ///
    /// The default method naively splits on `';'` and feeds each piece to
    /// `exec()`; adapters with a real batch API should override it.
    ///
    fn batch(&self, sql: &str) -> Result<(), Error> {
        for statement in sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            self.exec(statement, &[])?;
        }
        Ok(())
    }

    /// See [`DatabaseIf::exec()`](struct.DatabaseIf.html#method.exec).
    ///
    fn exec(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<ExecOutcome, Error>;

    /// See [`DatabaseIf::query()`](struct.DatabaseIf.html#method.query).
    ///
    fn query(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<Vec<SqlRow>, Error>;
}

/// The values sent to the database by a [`DbConn`](trait.DbConn.html)
/// implementation.
///
/// The evaluator converts its dynamic values before the seam: booleans
/// become 0/1, arrays and objects are rejected.
///
#[derive(Clone, Debug, PartialEq)]
pub enum DbValue {
    Float(f64),
    Int(i64),
    Null,
    Text(String),
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Float(v) => write!(f, "{}", v),
            DbValue::Int(v) => write!(f, "{}", v),
            DbValue::Null => write!(f, "NULL"),
            DbValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// An implementation of [`DbConn`](trait.DbConn.html) that does nothing
/// and returns [`Error::NoDatabase`
/// ](../error/enum.Error.html#variant.NoDatabase).  The runtime of a
/// program without a `database` configuration holds one of these.
///
#[derive(Clone, Debug)]
pub struct NullConn;

impl DbConn for NullConn {
    fn exec(
        &self,
        _sql: &str,
        _values: &[DbValue],
    ) -> Result<ExecOutcome, Error> {
        Err(Error::NoDatabase)
    }

    fn query(
        &self,
        _sql: &str,
        _values: &[DbValue],
    ) -> Result<Vec<SqlRow>, Error> {
        Err(Error::NoDatabase)
    }
}
