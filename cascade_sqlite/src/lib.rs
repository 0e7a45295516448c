//! Implement `cascade::DbConn` by way of the `rusqlite` crate.

use cascade::{DbConn, DbValue, Error, ExecOutcome, SqlRow, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ToSql};
use std::path::Path;
use std::sync::Mutex;

// Statically declared SQL templates never get anywhere near this; the
// cache behaves as unbounded for any real program.
const STATEMENT_CACHE_CAPACITY: usize = 1024;

/// A wrapping of `rusqlite::Connection` that implements `cascade::DbConn`.
///
/// The prepared-statement cache lives inside the connection
/// (`prepare_cached`), so lookup-or-prepare happens under the same lock
/// that serializes driver access.
///
// Connection is not Sync, and the runtime is shared across request
// handlers. Hence Mutex.
//
pub struct SqliteConn(Mutex<Connection>);

impl SqliteConn {
    /// Try to open the database at `path` with [default flags
    /// ](https://docs.rs/rusqlite/latest/rusqlite/struct.Connection.html#flags)
    /// and enabled foreign key support.
    ///
    pub fn open(path: &Path) -> Result<Self, Error> {
        Self::result(Connection::open(path)).map(Self::wrap)
    }

    /// Like [`open()`](#method.open) but entirely in memory.  Intended for
    /// tests.
    ///
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::result(Connection::open_in_memory()).map(Self::wrap)
    }

    fn wrap(conn: Connection) -> Self {
        conn.set_prepared_statement_cache_capacity(
            STATEMENT_CACHE_CAPACITY,
        );
        let _ = conn.execute("PRAGMA foreign_keys = ON", []);
        Self(Mutex::new(conn))
    }

    /// Convert `res` to `Result<T, cascade::Error>`.
    fn result<T>(res: rusqlite::Result<T>) -> Result<T, Error> {
        res.map_err(Error::database)
    }
}

macro_rules! from_values {
    ($values:expr) => {
        &$values
            .iter()
            .map(|val| match val {
                DbValue::Float(v) => v as &dyn ToSql,
                DbValue::Int(v) => v as &dyn ToSql,
                DbValue::Null => &rusqlite::types::Null as &dyn ToSql,
                DbValue::Text(v) => v as &dyn ToSql,
            })
            .collect::<Vec<_>>()[..]
    };
}

impl DbConn for SqliteConn {
    fn batch(&self, sql: &str) -> Result<(), Error> {
        Self::result(self.0.lock().unwrap().execute_batch(sql))
    }

    fn exec(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<ExecOutcome, Error> {
        let conn = self.0.lock().unwrap();
        Self::result(conn.prepare_cached(sql).and_then(|mut stmt| {
            let changes = stmt.execute(from_values!(values))?;
            Ok(ExecOutcome {
                changes,
                last_insert_id: conn.last_insert_rowid(),
            })
        }))
    }

    fn query(
        &self,
        sql: &str,
        values: &[DbValue],
    ) -> Result<Vec<SqlRow>, Error> {
        let conn = self.0.lock().unwrap();
        Self::result(conn.prepare_cached(sql).and_then(|mut stmt| {
            let columns: Vec<String> = stmt
                .column_names()
                .iter()
                .map(|name| name.to_string())
                .collect();
            let mut rows = stmt.query(from_values!(values))?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut out_row = Vec::with_capacity(columns.len());
                for (ix, column) in columns.iter().enumerate() {
                    out_row.push((
                        column.clone(),
                        value_from_sql(row.get_ref(ix)?),
                    ));
                }
                result.push(out_row);
            }
            Ok(result)
        }))
    }
}

// The store's dynamic typing maps straight onto the value space; BLOBs
// arrive as lossy text.
fn value_from_sql(value: ValueRef) -> Value {
    match value {
        ValueRef::Blob(bytes) => {
            Value::Str(String::from_utf8_lossy(bytes).to_string())
        }
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Null => Value::Null,
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => {
            Value::Str(String::from_utf8_lossy(bytes).to_string())
        }
    }
}
