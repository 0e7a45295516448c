//! Statement classification, argument conversion, and result shaping for
//! `sql(...)` expressions.
//!

use crate::database::{DatabaseIf, DbValue, SqlRow};
use crate::value::Value;
use crate::Error;

/// The statement class, read off the leading SQL keyword.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SqlKind {
    Delete,
    Insert,
    Other,
    Select,
    Update,
}

impl Copy for SqlKind {}

/// Classify by the first word after whitespace, case-insensitive.
///
pub fn classify(template: &str) -> SqlKind {
    let word = template
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();
    match word.as_str() {
        "DELETE" => SqlKind::Delete,
        "INSERT" => SqlKind::Insert,
        "SELECT" => SqlKind::Select,
        "UPDATE" => SqlKind::Update,
        _ => SqlKind::Other,
    }
}

/// Convert evaluated argument values for the database seam.  Booleans bind
/// as 0/1, nulls as SQL NULL; arrays and objects are rejected.
///
pub fn to_db_values(args: &[Value]) -> Result<Vec<DbValue>, Error> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(match arg {
            Value::Arr(_) => {
                return Err(Error::bad_sql_arg(
                    "an array cannot be bound to an SQL parameter",
                ));
            }
            Value::Bool(b) => DbValue::Int(*b as i64),
            Value::Float(v) => DbValue::Float(*v),
            Value::Int(v) => DbValue::Int(*v),
            Value::Null => DbValue::Null,
            Value::Obj(_) => {
                return Err(Error::bad_sql_arg(
                    "an object cannot be bound to an SQL parameter",
                ));
            }
            Value::Str(s) => DbValue::Text(s.clone()),
        });
    }
    Ok(values)
}

/// Run a classified statement and shape the result:
///
/// - SELECT with no bound arguments: array of rows, possibly empty.
/// - SELECT with arguments: the first row, or null if none.
/// - INSERT: `{id, changes}`.
/// - UPDATE, DELETE, anything else: `{changes}`.
///
pub fn run(
    db: &DatabaseIf,
    template: &str,
    values: &[DbValue],
) -> Result<Value, Error> {
    match classify(template) {
        SqlKind::Select => {
            let mut rows = db.query(template, values)?;
            if values.is_empty() {
                Ok(Value::Arr(
                    rows.into_iter().map(row_to_value).collect(),
                ))
            } else if rows.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(row_to_value(rows.swap_remove(0)))
            }
        }
        SqlKind::Insert => {
            let outcome = db.exec(template, values)?;
            Ok(Value::Obj(vec![
                ("id".to_string(), Value::Int(outcome.last_insert_id)),
                ("changes".to_string(), Value::Int(outcome.changes as i64)),
            ]))
        }
        _ => {
            let outcome = db.exec(template, values)?;
            Ok(Value::Obj(vec![(
                "changes".to_string(),
                Value::Int(outcome.changes as i64),
            )]))
        }
    }
}

fn row_to_value(row: SqlRow) -> Value {
    Value::Obj(row)
}
