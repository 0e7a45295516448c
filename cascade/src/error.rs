//! The cascade error type.
//!

use std::fmt::Display;

/// Cascade's error type.
///
/// Load-time failures are [`Parse`](#variant.Parse) and carry a one-based
/// source position.  Request-time failures are [`Database`
/// ](#variant.Database), [`NoDatabase`](#variant.NoDatabase), and
/// [`BadSqlArg`](#variant.BadSqlArg); the evaluator folds those into in-band
/// values, see [`sql_message()`](#method.sql_message).
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// An SQL argument that the database cannot represent.
    ///
    BadSqlArg(String),

    /// A database driver error.
    ///
    Database(DatabaseError),

    /// The input cannot be accepted.
    ///
    InvalidInput(String),

    /// `sql(...)` was evaluated but the program configures no database.
    ///
    NoDatabase,

    /// Unspecified error.
    ///
    Other(String),

    /// The source text cannot be parsed.
    ///
    Parse(ParseError),

    /// An unexplainable bug, stop execution as graceful as possible.
    ///
    ThisCannotHappen(String),
}

impl Error {
    /// Create an `Error::BadSqlArg`.
    ///
    pub fn bad_sql_arg<T: Display>(text: T) -> Self {
        Self::BadSqlArg(text.to_string())
    }

    /// Create an `Error::Database`.
    ///
    pub fn database<T: Display>(text: T) -> Self {
        Self::Database(DatabaseError {
            text: text.to_string(),
        })
    }

    /// Create an `Error::InvalidInput`.
    ///
    pub fn invalid_input<T: Display>(text: T) -> Self {
        Self::InvalidInput(text.to_string())
    }

    /// The variant is [`Parse`](#variant.Parse).
    ///
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Create an `Error::Other`.
    ///
    pub fn other<T: Display>(text: T) -> Self {
        Self::Other(text.to_string())
    }

    /// Create an `Error::Parse`.  `line` and `column` are one-based.
    ///
    pub fn parse<T: Display>(line: usize, column: usize, text: T) -> Self {
        Self::Parse(ParseError {
            line,
            column,
            text: text.to_string(),
        })
    }

    /// The message to put in an in-band `{"error": ...}` value.
    ///
    /// For [`Database`](#variant.Database) this is the driver text verbatim,
    /// for the other variants the `Display` output.
    ///
    pub fn sql_message(&self) -> String {
        match self {
            Self::Database(de) => de.text.clone(),
            _ => self.to_string(),
        }
    }

    /// Create an `Error::ThisCannotHappen`.
    ///
    pub fn this_cannot_happen<T: Display>(text: T) -> Self {
        Self::ThisCannotHappen(text.to_string())
    }
}

/// Simplify mapping another error type to this one.
///
/// Requires `$variant` to be one of the variants holding a single `String`.
///
#[macro_export]
macro_rules! map_error {
    ($variant: ident, $result: expr $( , )? ) => {
        ($result).map_err(|e| $crate::Error::$variant(e.to_string()))
    };
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::BadSqlArg(text) => {
                write!(f, "bad SQL argument: {}", text)
            }
            Self::Database(de) => write!(f, "database error: {}", de.text),
            Self::InvalidInput(text) => write!(f, "invalid input: {}", text),
            Self::NoDatabase => write!(f, "no database configured"),
            Self::Other(text) => write!(f, "{}", text),
            Self::Parse(pe) => write!(
                f,
                "parse error at {}:{}: {}",
                pe.line, pe.column, pe.text,
            ),
            Self::ThisCannotHappen(text) => {
                write!(f, "this cannot happen: {}", text)
            }
        }
    }
}

/// Create an `Error::Other`.
///
impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

/// Create an `Error::Other`.
///
impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// The contents of the [error](enum.Error.html) variant [`Database`
/// ](enum.Error.html#variant.Database).
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseError {
    /// Error text as received from the database driver.
    ///
    pub text: String,
}

/// The contents of the [error](enum.Error.html) variant [`Parse`
/// ](enum.Error.html#variant.Parse).
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    /// One-based source line.
    ///
    pub line: usize,

    /// One-based source column.
    ///
    pub column: usize,

    /// What went wrong, naming the construct being parsed.
    ///
    pub text: String,
}
