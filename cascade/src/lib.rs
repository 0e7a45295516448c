pub mod ast;
pub mod context;
pub mod database;
pub mod error;
pub mod eval;
pub mod http;
pub mod lexer;
pub mod parser;
pub mod route;
pub mod sql;
pub mod value;

pub use ast::{
    Binding, CmpOp, Condition, Expression, HttpMethod, Program, ReturnExpr,
    ReturnKind, Route, ServerConfig,
};
pub use context::RequestContext;
pub use database::{
    DatabaseIf, DbConn, DbValue, ExecOutcome, NullConn, SqlRow,
};
pub use error::{DatabaseError, Error, ParseError};
pub use eval::{Evaluator, RouteReply};
pub use http::{HttpRequest, HttpResponse, Runtime};
pub use parser::parse;
pub use route::{PathPattern, RouteMatch, RouteTable, Segment};
pub use value::Value;
