//! The response type, the response shaper, and the per-process runtime
//! that dispatches requests.
//!

use crate::ast::{HttpMethod, Program, ReturnKind};
use crate::context::RequestContext;
use crate::database::DatabaseIf;
use crate::eval::{Evaluator, RouteReply};
use crate::route::RouteTable;
use crate::value::Value;
use crate::Error;

// --- HttpRequest -----------------------------------------------------------

/// The raw request parts an HTTP server adapter hands to [`Runtime::handle()`
/// ](struct.Runtime.html#method.handle).
///
/// `path` is the undecoded URL path; decoding happens per segment during
/// route matching.  `headers` keep their wire-case; the request context
/// lowercases them once.
///
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

// --- HttpResponse ----------------------------------------------------------

/// A shaped response: status, headers, and an optional body.
///
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl HttpResponse {
    // - - constructors  - - - - - - - - - - - - - - - - - - - - - - - - - - -

    /// Construct a response with a JSON body serialized from `value` and
    /// a `Content-Type: application/json; charset=utf-8` header.
    ///
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )],
            body: Some(
                serde_json::to_string(&value.to_json())
                    .unwrap_or_else(|_| String::from("null")),
            ),
        }
    }

    /// Construct a response with `value` [coerced to text
    /// ](../value/enum.Value.html#method.coerce_string) and a
    /// `Content-Type: text/html; charset=utf-8` header.
    ///
    pub fn html(status: u16, value: &Value) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: Some(value.coerce_string()),
        }
    }

    /// The response for a request no route governs.
    ///
    pub fn not_found() -> Self {
        Self::json(
            404,
            &Value::Obj(vec![(
                "error".to_string(),
                Value::Str("Not Found".to_string()),
            )]),
        )
    }

    /// The response for an unexpected evaluation failure.  No detail
    /// reaches the client.
    ///
    pub fn internal_error() -> Self {
        Self::json(
            500,
            &Value::Obj(vec![(
                "error".to_string(),
                Value::Str("internal error".to_string()),
            )]),
        )
    }

    // - - modifiers - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    /// Add a header with name `nam` and value `val`.  Any previous header
    /// with the same name is kept.
    ///
    pub fn add_header(mut self, nam: &str, val: &str) -> Self {
        self.headers
            .push((nam.trim().to_string(), val.trim().to_string()));
        self
    }

    /// Drop the body, keeping status and headers.  Used for `HEAD`.
    ///
    pub fn drop_body(mut self) -> Self {
        self.body = None;
        self
    }

    // - - accessors - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    /// ### For HTTP server adapter developers only
    ///
    /// Consumes `self`!
    ///
    pub fn get_body(self) -> Option<String> {
        self.body
    }

    /// ### For HTTP server adapter developers only
    ///
    pub fn get_status(&self) -> u16 {
        self.status
    }

    /// ### For HTTP server adapter developers only
    ///
    /// Return an iterator yielding pairs (header name, header value).
    ///
    /// Drains the headers!
    ///
    pub fn drain_headers(&mut self) -> std::vec::Drain<(String, String)> {
        self.headers.drain(..)
    }

    /// Return the value of a header with `name`, case insensitive.
    ///
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// --- Runtime ---------------------------------------------------------------

/// The per-process aggregate constructed at startup: the immutable parsed
/// program, the route table compiled from it, and the shared database
/// interface.  Passed by shared reference to every handler; there are no
/// process singletons.
///
pub struct Runtime {
    program: Program,
    table: RouteTable,
    db: DatabaseIf,
}

impl Runtime {
    pub fn new(program: Program, db: DatabaseIf) -> Self {
        let table = RouteTable::build(&program.routes);
        Self { program, table, db }
    }

    /// The loaded program.
    ///
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Execute the `@database` schema bootstrap, if any.  An empty body is
    /// not an error and executes nothing.
    ///
    pub fn bootstrap(&self) -> Result<(), Error> {
        match &self.program.schema {
            Some(schema) if !schema.trim().is_empty() => {
                log::info!("executing schema bootstrap");
                self.db.batch(schema)
            }
            _ => Ok(()),
        }
    }

    /// Serve one request: match, evaluate, shape.  Never fails; recoverable
    /// SQL trouble is already in-band, and an evaluator `Err` becomes a
    /// plain 500.
    ///
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let response = match self.table.resolve(
            &self.program.routes,
            request.method,
            &request.path,
        ) {
            None => {
                log::debug!(
                    "{} {} -> no route",
                    request.method,
                    request.path,
                );
                HttpResponse::not_found()
            }
            Some(matched) => {
                let route = &self.program.routes[matched.route];
                log::debug!(
                    "{} {} -> {}",
                    request.method,
                    request.path,
                    route,
                );
                let mut ctx = RequestContext::new(
                    matched.params,
                    &request.query,
                    &request.headers,
                    &request.body,
                );
                match Evaluator::new(self.db.clone())
                    .run_route(route, &mut ctx)
                {
                    Ok(reply) => respond(reply),
                    Err(e) => {
                        log::error!(
                            "evaluation failed for {} {}: {}",
                            request.method,
                            request.path,
                            e,
                        );
                        HttpResponse::internal_error()
                    }
                }
            }
        };
        if request.method == HttpMethod::Head {
            response.drop_body()
        } else {
            response
        }
    }
}

fn respond(reply: RouteReply) -> HttpResponse {
    match reply.kind {
        ReturnKind::Html => HttpResponse::html(reply.status, &reply.value),
        ReturnKind::Json => HttpResponse::json(reply.status, &reply.value),
    }
}
