//! Recursive descent from the token stream to a [`Program`
//! ](../ast/struct.Program.html).
//!
//! All load-time validation happens here: unknown properties, functions,
//! and methods, duplicate `@return`/`status`/variables, references to
//! variables that are not declared earlier in the same route, and malformed
//! path patterns.  `env(NAME, default)` is resolved against the process
//! environment while parsing, so the tree never contains it.
//!

use crate::ast::{
    Binding, CmpOp, Condition, Expression, HttpMethod, Program, ReturnExpr,
    ReturnKind, Route, ServerConfig,
};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::route::PathPattern;
use crate::value::Value;
use crate::Error;

/// Parse an entire source file.
///
pub fn parse(source: &str) -> Result<Program, Error> {
    let mut lexer = Lexer::new(source);
    let current = lexer.next_token()?;
    Parser { lexer, current }.program()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    // --- top level ---------------------------------------------------------

    fn program(&mut self) -> Result<Program, Error> {
        let mut config: Option<ServerConfig> = None;
        let mut schema: Option<String> = None;
        let mut routes = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Eof => break,
                TokenKind::At => {
                    self.advance()?;
                    let name = self.consume(
                        TokenKind::Ident,
                        "an at-rule name after '@'",
                    )?;
                    match name.lexeme.as_str() {
                        "server" => {
                            if config.is_some() {
                                return Err(err_at(
                                    &name,
                                    "duplicate @server block",
                                ));
                            }
                            config = Some(self.server_block()?);
                        }
                        "database" => {
                            if schema.is_some() {
                                return Err(err_at(
                                    &name,
                                    "duplicate @database block",
                                ));
                            }
                            if !self.check(TokenKind::LBrace) {
                                return Err(
                                    self.expected("'{' after @database")
                                );
                            }
                            // the body is verbatim SQL up to the matching
                            // brace, which raw_block() also consumes
                            schema = Some(self.lexer.raw_block()?);
                            self.advance()?;
                        }
                        _ => {
                            return Err(err_at(
                                &name,
                                format!("unknown at-rule '@{}'", name.lexeme),
                            ));
                        }
                    }
                }
                TokenKind::LBracket => routes.push(self.rule()?),
                _ => {
                    return Err(self.expected(
                        "@server, @database, or a route rule",
                    ));
                }
            }
        }
        Ok(Program {
            config: config.unwrap_or_default(),
            schema,
            routes,
        })
    }

    fn server_block(&mut self) -> Result<ServerConfig, Error> {
        self.consume(TokenKind::LBrace, "'{' after @server")?;
        let mut config = ServerConfig::default();
        while !self.eat(TokenKind::RBrace)? {
            let prop =
                self.consume(TokenKind::Ident, "a property name")?;
            self.consume(TokenKind::Colon, "':' after property name")?;
            let val_tok = self.current.clone();
            let value = self.server_value()?;
            self.consume(TokenKind::Semicolon, "';' after property value")?;
            match prop.lexeme.as_str() {
                "port" => {
                    config.port = match value.as_number() {
                        Some(n)
                            if n.fract() == 0.0
                                && (0.0..=65535.0).contains(&n) =>
                        {
                            n as u16
                        }
                        _ => {
                            return Err(err_at(
                                &val_tok,
                                "port must be an integer between 0 and \
                                 65535",
                            ));
                        }
                    };
                }
                "host" => config.host = value.coerce_string(),
                "database" => {
                    config.database = Some(value.coerce_string())
                }
                _ => {
                    return Err(err_at(
                        &prop,
                        format!(
                            "unknown @server property '{}'",
                            prop.lexeme,
                        ),
                    ));
                }
            }
        }
        Ok(config)
    }

    // An `@server` property value: a literal or `env(NAME, default)`.
    fn server_value(&mut self) -> Result<Value, Error> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Number => {
                self.advance()?;
                number_value(&tok)
            }
            TokenKind::Str => {
                self.advance()?;
                Ok(Value::Str(tok.lexeme))
            }
            TokenKind::Ident => {
                self.advance()?;
                match tok.lexeme.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    "env" if self.check(TokenKind::LParen) => {
                        self.advance()?;
                        self.env_args()
                    }
                    _ => Ok(Value::Str(tok.lexeme)),
                }
            }
            _ => Err(self.expected("a literal or env(...)")),
        }
    }

    // `env` arguments with the leading '(' already consumed.  Resolved
    // against the process environment right here, at load time.
    fn env_args(&mut self) -> Result<Value, Error> {
        let name = self.name_argument("an environment variable name")?;
        let default = if self.eat(TokenKind::Comma)? {
            Some(self.server_value()?)
        } else {
            None
        };
        self.consume(TokenKind::RParen, "')' closing env(...)")?;
        Ok(match std::env::var(&name) {
            Ok(value) => Value::Str(value),
            Err(_) => default.unwrap_or(Value::Null),
        })
    }

    // --- routes ------------------------------------------------------------

    fn rule(&mut self) -> Result<Route, Error> {
        self.consume(TokenKind::LBracket, "'[' starting a route selector")?;
        let attr =
            self.consume(TokenKind::Ident, "'path' in route selector")?;
        if attr.lexeme != "path" {
            return Err(err_at(&attr, "expected 'path' in route selector"));
        }
        self.consume(TokenKind::Eq, "'=' after path")?;
        let pattern_tok =
            self.consume(TokenKind::Str, "a quoted path pattern")?;
        self.consume(TokenKind::RBracket, "']' closing the selector")?;
        self.consume(TokenKind::Colon, "':' before the HTTP method")?;
        let method_tok =
            self.consume(TokenKind::Ident, "an HTTP method")?;
        let method = HttpMethod::try_from(method_tok.lexeme.as_str())
            .map_err(|_| {
                err_at(
                    &method_tok,
                    format!(
                        "unsupported HTTP method '{}'",
                        method_tok.lexeme,
                    ),
                )
            })?;
        let pattern: PathPattern =
            pattern_tok.lexeme.parse().map_err(|e| match e {
                Error::InvalidInput(text) => err_at(&pattern_tok, text),
                other => other,
            })?;
        self.consume(TokenKind::LBrace, "'{' starting the route body")?;
        self.route_body(method, pattern)
    }

    fn route_body(
        &mut self,
        method: HttpMethod,
        pattern: PathPattern,
    ) -> Result<Route, Error> {
        let mut bindings: Vec<Binding> = Vec::new();
        let mut status: Option<Expression> = None;
        let mut ret: Option<ReturnExpr> = None;
        loop {
            if self.eat(TokenKind::RBrace)? {
                break;
            }
            match self.current.kind {
                TokenKind::Var => {
                    let tok = self.advance()?;
                    if bindings.iter().any(|b| b.name == tok.lexeme) {
                        return Err(err_at(
                            &tok,
                            format!(
                                "duplicate variable '--{}'",
                                tok.lexeme,
                            ),
                        ));
                    }
                    self.consume(
                        TokenKind::Colon,
                        "':' after variable name",
                    )?;
                    let declared = names(&bindings);
                    let value = self.expression(&declared)?;
                    self.consume(
                        TokenKind::Semicolon,
                        "';' after variable binding",
                    )?;
                    bindings.push(Binding {
                        name: tok.lexeme,
                        value,
                    });
                }
                TokenKind::Ident if self.current.lexeme == "status" => {
                    let tok = self.advance()?;
                    if status.is_some() {
                        return Err(err_at(
                            &tok,
                            "at most one status declaration per route",
                        ));
                    }
                    self.consume(TokenKind::Colon, "':' after status")?;
                    let declared = names(&bindings);
                    status = Some(self.expression(&declared)?);
                    self.consume(
                        TokenKind::Semicolon,
                        "';' after status expression",
                    )?;
                }
                TokenKind::At => {
                    self.advance()?;
                    let name = self.consume(
                        TokenKind::Ident,
                        "an at-rule name after '@'",
                    )?;
                    if name.lexeme != "return" {
                        return Err(err_at(
                            &name,
                            format!(
                                "unknown at-rule '@{}' in a route body",
                                name.lexeme,
                            ),
                        ));
                    }
                    if ret.is_some() {
                        return Err(err_at(&name, "duplicate @return"));
                    }
                    let kind_tok = self.consume(
                        TokenKind::Ident,
                        "json(...) or html(...) after @return",
                    )?;
                    let kind = match kind_tok.lexeme.as_str() {
                        "html" => ReturnKind::Html,
                        "json" => ReturnKind::Json,
                        _ => {
                            return Err(err_at(
                                &kind_tok,
                                "expected json(...) or html(...) after \
                                 @return",
                            ));
                        }
                    };
                    self.consume(
                        TokenKind::LParen,
                        &format!("'(' after {}", kind_tok.lexeme),
                    )?;
                    let declared = names(&bindings);
                    let body = self.expression(&declared)?;
                    self.consume(
                        TokenKind::RParen,
                        "')' closing the return expression",
                    )?;
                    self.consume(
                        TokenKind::Semicolon,
                        "';' after @return",
                    )?;
                    ret = Some(ReturnExpr { kind, body });
                }
                _ => {
                    return Err(self.expected(
                        "a variable binding, status, or @return",
                    ));
                }
            }
        }
        match ret {
            Some(ret) => Ok(Route {
                method,
                pattern,
                bindings,
                status,
                ret,
            }),
            None => Err(self.expected("@return in the route body")),
        }
    }

    // --- expressions -------------------------------------------------------

    fn expression(
        &mut self,
        declared: &[String],
    ) -> Result<Expression, Error> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Str => {
                self.advance()?;
                Ok(Expression::Literal(Value::Str(tok.lexeme)))
            }
            TokenKind::Number => {
                self.advance()?;
                Ok(Expression::Literal(number_value(&tok)?))
            }
            TokenKind::Var => {
                self.advance()?;
                self.check_declared(&tok, declared)?;
                Ok(Expression::Var(tok.lexeme))
            }
            TokenKind::LBrace => self.object(declared),
            TokenKind::LBracket => self.array(declared),
            TokenKind::Ident => {
                self.advance()?;
                if self.check(TokenKind::LParen) {
                    self.call(tok, declared)
                } else {
                    // a bare identifier reads as an unquoted string
                    Ok(Expression::Literal(match tok.lexeme.as_str() {
                        "false" => Value::Bool(false),
                        "null" => Value::Null,
                        "true" => Value::Bool(true),
                        _ => Value::Str(tok.lexeme),
                    }))
                }
            }
            _ => Err(self.expected("an expression")),
        }
    }

    fn call(
        &mut self,
        name: Token,
        declared: &[String],
    ) -> Result<Expression, Error> {
        self.consume(
            TokenKind::LParen,
            &format!("'(' after {}", name.lexeme),
        )?;
        match name.lexeme.as_str() {
            "param" => {
                self.consume(
                    TokenKind::Colon,
                    "':' before a path parameter name",
                )?;
                let par = self
                    .consume(TokenKind::Ident, "a path parameter name")?;
                self.consume(TokenKind::RParen, "')' closing param(...)")?;
                Ok(Expression::Param(par.lexeme))
            }
            "query" => {
                let arg = self.name_argument("a query parameter name")?;
                self.consume(TokenKind::RParen, "')' closing query(...)")?;
                Ok(Expression::Query(arg))
            }
            "body" => {
                let arg = self.name_argument("a body field name")?;
                self.consume(TokenKind::RParen, "')' closing body(...)")?;
                Ok(Expression::Body(arg))
            }
            "header" => {
                let arg = self.name_argument("a header name")?;
                self.consume(TokenKind::RParen, "')' closing header(...)")?;
                Ok(Expression::Header(arg))
            }
            "var" => {
                let tok = self
                    .consume(TokenKind::Var, "a variable like --name")?;
                self.check_declared(&tok, declared)?;
                self.consume(TokenKind::RParen, "')' closing var(...)")?;
                Ok(Expression::Var(tok.lexeme))
            }
            "env" => Ok(Expression::Literal(self.env_args()?)),
            "sql" => {
                let template = self
                    .consume(TokenKind::Str, "an SQL template string")?;
                let mut args = Vec::new();
                while self.eat(TokenKind::Comma)? {
                    if self.check(TokenKind::RParen) {
                        break;
                    }
                    args.push(self.expression(declared)?);
                }
                self.consume(TokenKind::RParen, "')' closing sql(...)")?;
                Ok(Expression::Sql(template.lexeme, args))
            }
            "if" => self.if_body(declared),
            "json" | "html" => Err(err_at(
                &name,
                format!(
                    "{}(...) is only allowed in @return",
                    name.lexeme,
                ),
            )),
            "not" => Err(err_at(
                &name,
                "not(...) is only valid inside if(...) conditions",
            )),
            _ => Err(err_at(
                &name,
                format!("unknown function '{}'", name.lexeme),
            )),
        }
    }

    // `if` clauses with the leading '(' already consumed.
    fn if_body(
        &mut self,
        declared: &[String],
    ) -> Result<Expression, Error> {
        let mut clauses = Vec::new();
        let mut else_arm = None;
        loop {
            if self.check(TokenKind::RParen) {
                break;
            }
            if self.check_ident("else") {
                self.advance()?;
                self.consume(TokenKind::Colon, "':' after else")?;
                else_arm = Some(Box::new(self.expression(declared)?));
                self.eat(TokenKind::Semicolon)?;
                break;
            }
            let cond = self.condition(declared)?;
            self.consume(TokenKind::Colon, "':' after an if condition")?;
            let expr = self.expression(declared)?;
            clauses.push((cond, expr));
            if !self.eat(TokenKind::Semicolon)? {
                break;
            }
        }
        self.consume(TokenKind::RParen, "')' closing if(...)")?;
        Ok(Expression::If(clauses, else_arm))
    }

    fn object(
        &mut self,
        declared: &[String],
    ) -> Result<Expression, Error> {
        self.consume(TokenKind::LBrace, "'{' starting an object literal")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let key = self.current.clone();
            match key.kind {
                TokenKind::Ident | TokenKind::Str => {
                    self.advance()?;
                }
                _ => return Err(self.expected("an object key")),
            }
            self.consume(TokenKind::Colon, "':' after object key")?;
            let value = self.expression(declared)?;
            fields.push((key.lexeme, value));
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "'}' closing an object literal")?;
        Ok(Expression::Object(fields))
    }

    fn array(
        &mut self,
        declared: &[String],
    ) -> Result<Expression, Error> {
        self.consume(
            TokenKind::LBracket,
            "'[' starting an array literal",
        )?;
        let mut items = Vec::new();
        while !self.check(TokenKind::RBracket) {
            items.push(self.expression(declared)?);
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.consume(
            TokenKind::RBracket,
            "']' closing an array literal",
        )?;
        Ok(Expression::Array(items))
    }

    // --- conditions --------------------------------------------------------
    //
    // Precedence, highest to lowest: not > comparisons > and > or.

    fn condition(
        &mut self,
        declared: &[String],
    ) -> Result<Condition, Error> {
        self.cond_or(declared)
    }

    fn cond_or(
        &mut self,
        declared: &[String],
    ) -> Result<Condition, Error> {
        let mut left = self.cond_and(declared)?;
        while self.check_ident("or") {
            self.advance()?;
            let right = self.cond_and(declared)?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn cond_and(
        &mut self,
        declared: &[String],
    ) -> Result<Condition, Error> {
        let mut left = self.cond_not(declared)?;
        while self.check_ident("and") {
            self.advance()?;
            let right = self.cond_not(declared)?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn cond_not(
        &mut self,
        declared: &[String],
    ) -> Result<Condition, Error> {
        if self.check_ident("not") {
            self.advance()?;
            return Ok(Condition::Not(Box::new(
                self.cond_not(declared)?,
            )));
        }
        if self.check(TokenKind::LParen) {
            self.advance()?;
            let cond = self.cond_or(declared)?;
            self.consume(
                TokenKind::RParen,
                "')' closing a condition group",
            )?;
            return Ok(cond);
        }
        self.comparison(declared)
    }

    fn comparison(
        &mut self,
        declared: &[String],
    ) -> Result<Condition, Error> {
        let tok = self.current.clone();
        let lhs = self.expression(declared)?;
        let op = match self.current.kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::Ge => CmpOp::Ge,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Ne => CmpOp::Ne,
            _ => {
                // a bare variable is a truthiness test
                return match lhs {
                    Expression::Var(name) => Ok(Condition::Truthy(name)),
                    _ => Err(err_at(
                        &tok,
                        "expected a comparison operator",
                    )),
                };
            }
        };
        self.advance()?;
        let rhs = self.expression(declared)?;
        Ok(Condition::Cmp(op, lhs, rhs))
    }

    // --- plumbing ----------------------------------------------------------

    fn advance(&mut self) -> Result<Token, Error> {
        Ok(std::mem::replace(
            &mut self.current,
            self.lexer.next_token()?,
        ))
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn check_ident(&self, word: &str) -> bool {
        self.current.kind == TokenKind::Ident
            && self.current.lexeme == word
    }

    fn check_declared(
        &self,
        tok: &Token,
        declared: &[String],
    ) -> Result<(), Error> {
        if declared.iter().any(|name| *name == tok.lexeme) {
            Ok(())
        } else {
            Err(err_at(
                tok,
                format!("undeclared variable '--{}'", tok.lexeme),
            ))
        }
    }

    fn consume(
        &mut self,
        kind: TokenKind,
        what: &str,
    ) -> Result<Token, Error> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.expected(what))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> Result<bool, Error> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expected(&self, what: &str) -> Error {
        Error::parse(
            self.current.line,
            self.current.column,
            format!("expected {}", what),
        )
    }

    // an identifier or string argument
    fn name_argument(&mut self, what: &str) -> Result<String, Error> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Ident | TokenKind::Str => {
                self.advance()?;
                Ok(tok.lexeme)
            }
            _ => Err(self.expected(what)),
        }
    }
}

fn err_at<T: std::fmt::Display>(tok: &Token, text: T) -> Error {
    Error::parse(tok.line, tok.column, text)
}

fn names(bindings: &[Binding]) -> Vec<String> {
    bindings.iter().map(|b| b.name.clone()).collect()
}

fn number_value(tok: &Token) -> Result<Value, Error> {
    if let Ok(i) = tok.lexeme.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    tok.lexeme
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| err_at(tok, format!("invalid number '{}'", tok.lexeme)))
}
