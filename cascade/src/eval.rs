//! The expression interpreter.
//!
//! A plain recursive walk; recursion depth is bounded by the size of the
//! source.  All evaluator state lives in the [`RequestContext`
//! ](../context/struct.RequestContext.html), so any number of requests may
//! evaluate concurrently against one shared [`DatabaseIf`
//! ](../database/struct.DatabaseIf.html).
//!

use crate::ast::{CmpOp, Condition, Expression, ReturnKind, Route};
use crate::context::RequestContext;
use crate::database::DatabaseIf;
use crate::sql;
use crate::value::Value;
use crate::Error;

/// What a route evaluation produces: the computed status, the return kind,
/// and the materialized return value.
///
#[derive(Clone, Debug)]
pub struct RouteReply {
    pub status: u16,
    pub kind: ReturnKind,
    pub value: Value,
}

/// Interprets expressions against a request context.
///
/// SQL failures never escape: they fold into the in-band value
/// `{"error": "<message>"}` so route code can branch on them.  An `Err`
/// from this type means an evaluator bug and becomes a 500 downstream.
///
pub struct Evaluator {
    db: DatabaseIf,
}

impl Evaluator {
    pub fn new(db: DatabaseIf) -> Self {
        Self { db }
    }

    /// Evaluate the route against `ctx`: bindings strictly in source
    /// order, then the status override, then the return expression.
    ///
    pub fn run_route(
        &self,
        route: &Route,
        ctx: &mut RequestContext,
    ) -> Result<RouteReply, Error> {
        for binding in &route.bindings {
            let value = self.expression(&binding.value, ctx)?;
            ctx.variables.insert(binding.name.clone(), value);
        }
        let status = match &route.status {
            Some(expr) => status_code(&self.expression(expr, ctx)?),
            None => 200,
        };
        let value = self.expression(&route.ret.body, ctx)?;
        Ok(RouteReply {
            status,
            kind: route.ret.kind,
            value,
        })
    }

    /// Evaluate one expression.
    ///
    pub fn expression(
        &self,
        expr: &Expression,
        ctx: &RequestContext,
    ) -> Result<Value, Error> {
        match expr {
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.expression(item, ctx)?);
                }
                Ok(Value::Arr(values))
            }
            Expression::Body(name) => Ok(match &ctx.body {
                Value::Obj(fields) => fields
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            Expression::Header(name) => Ok(ctx
                .headers
                .get(&name.to_lowercase())
                .map(|value| Value::Str(value.clone()))
                .unwrap_or(Value::Null)),
            Expression::If(clauses, else_arm) => {
                for (cond, expr) in clauses {
                    if self.condition(cond, ctx)? {
                        return self.expression(expr, ctx);
                    }
                }
                match else_arm {
                    Some(expr) => self.expression(expr, ctx),
                    None => Ok(Value::Null),
                }
            }
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Object(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (key, expr) in fields {
                    values.push((
                        key.clone(),
                        self.expression(expr, ctx)?,
                    ));
                }
                Ok(Value::Obj(values))
            }
            Expression::Param(name) => Ok(ctx
                .params
                .get(name)
                .map(|value| Value::Str(value.clone()))
                .unwrap_or(Value::Null)),
            Expression::Query(name) => Ok(ctx
                .query
                .get(name)
                .map(|value| Value::Str(value.clone()))
                .unwrap_or(Value::Null)),
            Expression::Sql(template, args) => {
                self.sql(template, args, ctx)
            }
            Expression::Var(name) => self.variable(name, ctx),
        }
    }

    /// Evaluate one condition.  `and`/`or` short-circuit left to right.
    ///
    pub fn condition(
        &self,
        cond: &Condition,
        ctx: &RequestContext,
    ) -> Result<bool, Error> {
        match cond {
            Condition::And(left, right) => {
                Ok(self.condition(left, ctx)?
                    && self.condition(right, ctx)?)
            }
            Condition::Cmp(op, lhs, rhs) => {
                let a = self.expression(lhs, ctx)?;
                let b = self.expression(rhs, ctx)?;
                Ok(match op {
                    CmpOp::Eq => a.loose_eq(&b),
                    CmpOp::Ne => !a.loose_eq(&b),
                    CmpOp::Ge => ordered(&a, &b, |x, y| x >= y),
                    CmpOp::Gt => ordered(&a, &b, |x, y| x > y),
                    CmpOp::Le => ordered(&a, &b, |x, y| x <= y),
                    CmpOp::Lt => ordered(&a, &b, |x, y| x < y),
                })
            }
            Condition::Not(inner) => Ok(!self.condition(inner, ctx)?),
            Condition::Or(left, right) => {
                Ok(self.condition(left, ctx)?
                    || self.condition(right, ctx)?)
            }
            Condition::Truthy(name) => {
                Ok(self.variable(name, ctx)?.is_truthy())
            }
        }
    }

    // --- private -----------------------------------------------------------

    fn sql(
        &self,
        template: &str,
        args: &[Expression],
        ctx: &RequestContext,
    ) -> Result<Value, Error> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.expression(arg, ctx)?);
        }
        match sql::to_db_values(&values)
            .and_then(|vals| sql::run(&self.db, template, &vals))
        {
            Ok(value) => Ok(value),
            Err(
                e @ (Error::BadSqlArg(_)
                | Error::Database(_)
                | Error::NoDatabase),
            ) => Ok(error_value(&e)),
            Err(other) => Err(other),
        }
    }

    // Guaranteed present by the load-time reference check.
    fn variable(
        &self,
        name: &str,
        ctx: &RequestContext,
    ) -> Result<Value, Error> {
        ctx.variables.get(name).cloned().ok_or_else(|| {
            Error::this_cannot_happen(format!("unbound variable --{}", name))
        })
    }
}

/// The in-band value a recoverable SQL failure turns into.
///
pub fn error_value(error: &Error) -> Value {
    Value::Obj(vec![(
        "error".to_string(),
        Value::Str(error.sql_message()),
    )])
}

// Coerce a status override.  Non-numeric values have nothing to override
// with and fall back to 200.
fn status_code(value: &Value) -> u16 {
    value
        .as_number()
        .map(|n| n as i64)
        .filter(|n| (100..=599).contains(n))
        .map(|n| n as u16)
        .unwrap_or(200)
}

fn ordered<F>(a: &Value, b: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        DbConn, DbValue, ExecOutcome, NullConn, SqlRow,
    };
    use crate::parser::parse;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // Records every statement it sees; answers empty/1-row results.
    struct ProbeConn {
        calls: Mutex<Vec<(String, Vec<DbValue>)>>,
    }

    impl ProbeConn {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Vec<DbValue>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DbConn for ProbeConn {
        fn exec(
            &self,
            sql: &str,
            values: &[DbValue],
        ) -> Result<ExecOutcome, Error> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), values.to_vec()));
            Ok(ExecOutcome {
                changes: 1,
                last_insert_id: 1,
            })
        }

        fn query(
            &self,
            sql: &str,
            values: &[DbValue],
        ) -> Result<Vec<SqlRow>, Error> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), values.to_vec()));
            Ok(Vec::new())
        }
    }

    fn null_eval() -> Evaluator {
        Evaluator::new(DatabaseIf::new(Arc::new(NullConn)))
    }

    fn ctx() -> RequestContext {
        RequestContext::new(HashMap::new(), "", &[], b"")
    }

    fn route_of(source: &str) -> Route {
        parse(source).unwrap().routes.remove(0)
    }

    #[test]
    fn test_lookups_default_to_null() {
        let eval = null_eval();
        let ctx = ctx();
        for expr in [
            Expression::Param("missing".to_string()),
            Expression::Query("missing".to_string()),
            Expression::Body("missing".to_string()),
            Expression::Header("missing".to_string()),
        ] {
            assert_eq!(eval.expression(&expr, &ctx).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let eval = null_eval();
        let ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[("X-Role".to_string(), "admin".to_string())],
            b"",
        );
        assert_eq!(
            eval.expression(
                &Expression::Header("X-Role".to_string()),
                &ctx,
            )
            .unwrap(),
            Value::Str("admin".to_string()),
        );
    }

    #[test]
    fn test_bindings_evaluate_in_order() {
        let route = route_of(
            r#"
            [path="/"]:GET {
                --a: 1;
                --b: var(--a);
                @return json([var(--a), var(--b)]);
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        assert_eq!(
            reply.value,
            Value::Arr(vec![Value::Int(1), Value::Int(1)]),
        );
        assert_eq!(reply.status, 200);
    }

    #[test]
    fn test_if_chain_and_else_default() {
        let route = route_of(
            r#"
            [path="/age"]:GET {
                --a: query(age);
                @return json(if(
                    --a >= 18: {"k": "adult"};
                    --a >= 13: {"k": "teen"};
                    else: {"k": "child"}
                ));
            }
            "#,
        );
        let eval = null_eval();
        for (age, expected) in
            [("21", "adult"), ("15", "teen"), ("8", "child"),
             ("abc", "child")]
        {
            let mut ctx = RequestContext::new(
                HashMap::new(),
                &format!("age={}", age),
                &[],
                b"",
            );
            let reply = eval.run_route(&route, &mut ctx).unwrap();
            assert_eq!(
                reply.value,
                Value::Obj(vec![(
                    "k".to_string(),
                    Value::Str(expected.to_string()),
                )]),
                "age={}",
                age,
            );
        }
    }

    #[test]
    fn test_if_without_match_or_else_is_null() {
        let route = route_of(
            r#"
            [path="/"]:GET {
                --a: query(a);
                @return json(if(--a: 1));
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.value, Value::Null);
    }

    #[test]
    fn test_status_override() {
        let route = route_of(
            r#"
            [path="/a"]:GET {
                --r: header(x-role);
                status: if(--r = admin: 200; else: 403);
                @return json(if(--r = admin: {"ok": true};
                                else: {"err": "nope"}));
            }
            "#,
        );
        let eval = null_eval();
        let mut ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[("X-Role".to_string(), "admin".to_string())],
            b"",
        );
        let reply = eval.run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.status, 200);
        let mut ctx = RequestContext::new(HashMap::new(), "", &[], b"");
        let reply = eval.run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.status, 403);
        assert_eq!(
            reply.value,
            Value::Obj(vec![(
                "err".to_string(),
                Value::Str("nope".to_string()),
            )]),
        );
    }

    #[test]
    fn test_non_numeric_status_falls_back_to_200() {
        let route = route_of(
            r#"
            [path="/"]:GET {
                status: potato;
                @return json(null);
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.status, 200);
    }

    #[test]
    fn test_sql_without_database_is_in_band() {
        let route = route_of(
            r#"
            [path="/"]:GET {
                @return json(sql("SELECT 1"));
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        assert_eq!(
            reply.value,
            Value::Obj(vec![(
                "error".to_string(),
                Value::Str("no database configured".to_string()),
            )]),
        );
    }

    #[test]
    fn test_bad_sql_arg_is_in_band() {
        let route = route_of(
            r#"
            [path="/"]:GET {
                @return json(sql("SELECT ?", []));
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        match reply.value {
            Value::Obj(fields) => {
                assert_eq!(fields[0].0, "error");
            }
            other => panic!("expected an error object, got {:?}", other),
        }
    }

    #[test]
    fn test_booleans_bind_as_integers() {
        let probe = ProbeConn::new();
        let eval = Evaluator::new(DatabaseIf::new(probe.clone()));
        let route = route_of(
            r#"
            [path="/"]:GET {
                @return json(sql("UPDATE t SET b = ?", true));
            }
            "#,
        );
        let mut ctx = ctx();
        eval.run_route(&route, &mut ctx).unwrap();
        let calls = probe.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec![DbValue::Int(1)]);
    }

    #[test]
    fn test_and_short_circuits() {
        let probe = ProbeConn::new();
        let eval = Evaluator::new(DatabaseIf::new(probe.clone()));
        let route = route_of(
            r#"
            [path="/"]:GET {
                --flag: query(flag);
                @return json(if(
                    --flag and sql("SELECT 1 FROM t") = 1: "yes";
                    else: "no"
                ));
            }
            "#,
        );
        let mut ctx = ctx();
        let reply = eval.run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.value, Value::Str("no".to_string()));
        assert!(
            probe.calls().is_empty(),
            "the right operand of a falsy 'and' must not evaluate",
        );
    }

    #[test]
    fn test_or_short_circuits() {
        let probe = ProbeConn::new();
        let eval = Evaluator::new(DatabaseIf::new(probe.clone()));
        let route = route_of(
            r#"
            [path="/"]:GET {
                --flag: query(flag);
                @return json(if(
                    --flag or sql("SELECT 1 FROM t") = 1: "yes";
                    else: "no"
                ));
            }
            "#,
        );
        let mut ctx = RequestContext::new(
            HashMap::new(),
            "flag=1",
            &[],
            b"",
        );
        let reply = eval.run_route(&route, &mut ctx).unwrap();
        assert_eq!(reply.value, Value::Str("yes".to_string()));
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_param_is_a_string() {
        let route = route_of(
            r#"
            [path="/u/:id"]:GET {
                --id: param(:id);
                @return json({"id": var(--id)});
            }
            "#,
        );
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        let mut ctx = RequestContext::new(params, "", &[], b"");
        let reply = null_eval().run_route(&route, &mut ctx).unwrap();
        assert_eq!(
            reply.value,
            Value::Obj(vec![(
                "id".to_string(),
                Value::Str("42".to_string()),
            )]),
        );
    }
}
