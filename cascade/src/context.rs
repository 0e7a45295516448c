//! The per-request evaluation context.
//!

use crate::value::Value;
use crate::Error;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Everything a route evaluation may read, plus the variables it binds.
/// Lives for one handler invocation; nothing is shared across requests.
///
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// URL captures from the matched path pattern.
    ///
    pub params: HashMap<String, String>,

    /// URL query parameters, URL-decoded.  The first occurrence wins if a
    /// name repeats.
    ///
    pub query: HashMap<String, String>,

    /// The decoded request body.
    ///
    pub body: Value,

    /// Request headers, names lowercased once at construction.
    ///
    pub headers: HashMap<String, String>,

    /// The variables bound so far, in route source order.
    ///
    pub variables: HashMap<String, Value>,
}

impl RequestContext {
    /// Assemble a context from the raw request parts.
    ///
    /// The body is decoded according to the `Content-Type` header:
    /// `application/json` parses into a structured value,
    /// `application/x-www-form-urlencoded` into a flat object of strings,
    /// anything else becomes the empty object.
    ///
    pub fn new(
        params: HashMap<String, String>,
        query: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Self {
        let mut header_map = HashMap::new();
        for (name, value) in headers {
            header_map
                .entry(name.to_lowercase())
                .or_insert_with(|| value.clone());
        }
        let content_type = header_map
            .get("content-type")
            .map(|v| {
                v.split(';').next().unwrap_or("").trim().to_lowercase()
            })
            .unwrap_or_default();
        Self {
            params,
            query: parse_query(query),
            body: decode_body(&content_type, body),
            headers: header_map,
            variables: HashMap::new(),
        }
    }
}

/// Parse a query string into a map of URL-decoded keys and values.  The
/// first occurrence of a repeated name wins.  A name without `=` maps to
/// the empty string.
///
pub fn parse_query(query: &str) -> HashMap<String, String> {
    static QUERY: OnceLock<Regex> = OnceLock::new();
    let shaped = QUERY.get_or_init(|| {
        Regex::new(r"([^&=]+(=[^&=]*)?&)*[^&=]+(=[^&=]*)?").unwrap()
    });
    let mut result = HashMap::new();
    let query = match shaped.captures(query).and_then(|c| c.get(0)) {
        Some(m) => m.as_str(),
        None => return result,
    };
    for key_value in query.split('&') {
        let mut k_v = key_value.split('=');
        let key = match k_v.next() {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        let val = k_v.next().unwrap_or("");
        let key = decode_parameter(key).unwrap_or_else(|_| key.to_string());
        let val = decode_parameter(val).unwrap_or_else(|_| val.to_string());
        result.entry(key).or_insert(val);
    }
    result
}

/// Change `"+"` to `"%20"`, then [`urlencoding::decode()`
/// ](https://docs.rs/urlencoding/latest/urlencoding/fn.decode.html).
///
pub fn decode_parameter(par: &str) -> Result<String, Error> {
    crate::map_error!(
        InvalidInput,
        urlencoding::decode(&par.replace('+', "%20")),
    )
    .map(|s| s.to_string())
}

fn decode_body(content_type: &str, body: &[u8]) -> Value {
    match content_type {
        "application/json" => match serde_json::from_slice(body) {
            Ok(json) => Value::from_json(json),
            Err(e) => {
                log::debug!("unparseable JSON body: {}", e);
                Value::Obj(Vec::new())
            }
        },
        "application/x-www-form-urlencoded" => {
            let text = String::from_utf8_lossy(body);
            let mut fields: Vec<(String, Value)> = Vec::new();
            for (key, val) in parse_query(&text) {
                fields.push((key, Value::Str(val)));
            }
            Value::Obj(fields)
        }
        _ => Value::Obj(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query("a=1&b=x+y&c&a=2&d=%2F");
        assert_eq!(q["a"], "1", "first occurrence wins");
        assert_eq!(q["b"], "x y");
        assert_eq!(q["c"], "");
        assert_eq!(q["d"], "/");
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_headers_are_lowercased() {
        let ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[header("X-Role", "admin")],
            b"",
        );
        assert_eq!(ctx.headers["x-role"], "admin");
    }

    #[test]
    fn test_json_body() {
        let ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[header("Content-Type", "application/json; charset=utf-8")],
            br#"{"n": "x"}"#,
        );
        assert_eq!(
            ctx.body,
            Value::Obj(vec![(
                "n".to_string(),
                Value::Str("x".to_string()),
            )]),
        );
    }

    #[test]
    fn test_urlencoded_body() {
        let ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[header(
                "Content-Type",
                "application/x-www-form-urlencoded",
            )],
            b"n=a+b",
        );
        match &ctx.body {
            Value::Obj(fields) => {
                assert_eq!(
                    fields,
                    &vec![(
                        "n".to_string(),
                        Value::Str("a b".to_string()),
                    )],
                );
            }
            other => panic!("expected object body, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_content_type_is_empty_object() {
        let ctx = RequestContext::new(
            HashMap::new(),
            "",
            &[header("Content-Type", "text/plain")],
            b"whatever",
        );
        assert_eq!(ctx.body, Value::Obj(Vec::new()));
        let ctx =
            RequestContext::new(HashMap::new(), "", &[], b"whatever");
        assert_eq!(ctx.body, Value::Obj(Vec::new()));
    }
}
