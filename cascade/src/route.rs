//! Path patterns and the route table.
//!

use crate::ast::{HttpMethod, Route};
use crate::Error;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

// --- PathPattern -----------------------------------------------------------

/// One segment of a compiled path pattern.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    /// Must match byte-for-byte, case-sensitive, after URL decoding.
    Literal(String),

    /// Matches one non-empty URL-decoded segment and binds it.
    Param(String),
}

/// A compiled path pattern.
///
/// The catch-all form is the whole pattern `"*"`; a `*` among other
/// segments does not compile.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathPattern {
    CatchAll,
    Segments(Vec<Segment>),
}

impl PathPattern {
    /// Match an URL path.  Segment counts must agree exactly, and each
    /// incoming segment is URL-decoded on its own before comparison, so an
    /// encoded slash cannot split a segment.
    ///
    /// Returns the capture map, which has exactly the pattern's parameter
    /// names as keys.
    ///
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let segments = match self {
            Self::CatchAll => return Some(HashMap::new()),
            Self::Segments(segments) => segments,
        };
        let mut params = HashMap::new();
        let mut actual = path.split('/');
        for segment in segments {
            let decoded = decode_segment(actual.next()?);
            match segment {
                Segment::Literal(lit) => {
                    if decoded != *lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if decoded.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), decoded);
                }
            }
        }
        if actual.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// Compile a pattern.  Splits on `/`, preserving the empty leading segment
/// of an absolute path; `:name` segments become parameters.
///
impl FromStr for PathPattern {
    type Err = Error;

    fn from_str(pattern: &str) -> Result<Self, Error> {
        if pattern == "*" {
            return Ok(Self::CatchAll);
        }
        let mut segments = Vec::new();
        for raw in pattern.split('/') {
            if raw == "*" {
                return Err(Error::invalid_input(
                    "'*' must be the whole path pattern",
                ));
            }
            if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    return Err(Error::invalid_input(
                        "':' must be followed by a parameter name",
                    ));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }
        Ok(Self::Segments(segments))
    }
}

/// Re-serializes to the source form.
///
impl Display for PathPattern {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::CatchAll => write!(f, "*"),
            Self::Segments(segments) => {
                let mut first = true;
                for segment in segments {
                    if !first {
                        write!(f, "/")?;
                    }
                    first = false;
                    match segment {
                        Segment::Literal(lit) => write!(f, "{}", lit)?,
                        Segment::Param(name) => write!(f, ":{}", name)?,
                    }
                }
                Ok(())
            }
        }
    }
}

// Plain `urlencoding::decode`; `+` stays `+` in a path segment.  Undecodable
// input falls back to the raw bytes.
fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

// --- RouteTable ------------------------------------------------------------

/// A successful lookup: the index of the route in the program's route list
/// and its capture bindings.
///
#[derive(Clone, Debug)]
pub struct RouteMatch {
    pub route: usize,
    pub params: HashMap<String, String>,
}

/// Routes grouped for dispatch: non-catch-all routes by method in declared
/// order, catch-alls aside in declared order.
///
#[derive(Clone, Debug)]
pub struct RouteTable {
    explicit: HashMap<HttpMethod, Vec<usize>>,
    catch_all: Vec<usize>,
}

impl RouteTable {
    pub fn build(routes: &[Route]) -> Self {
        let mut explicit: HashMap<HttpMethod, Vec<usize>> = HashMap::new();
        let mut catch_all = Vec::new();
        for (ix, route) in routes.iter().enumerate() {
            match route.pattern {
                PathPattern::CatchAll => catch_all.push(ix),
                PathPattern::Segments(_) => {
                    explicit.entry(route.method).or_default().push(ix)
                }
            }
        }
        Self {
            explicit,
            catch_all,
        }
    }

    /// First match wins within each group.  Lookup order: explicit routes
    /// of the method, then (for `HEAD`) explicit `GET` routes, then
    /// catch-alls regardless of method.  Body suppression for `HEAD`
    /// happens downstream.
    ///
    pub fn resolve(
        &self,
        routes: &[Route],
        method: HttpMethod,
        path: &str,
    ) -> Option<RouteMatch> {
        self.scan(routes, self.explicit.get(&method), path)
            .or_else(|| {
                if method == HttpMethod::Head {
                    self.scan(
                        routes,
                        self.explicit.get(&HttpMethod::Get),
                        path,
                    )
                } else {
                    None
                }
            })
            .or_else(|| self.scan(routes, Some(&self.catch_all), path))
    }

    fn scan(
        &self,
        routes: &[Route],
        group: Option<&Vec<usize>>,
        path: &str,
    ) -> Option<RouteMatch> {
        group?.iter().find_map(|&ix| {
            routes[ix].pattern.matches(path).map(|params| RouteMatch {
                route: ix,
                params,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, ReturnExpr, ReturnKind};
    use crate::value::Value;

    fn pattern(s: &str) -> PathPattern {
        s.parse().unwrap()
    }

    fn route(method: HttpMethod, pat: &str) -> Route {
        Route {
            method,
            pattern: pattern(pat),
            bindings: Vec::new(),
            status: None,
            ret: ReturnExpr {
                kind: ReturnKind::Json,
                body: Expression::Literal(Value::Null),
            },
        }
    }

    #[test]
    fn test_compile() {
        assert_eq!(
            pattern("/u/:id"),
            PathPattern::Segments(vec![
                Segment::Literal(String::new()),
                Segment::Literal("u".to_string()),
                Segment::Param("id".to_string()),
            ]),
        );
        assert_eq!(pattern("*"), PathPattern::CatchAll);
        assert!("/a/*".parse::<PathPattern>().is_err());
        assert!("/a/:".parse::<PathPattern>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for source in ["/u/:id", "/", "*", "/a/b/:c/:d"] {
            assert_eq!(pattern(source).to_string(), source);
        }
    }

    #[test]
    fn test_match_literals_and_params() {
        let p = pattern("/users/:id/posts");
        let captures = p.matches("/users/42/posts").unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures["id"], "42");
        assert!(p.matches("/users/42").is_none());
        assert!(p.matches("/users/42/posts/7").is_none());
        assert!(p.matches("/users//posts").is_none());
    }

    #[test]
    fn test_match_decodes_each_segment() {
        let p = pattern("/f/:name");
        let captures = p.matches("/f/a%20b").unwrap();
        assert_eq!(captures["name"], "a b");
        // an encoded slash must not split the segment
        let captures = p.matches("/f/a%2Fb").unwrap();
        assert_eq!(captures["name"], "a/b");
        assert!(p.matches("/f/a/b").is_none());
    }

    #[test]
    fn test_catch_all_matches_anything() {
        assert_eq!(pattern("*").matches("/x/y/z"), Some(HashMap::new()));
        assert_eq!(pattern("*").matches("/"), Some(HashMap::new()));
    }

    #[test]
    fn test_first_match_wins() {
        let routes = vec![
            route(HttpMethod::Get, "/a/:x"),
            route(HttpMethod::Get, "/a/b"),
        ];
        let table = RouteTable::build(&routes);
        let m = table.resolve(&routes, HttpMethod::Get, "/a/b").unwrap();
        assert_eq!(m.route, 0);
        assert_eq!(m.params["x"], "b");
    }

    #[test]
    fn test_catch_all_after_explicit_miss() {
        let routes = vec![
            route(HttpMethod::Get, "/a"),
            route(HttpMethod::Get, "*"),
        ];
        let table = RouteTable::build(&routes);
        assert_eq!(
            table.resolve(&routes, HttpMethod::Get, "/a").unwrap().route,
            0,
        );
        assert_eq!(
            table.resolve(&routes, HttpMethod::Get, "/b").unwrap().route,
            1,
        );
        // a catch-all governs misses of any method
        assert_eq!(
            table.resolve(&routes, HttpMethod::Post, "/b").unwrap().route,
            1,
        );
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let routes = vec![
            route(HttpMethod::Get, "/a"),
            route(HttpMethod::Head, "/b"),
        ];
        let table = RouteTable::build(&routes);
        assert_eq!(
            table.resolve(&routes, HttpMethod::Head, "/a").unwrap().route,
            0,
        );
        assert_eq!(
            table.resolve(&routes, HttpMethod::Head, "/b").unwrap().route,
            1,
        );
        assert!(table.resolve(&routes, HttpMethod::Get, "/b").is_none());
    }
}
