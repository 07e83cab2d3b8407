//! Static table of routes subject to admission control.
//!
//! Patterns are `/`-separated. `*` matches exactly one segment, `**` matches zero or
//! more segments, anything else matches literally. Empty segments in request paths
//! (doubled or trailing slashes) are ignored.

use http::Method;

/// Methods that change server state.
pub const MUTATING_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Errors produced when parsing a route pattern.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route pattern '{pattern}' must start with '/'")]
    MissingLeadingSlash { pattern: String },
    #[error("route pattern '{pattern}': wildcard must span a whole segment (got '{segment}')")]
    PartialWildcard { pattern: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Any,
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash { pattern: pattern.to_owned() });
        }
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "**" => Ok(Segment::Any),
                "*" => Ok(Segment::One),
                s if s.contains('*') => Err(RouteError::PartialWildcard {
                    pattern: pattern.to_owned(),
                    segment: s.to_owned(),
                }),
                s => Ok(Segment::Literal(s.to_owned())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { raw: pattern.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

/// Wildcard match with single-point backtracking: only the most recent `**` is ever
/// revisited, so matching is O(pattern × path) however many `**` a pattern holds.
fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    let (mut p, mut s) = (0, 0);
    // (pattern index after the last `**`, path index it currently absorbs up to)
    let mut resume: Option<(usize, usize)> = None;

    while s < path.len() {
        match pattern.get(p) {
            Some(Segment::Any) => {
                resume = Some((p + 1, s));
                p += 1;
            }
            Some(Segment::One) => {
                p += 1;
                s += 1;
            }
            Some(Segment::Literal(literal)) if literal == path[s] => {
                p += 1;
                s += 1;
            }
            _ => match resume {
                Some((after_any, absorbed)) => {
                    resume = Some((after_any, absorbed + 1));
                    p = after_any;
                    s = absorbed + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|segment| *segment == Segment::Any)
}

/// One protected route: a path pattern, optionally restricted to some methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pattern: PathPattern,
    // empty = any method
    methods: Vec<Method>,
}

impl RouteRule {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.matches(path)
    }
}

/// The set of routes the admission layer guards. Requests matching no rule bypass it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedRoutes {
    rules: Vec<RouteRule>,
}

impl ProtectedRoutes {
    /// An empty table: nothing is protected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect every route and method.
    pub fn all() -> Self {
        Self {
            rules: vec![RouteRule {
                pattern: PathPattern { raw: "/**".into(), segments: vec![Segment::Any] },
                methods: Vec::new(),
            }],
        }
    }

    /// Protect `pattern` for every method.
    pub fn protect(self, pattern: &str) -> Result<Self, RouteError> {
        self.protect_methods(pattern, std::iter::empty())
    }

    /// Protect `pattern` for the given methods only.
    ///
    /// ```
    /// use keygate::{ProtectedRoutes, MUTATING_METHODS};
    /// use http::Method;
    /// let routes = ProtectedRoutes::new()
    ///     .protect_methods("/api/v1/transactions/**", MUTATING_METHODS)
    ///     .unwrap();
    /// assert!(routes.is_protected(&Method::POST, "/api/v1/transactions"));
    /// assert!(!routes.is_protected(&Method::GET, "/api/v1/transactions/7"));
    /// ```
    pub fn protect_methods(
        mut self,
        pattern: &str,
        methods: impl IntoIterator<Item = Method>,
    ) -> Result<Self, RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        self.rules.push(RouteRule { pattern, methods: methods.into_iter().collect() });
        Ok(self)
    }

    pub fn is_protected(&self, method: &Method, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(method, path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
