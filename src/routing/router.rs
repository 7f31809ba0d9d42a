//! Route table and lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Resolve (method, path) to a route and its parameters
//! - Return an explicit NotFound, with the methods that did match the path
//!
//! # Design Decisions
//! - Immutable once built; the dispatcher publishes new snapshots copy-on-write
//! - First registered match wins; no specificity sorting
//! - HEAD is served by GET routes when no earlier HEAD route matches
//! - Non-strict tables ignore one trailing slash on both sides

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::http::Handler;
use crate::middleware::Middleware;
use crate::routing::pattern::{Params, Pattern};
use crate::validation::{ResponseSchemas, Validator};

/// Which request methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Every method.
    Any,
    /// A single method.
    Only(Method),
}

impl MethodFilter {
    /// Returns true if a request with `method` may be served by this route.
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(expected) => {
                expected == method || (*method == Method::HEAD && *expected == Method::GET)
            }
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Only(method)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("ALL"),
            MethodFilter::Only(method) => f.write_str(method.as_str()),
        }
    }
}

/// A registered route. Immutable once in a table.
pub struct Route {
    pub method: MethodFilter,
    pub pattern: Pattern,
    pub handler: Arc<dyn Handler>,
    /// Route and group middleware, outermost first.
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Validators, in declaration order.
    pub validators: Vec<Validator>,
    pub responses: ResponseSchemas,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("middleware", &self.middleware.len())
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: Params,
}

/// Outcome of resolving a request.
#[derive(Debug)]
pub enum Resolution {
    Matched(RouteMatch),
    /// No route accepts the request. `allowed` lists the filters of routes whose
    /// pattern matched the path under another method.
    NotFound { allowed: Vec<MethodFilter> },
}

/// Ordered, immutable collection of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    strict: bool,
}

impl RouteTable {
    /// Create an empty table. `strict` keeps trailing slashes significant.
    pub fn new(strict: bool) -> Self {
        Self {
            routes: Vec::new(),
            strict,
        }
    }

    /// Append a route. Later routes only win where earlier ones do not match.
    pub fn push(&mut self, route: Arc<Route>) {
        self.routes.push(route);
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    /// Resolve a request to the first route that accepts it.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let path = self.normalize(path);
        let mut allowed = Vec::new();

        for route in &self.routes {
            if route.method.accepts(method) {
                if let Some(params) = route.pattern.matches(path) {
                    return Resolution::Matched(RouteMatch {
                        route: route.clone(),
                        params,
                    });
                }
            } else if route.pattern.matches(path).is_some() && !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        Resolution::NotFound { allowed }
    }

    /// Apply the trailing-slash policy to a path or pattern source.
    pub fn normalize<'a>(&self, path: &'a str) -> &'a str {
        normalize(path, self.strict)
    }
}

pub(crate) fn normalize(path: &str, strict: bool) -> &str {
    if strict || path.len() <= 1 {
        path
    } else {
        path.strip_suffix('/').unwrap_or(path)
    }
}
