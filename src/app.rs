//! Application builder.
//!
//! # Responsibilities
//! - Record route and middleware registrations in order
//! - Compose groups, mounted sub-apps and guards into flat routes
//! - Build the immutable route table and hand it to a `Dispatcher`
//!
//! # Design Decisions
//! - Registration is an ordered log consumed once by `build`
//! - Group prefixes and guard options are folded into each route at
//!   registration time; nothing is looked up by prefix at request time
//! - Middleware registered on a sub-app, group or guard only wraps that
//!   sub-app's routes
//! - Pattern and status errors surface from `build`, never at request time

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::Value;

use crate::config::{AppConfig, ConfigError};
use crate::dispatch::{Dispatcher, DispatcherParts};
use crate::error::{DispatchError, ErrorHandler};
use crate::http::context::Decorators;
use crate::http::{Context, Handler, Response, Store};
use crate::middleware::{Middleware, ScopedMiddleware};
use crate::routing::router::normalize;
use crate::routing::{MethodFilter, Pattern, PatternError, Route, RouteTable};
use crate::validation::{ResponseSchemas, Schema, Validator};

/// Join a prefix and a path. A `/` path names the prefix itself.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match path {
        "" | "/" if prefix.is_empty() => "/".to_string(),
        "" | "/" => prefix.to_string(),
        _ if path.starts_with('/') => format!("{}{}", prefix, path),
        _ => format!("{}/{}", prefix, path),
    }
}

/// A middleware registration, optionally limited to a path pattern.
#[derive(Clone)]
struct MiddlewareDecl {
    scope: Option<String>,
    middleware: Arc<dyn Middleware>,
}

impl MiddlewareDecl {
    /// Re-root a scoped registration under a mount prefix.
    fn prefixed(&self, prefix: &str) -> Self {
        Self {
            scope: self.scope.as_ref().map(|scope| join(prefix, scope)),
            middleware: self.middleware.clone(),
        }
    }

    fn compile(&self, strict: bool) -> Result<ScopedMiddleware, PatternError> {
        Ok(match &self.scope {
            Some(scope) => ScopedMiddleware::scoped(
                Pattern::compile(normalize(scope, strict))?,
                self.middleware.clone(),
                strict,
            ),
            None => ScopedMiddleware::global(self.middleware.clone()),
        })
    }
}

/// Per-route options: validators, middleware and response schemas.
///
/// Also used as a guard, applying the same options to a block of routes.
#[derive(Clone, Default)]
pub struct RouteOptions {
    validators: Vec<Validator>,
    middleware: Vec<MiddlewareDecl>,
    responses: ResponseSchemas,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator. Validators run in the order added.
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Add a route middleware. Route middleware run inside app middleware.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(MiddlewareDecl {
            scope: None,
            middleware: Arc::new(middleware),
        });
        self
    }

    /// Declare the `200 OK` response schema.
    pub fn response(self, schema: Schema) -> Self {
        self.response_for(200, schema)
    }

    /// Declare the response schema for `status`.
    pub fn response_for(mut self, status: u16, schema: Schema) -> Self {
        self.responses.insert(status, schema);
        self
    }

    /// Fold an enclosing guard into these options. The guard's validators and
    /// middleware run first; the nearest response schema wins.
    fn inherit(&mut self, outer: &RouteOptions) {
        let mut validators = outer.validators.clone();
        validators.append(&mut self.validators);
        self.validators = validators;

        let mut middleware = outer.middleware.clone();
        middleware.append(&mut self.middleware);
        self.middleware = middleware;

        self.responses.inherit(&outer.responses);
    }

    fn prefixed(&mut self, prefix: &str) {
        for decl in &mut self.middleware {
            *decl = decl.prefixed(prefix);
        }
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("validators", &self.validators)
            .field("middleware", &self.middleware.len())
            .field("responses", &self.responses)
            .finish()
    }
}

struct RouteDecl {
    method: MethodFilter,
    path: String,
    handler: Arc<dyn Handler>,
    options: RouteOptions,
}

/// Several methods on one path: `app.route("/endpoint", |r| r.get(a).post(b))`.
#[derive(Default)]
pub struct MethodRouter {
    entries: Vec<(MethodFilter, Arc<dyn Handler>)>,
}

impl MethodRouter {
    pub fn on(mut self, method: impl Into<MethodFilter>, handler: impl Handler) -> Self {
        self.entries.push((method.into(), Arc::new(handler)));
        self
    }

    pub fn get(self, handler: impl Handler) -> Self {
        self.on(Method::GET, handler)
    }

    pub fn post(self, handler: impl Handler) -> Self {
        self.on(Method::POST, handler)
    }

    pub fn put(self, handler: impl Handler) -> Self {
        self.on(Method::PUT, handler)
    }

    pub fn delete(self, handler: impl Handler) -> Self {
        self.on(Method::DELETE, handler)
    }

    pub fn patch(self, handler: impl Handler) -> Self {
        self.on(Method::PATCH, handler)
    }

    pub fn all(self, handler: impl Handler) -> Self {
        self.on(MethodFilter::Any, handler)
    }
}

/// An application: routes, middleware, state and hooks, built into a `Dispatcher`.
#[derive(Default)]
pub struct App {
    base_path: String,
    routes: Vec<RouteDecl>,
    middleware: Vec<MiddlewareDecl>,
    state: Vec<(String, Value)>,
    decorators: Decorators,
    not_found: Option<Arc<dyn Handler>>,
    on_error: Option<ErrorHandler>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every route registered after this call.
    pub fn base_path(mut self, prefix: &str) -> Self {
        self.base_path = join(&self.base_path, prefix);
        self
    }

    /// Register a handler for `method` on `path`.
    pub fn on(self, method: impl Into<MethodFilter>, path: &str, handler: impl Handler) -> Self {
        self.on_with(method, path, RouteOptions::default(), handler)
    }

    /// Register a handler with per-route options.
    pub fn on_with(
        mut self,
        method: impl Into<MethodFilter>,
        path: &str,
        options: RouteOptions,
        handler: impl Handler,
    ) -> Self {
        self.routes.push(RouteDecl {
            method: method.into(),
            path: join(&self.base_path, path),
            handler: Arc::new(handler),
            options,
        });
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn head(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::HEAD, path, handler)
    }

    pub fn options(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::OPTIONS, path, handler)
    }

    /// Register a handler for every method.
    pub fn all(self, path: &str, handler: impl Handler) -> Self {
        self.on(MethodFilter::Any, path, handler)
    }

    pub fn get_with(self, path: &str, options: RouteOptions, handler: impl Handler) -> Self {
        self.on_with(Method::GET, path, options, handler)
    }

    pub fn post_with(self, path: &str, options: RouteOptions, handler: impl Handler) -> Self {
        self.on_with(Method::POST, path, options, handler)
    }

    /// Register several methods on one path.
    pub fn route(mut self, path: &str, f: impl FnOnce(MethodRouter) -> MethodRouter) -> Self {
        let path = join(&self.base_path, path);
        for (method, handler) in f(MethodRouter::default()).entries {
            self.routes.push(RouteDecl {
                method,
                path: path.clone(),
                handler,
                options: RouteOptions::default(),
            });
        }
        self
    }

    /// Add middleware for every request (app level, registration order).
    pub fn use_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(MiddlewareDecl {
            scope: None,
            middleware: Arc::new(middleware),
        });
        self
    }

    /// Add middleware for requests whose path matches `pattern` (e.g. `/admin/*`).
    pub fn use_at(mut self, pattern: &str, middleware: impl Middleware) -> Self {
        self.middleware.push(MiddlewareDecl {
            scope: Some(join(&self.base_path, pattern)),
            middleware: Arc::new(middleware),
        });
        self
    }

    /// Mount every route of `sub` under `prefix`.
    pub fn mount(self, prefix: &str, sub: App) -> Self {
        self.absorb(prefix, sub, None)
    }

    /// Build a sub-app in place and mount it under `prefix`.
    pub fn group(self, prefix: &str, f: impl FnOnce(App) -> App) -> Self {
        let sub = f(App::new());
        self.absorb(prefix, sub, None)
    }

    /// Apply `options` to every route registered inside `f`.
    pub fn guard(self, options: RouteOptions, f: impl FnOnce(App) -> App) -> Self {
        let sub = f(App::new());
        self.absorb("", sub, Some(&options))
    }

    fn absorb(mut self, prefix: &str, sub: App, guard: Option<&RouteOptions>) -> Self {
        let prefix = join(&self.base_path, prefix);
        let prefix = if prefix == "/" { String::new() } else { prefix };

        let sub_middleware: Vec<MiddlewareDecl> = sub
            .middleware
            .iter()
            .map(|decl| decl.prefixed(&prefix))
            .collect();

        for mut decl in sub.routes {
            decl.options.prefixed(&prefix);
            let mut outer = guard.cloned().unwrap_or_default();
            outer.middleware.extend(sub_middleware.iter().cloned());
            decl.options.inherit(&outer);
            decl.path = join(&prefix, &decl.path);
            self.routes.push(decl);
        }

        self.state.extend(sub.state);
        self.decorators.extend(sub.decorators);
        if sub.not_found.is_some() || sub.on_error.is_some() {
            tracing::debug!(prefix = %prefix, "Hooks of a mounted app are ignored");
        }
        self
    }

    /// Seed a value in the shared store (`ctx.store()`).
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.push((key.into(), value.into()));
        self
    }

    /// Attach a typed value to every request (`ctx.decorator::<T>(key)`).
    pub fn decorate<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.decorators.insert(key.into(), Arc::new(value));
        self
    }

    /// Replace the 404 handler.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Replace the handler turning faults into responses.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&DispatchError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Compile the registration log into a dispatcher.
    pub fn build(self, config: &AppConfig) -> Result<Dispatcher, ConfigError> {
        let strict = config.strict;
        let mut table = RouteTable::new(strict);

        for decl in self.routes {
            let pattern = Pattern::compile(normalize(&decl.path, strict))?;
            decl.options.responses.check_statuses(pattern.as_str())?;
            let middleware = decl
                .options
                .middleware
                .iter()
                .map(|m| {
                    m.compile(strict).map(|scoped| match scoped.scope() {
                        Some(_) => Arc::new(scoped) as Arc<dyn Middleware>,
                        None => scoped.middleware().clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            table.push(Arc::new(Route {
                method: decl.method,
                pattern,
                handler: decl.handler,
                middleware,
                validators: decl.options.validators,
                responses: decl.options.responses,
            }));
        }

        let middleware = self
            .middleware
            .iter()
            .map(|m| m.compile(strict))
            .collect::<Result<Vec<_>, _>>()?;

        let store = Store::new();
        for (key, value) in self.state {
            store.set(key, value);
        }

        let not_found = self.not_found.unwrap_or_else(|| {
            let body = config.not_found_body.clone();
            let handler: Arc<dyn Handler> = Arc::new(move |_ctx: Context| {
                let body = body.clone();
                async move { (StatusCode::NOT_FOUND, body) }
            });
            handler
        });
        let on_error = self.on_error.unwrap_or_else(|| {
            let body = config.error_body.clone();
            let hook: ErrorHandler = Arc::new(move |err: &DispatchError| {
                Response::text(body.clone()).with_status(err.status())
            });
            hook
        });

        tracing::info!(
            routes = table.len(),
            middleware = middleware.len(),
            strict,
            verify_responses = config.verify_responses,
            "App built"
        );

        Ok(Dispatcher::new(DispatcherParts {
            table,
            middleware,
            not_found,
            on_error,
            store,
            decorators: Arc::new(self.decorators),
            verify_responses: config.verify_responses,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{from_fn, Next};
    use crate::routing::Resolution;
    use crate::validation::{Field, Target};

    fn ok(_ctx: Context) -> impl std::future::Future<Output = &'static str> {
        async { "ok" }
    }

    fn pass() -> impl Middleware {
        from_fn(|ctx: Context, next: Next| async move { next.run(ctx).await })
    }

    fn patterns(dispatcher: &Dispatcher) -> Vec<String> {
        dispatcher.routes().into_iter().map(|(_, p)| p).collect()
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "/"), "/");
        assert_eq!(join("/book", "/"), "/book");
        assert_eq!(join("/book/", "/:id"), "/book/:id");
        assert_eq!(join("/api", "/v1/book"), "/api/v1/book");
        assert_eq!(join("/admin", "/*"), "/admin/*");
    }

    #[test]
    fn test_mount_and_base_path() {
        let book = App::new().get("/", ok).get("/:id", ok).post("/", ok);
        let api = App::new().base_path("/v1").get("/book", ok);
        let app = App::new().mount("/book", book).mount("/api", api);

        let dispatcher = app.build(&AppConfig::default()).unwrap();
        assert_eq!(
            patterns(&dispatcher),
            vec!["/book", "/book/:id", "/book", "/api/v1/book"]
        );
    }

    #[test]
    fn test_nested_groups() {
        let app = App::new().group("/v1", |g| {
            g.get("/", ok)
                .group("/user", |u| u.post("/sign-in", ok).get("/profile", ok))
        });
        let dispatcher = app.build(&AppConfig::default()).unwrap();
        assert_eq!(
            patterns(&dispatcher),
            vec!["/v1", "/v1/user/sign-in", "/v1/user/profile"]
        );
    }

    #[test]
    fn test_route_builder() {
        let app = App::new().route("/endpoint", |r| r.get(ok).post(ok).delete(ok));
        let dispatcher = app.build(&AppConfig::default()).unwrap();
        let methods: Vec<String> = dispatcher
            .routes()
            .into_iter()
            .map(|(m, _)| m.to_string())
            .collect();
        assert_eq!(methods, vec!["GET", "POST", "DELETE"]);
    }

    #[test]
    fn test_group_middleware_wraps_group_routes_only() {
        let app = App::new()
            .get("/outside", ok)
            .group("/inner", |g| g.use_middleware(pass()).get("/a", ok));
        let dispatcher = app.build(&AppConfig::default()).unwrap();
        let table = dispatcher.table();

        let middleware_count = |path: &str| match table.resolve(&Method::GET, path) {
            Resolution::Matched(m) => m.route.middleware.len(),
            Resolution::NotFound { .. } => panic!("{path} should match"),
        };
        assert_eq!(middleware_count("/outside"), 0);
        assert_eq!(middleware_count("/inner/a"), 1);
    }

    #[test]
    fn test_guard_options_are_inherited() {
        let login = Schema::object([Field::required("username", Schema::String)]);
        let app = App::new().guard(
            RouteOptions::new()
                .validate(Validator::new(Target::Json, login))
                .response(Schema::String),
            |g| {
                g.guard(RouteOptions::new().response(Schema::Number), |g| {
                    g.get("/now-valid", ok)
                })
            },
        );
        let dispatcher = app.build(&AppConfig::default()).unwrap();
        let table = dispatcher.table();
        let route = table.routes().next().unwrap();

        assert_eq!(route.validators.len(), 1);
        assert_eq!(route.responses.get(200), Some(&Schema::Number));
    }

    #[test]
    fn test_build_errors() {
        let bad_pattern = App::new().get("/a/:id/:id", ok);
        assert!(matches!(
            bad_pattern.build(&AppConfig::default()),
            Err(ConfigError::Pattern(_))
        ));

        let bad_status =
            App::new().get_with("/a", RouteOptions::new().response_for(7, Schema::String), ok);
        assert!(matches!(
            bad_status.build(&AppConfig::default()),
            Err(ConfigError::ResponseSchema { status: 7, .. })
        ));
    }

    #[test]
    fn test_non_strict_trims_trailing_slash() {
        let config = AppConfig {
            strict: false,
            ..AppConfig::default()
        };
        let dispatcher = App::new().get("/book/", ok).build(&config).unwrap();
        assert_eq!(patterns(&dispatcher), vec!["/book"]);
    }
}
