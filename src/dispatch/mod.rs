//! Request dispatcher.
//!
//! # Data Flow
//! ```text
//! Received   Context built, store + decorators attached
//!     → app middleware whose scope matches the path (registration order)
//!         → resolve against the current RouteTable snapshot
//!             ✗ NotFound → not-found handler (404)
//! Matched        → params bound
//!                → route/group middleware
//! Validated          → validators in order (first failure answers)
//! Handled            → handler
//!         ← after-phases unwind in reverse
//! Finalized  HEAD body stripped, metrics recorded
//! ```
//!
//! # Design Decisions
//! - Errors and panics never escape: each step is contained and converted by
//!   the error handler (500 by default) with details only in the log
//! - The route table is an `ArcSwap` snapshot; each request resolves against
//!   one snapshot even if routes are added concurrently
//! - Unknown paths still pass through matching app middleware, so cross-cutting
//!   headers also land on 404 responses

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::http::Method;

use crate::error::{DispatchError, ErrorHandler, HandlerError};
use crate::http::context::Decorators;
use crate::http::{Context, Handler, Reply, Response, Store};
use crate::middleware::{contain, Middleware, Next, ScopedMiddleware};
use crate::observability::metrics;
use crate::routing::router::normalize;
use crate::routing::{
    MethodFilter, Pattern, PatternError, Resolution, Route, RouteMatch, RouteTable,
};
use crate::validation::ResponseSchemas;

/// Everything a dispatcher is built from.
pub(crate) struct DispatcherParts {
    pub table: RouteTable,
    pub middleware: Vec<ScopedMiddleware>,
    pub not_found: Arc<dyn Handler>,
    pub on_error: ErrorHandler,
    pub store: Store,
    pub decorators: Arc<Decorators>,
    pub verify_responses: bool,
}

struct Inner {
    table: ArcSwap<RouteTable>,
    middleware: Vec<ScopedMiddleware>,
    not_found: Arc<dyn Handler>,
    on_error: ErrorHandler,
    store: Store,
    decorators: Arc<Decorators>,
    verify_responses: bool,
}

/// Runs requests through middleware, routing, validation and handlers.
///
/// Cheap to clone; clones share the route table and state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(parts: DispatcherParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: ArcSwap::from_pointee(parts.table),
                middleware: parts.middleware,
                not_found: parts.not_found,
                on_error: parts.on_error,
                store: parts.store,
                decorators: parts.decorators,
                verify_responses: parts.verify_responses,
            }),
        }
    }

    /// Dispatch one request. Always yields a response.
    pub async fn handle(&self, mut ctx: Context) -> Response {
        let start = Instant::now();
        let method = ctx.method().clone();
        let path = normalize(ctx.path(), self.is_strict()).to_string();
        ctx.attach(self.inner.store.clone(), self.inner.decorators.clone());

        tracing::debug!(
            phase = "received",
            method = %method,
            path = %path,
            request_id = ctx.request_id().unwrap_or("-"),
            "Dispatching request"
        );

        let chain: Vec<Arc<dyn Middleware>> = self
            .inner
            .middleware
            .iter()
            .filter(|m| m.applies_to(&path))
            .map(|m| m.middleware().clone())
            .collect();

        let this = self.clone();
        let endpoint: Arc<dyn Handler> = Arc::new(move |ctx: Context| {
            let this = this.clone();
            async move { Ok::<_, HandlerError>(this.route(ctx).await) }
        });

        let mut response = Next::new(chain, endpoint, self.inner.on_error.clone())
            .run(ctx)
            .await;

        if method == Method::HEAD {
            response.strip_body();
        }

        tracing::debug!(
            phase = "finalized",
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            outcome = response.outcome(),
            "Request finalized"
        );
        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            response.outcome(),
            start,
        );
        response
    }

    /// Resolve the route and run its part of the pipeline.
    async fn route(&self, mut ctx: Context) -> Response {
        let table = self.inner.table.load_full();
        let path = table.normalize(ctx.path()).to_string();

        match table.resolve(ctx.method(), &path) {
            Resolution::NotFound { allowed } => {
                let err = DispatchError::RouteNotFound {
                    method: ctx.method().clone(),
                    path,
                };
                let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                tracing::debug!(error = %err, allowed = ?allowed, "No route matched");

                let not_found = self.inner.not_found.clone();
                let started =
                    std::panic::catch_unwind(AssertUnwindSafe(|| not_found.call(ctx)));
                let mut response =
                    contain(started, &self.inner.on_error, DispatchError::HandlerFault).await;
                if response.outcome() == "ok" {
                    response.set_outcome(err.kind());
                }
                response
            }
            Resolution::Matched(RouteMatch { route, params }) => {
                tracing::debug!(
                    phase = "matched",
                    route = %route.pattern,
                    method = %route.method,
                    "Route matched"
                );
                ctx.set_params(params);

                let verify = self.inner.verify_responses;
                let target = route.clone();
                let endpoint: Arc<dyn Handler> =
                    Arc::new(move |ctx: Context| invoke(target.clone(), verify, ctx));

                Next::new(route.middleware.clone(), endpoint, self.inner.on_error.clone())
                    .run(ctx)
                    .await
            }
        }
    }

    /// Register a route on the live table. In-flight requests keep the
    /// snapshot they resolved against.
    pub fn add_route<F, Fut>(
        &self,
        method: impl Into<MethodFilter>,
        path: &str,
        handler: F,
    ) -> Result<(), PatternError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future + Send + 'static,
        Fut::Output: Reply,
    {
        let route = Arc::new(Route {
            method: method.into(),
            pattern: Pattern::compile(normalize(path, self.is_strict()))?,
            handler: Arc::new(handler),
            middleware: Vec::new(),
            validators: Vec::new(),
            responses: ResponseSchemas::default(),
        });
        tracing::info!(method = %route.method, route = %route.pattern, "Route added");

        self.inner.table.rcu(|table| {
            let mut next = RouteTable::clone(table);
            next.push(route.clone());
            next
        });
        Ok(())
    }

    /// Current route table snapshot.
    pub fn table(&self) -> Arc<RouteTable> {
        self.inner.table.load_full()
    }

    /// Registered `(method, pattern)` pairs, in registration order.
    pub fn routes(&self) -> Vec<(MethodFilter, String)> {
        self.table()
            .routes()
            .map(|r| (r.method.clone(), r.pattern.as_str().to_string()))
            .collect()
    }

    /// Log every registered route.
    pub fn show_routes(&self) {
        for (method, pattern) in self.routes() {
            tracing::info!(method = %method, route = %pattern, "Route");
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    fn is_strict(&self) -> bool {
        self.inner.table.load().is_strict()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.inner.table.load().len())
            .field("middleware", &self.inner.middleware.len())
            .field("verify_responses", &self.inner.verify_responses)
            .finish()
    }
}

/// Validators, then the handler.
async fn invoke(
    route: Arc<Route>,
    verify: bool,
    mut ctx: Context,
) -> Result<Response, HandlerError> {
    for validator in &route.validators {
        match validator.validate(&ctx) {
            Ok(value) => ctx.set_valid(validator.target(), value),
            Err(response) => return Ok(response),
        }
    }
    tracing::debug!(phase = "validated", route = %route.pattern, "Input accepted");

    let response = route.handler.call(ctx).await?;
    tracing::debug!(
        phase = "handled",
        route = %route.pattern,
        status = response.status().as_u16(),
        "Handler returned"
    );

    if verify {
        if let Err(issues) = route.responses.verify(&response) {
            tracing::warn!(
                route = %route.pattern,
                status = response.status().as_u16(),
                issues = ?issues,
                "Response does not match declared schema"
            );
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, RouteOptions};
    use crate::config::AppConfig;
    use crate::http::Body;
    use crate::middleware::{from_fn, AppendHeader, BasicAuth};
    use crate::validation::{Field, Schema, Target, Validator};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(method: Method, uri: &str, body: &str) -> Context {
        let mut headers = HeaderMap::new();
        if !body.is_empty() {
            headers.insert("content-type", "application/json".parse().unwrap());
        }
        Context::new(
            method,
            uri.parse().unwrap(),
            headers,
            Bytes::from(body.to_string()),
        )
    }

    fn build(app: App) -> Dispatcher {
        app.build(&AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_path_uses_not_found_hook() {
        let dispatcher = build(
            App::new()
                .get("/", |_ctx: Context| async { "home" })
                .not_found(|_ctx: Context| async {
                    (StatusCode::NOT_FOUND, "Custom 404 Message")
                }),
        );

        let response = dispatcher.handle(request(Method::GET, "/nope", "")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.outcome(), "not_found");
        assert_eq!(response.body(), &Body::Text("Custom 404 Message".into()));
    }

    #[tokio::test]
    async fn test_method_mismatch_is_not_found() {
        let dispatcher = build(App::new().post("/posts", |_ctx: Context| async { "Created!" }));

        let response = dispatcher.handle(request(Method::GET, "/posts", "")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), &Body::Text("404 Not Found".into()));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = RouteOptions::new().validate(Validator::new(
            Target::Json,
            Schema::object([
                Field::required("username", Schema::String),
                Field::required("password", Schema::String),
            ]),
        ));
        let dispatcher = build(App::new().post_with("/mirror", options, move |ctx: Context| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.valid(Target::Json).cloned().unwrap_or_default()
            }
        }));

        let rejected = dispatcher
            .handle(request(Method::POST, "/mirror", r#"{"username":"a"}"#))
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rejected.outcome(), "invalid");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let accepted = dispatcher
            .handle(request(
                Method::POST,
                "/mirror",
                r#"{"username":"a","password":"b","extra":true}"#,
            ))
            .await;
        assert_eq!(accepted.status(), StatusCode::OK);
        assert_eq!(
            accepted.body().to_value(),
            serde_json::json!({"username": "a", "password": "b"})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_generic_500() {
        let dispatcher = build(App::new().get("/boom", |_ctx: Context| async {
            if true {
                panic!("database password is hunter2");
            }
            "unreachable"
        }));

        let response = dispatcher.handle(request(Method::GET, "/boom", "")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.outcome(), "handler_fault");
        assert_eq!(response.body(), &Body::Text("Internal Server Error".into()));
    }

    #[tokio::test]
    async fn test_custom_error_hook() {
        let dispatcher = build(
            App::new()
                .get("/fail", |_ctx: Context| async {
                    Err::<&str, _>(HandlerError::msg("upstream unavailable"))
                })
                .on_error(|_err| {
                    Response::text("Custom Error Message")
                        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                }),
        );

        let response = dispatcher.handle(request(Method::GET, "/fail", "")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), &Body::Text("Custom Error Message".into()));
    }

    #[tokio::test]
    async fn test_head_is_served_by_get_without_body() {
        let dispatcher = build(App::new().get("/", |_ctx: Context| async { "Hello" }));

        let response = dispatcher.handle(request(Method::HEAD, "/", "")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Body::Empty);
        assert_eq!(
            response.header("content-type"),
            Some("text/plain; charset=UTF-8")
        );
    }

    #[tokio::test]
    async fn test_app_middleware_wraps_route_middleware() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let record = |name: &'static str| {
            let log = log.clone();
            from_fn(move |ctx: Context, next: Next| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(name);
                    next.run(ctx).await
                }
            })
        };

        let dispatcher = build(
            App::new()
                .use_middleware(record("app"))
                .get_with(
                    "/",
                    RouteOptions::new().middleware(record("route")),
                    |_ctx: Context| async { "ok" },
                ),
        );
        dispatcher.handle(request(Method::GET, "/", "")).await;

        assert_eq!(*log.lock().unwrap(), vec!["app", "route"]);
    }

    #[tokio::test]
    async fn test_app_middleware_applies_to_not_found() {
        let dispatcher = build(
            App::new()
                .use_middleware(AppendHeader::new("X-Debug", "Debug message"))
                .get("/", |_ctx: Context| async { "home" }),
        );

        let response = dispatcher.handle(request(Method::GET, "/missing", "")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.header("x-debug"), Some("Debug message"));
    }

    #[tokio::test]
    async fn test_add_route_is_live() {
        let dispatcher = build(App::new());
        let before = dispatcher.handle(request(Method::GET, "/late", "")).await;
        assert_eq!(before.status(), StatusCode::NOT_FOUND);

        dispatcher
            .add_route(Method::GET, "/late", |_ctx: Context| async { "here now" })
            .unwrap();

        let after = dispatcher.handle(request(Method::GET, "/late", "")).await;
        assert_eq!(after.status(), StatusCode::OK);
        assert_eq!(dispatcher.routes().len(), 1);
    }

    #[tokio::test]
    async fn test_add_route_rejects_bad_pattern() {
        let dispatcher = build(App::new());
        let result = dispatcher.add_route(Method::GET, "/x/:id{[}", |_ctx: Context| async { "" });
        assert!(result.is_err());
        assert!(dispatcher.table().is_empty());
    }

    #[tokio::test]
    async fn test_store_is_shared_across_requests() {
        let dispatcher = build(App::new().state("hits", 0).get("/", |ctx: Context| async move {
            ctx.store().update("hits", |v| *v = serde_json::json!(v.as_i64().unwrap_or(0) + 1));
            ctx.store().get("hits").unwrap_or_default()
        }));

        dispatcher.handle(request(Method::GET, "/", "")).await;
        let response = dispatcher.handle(request(Method::GET, "/", "")).await;

        assert_eq!(response.body().to_value(), serde_json::json!(2));
        assert_eq!(dispatcher.store().get("hits"), Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_sub_app_scope_holds_with_trailing_slash() {
        let secret = App::new()
            .use_at("/secret", BasicAuth::new("admin", "admin"))
            .get("/secret", |_ctx: Context| async { "TOP SECRET" });
        let config = AppConfig {
            strict: false,
            ..AppConfig::default()
        };
        let dispatcher = App::new().mount("/x", secret).build(&config).unwrap();

        for uri in ["/x/secret", "/x/secret/"] {
            let response = dispatcher.handle(request(Method::GET, uri, "")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic YWRtaW46YWRtaW4=".parse().unwrap());
        let authorized = Context::new(
            Method::GET,
            "/x/secret/".parse().unwrap(),
            headers,
            Bytes::new(),
        );
        let response = dispatcher.handle(authorized).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Body::Text("TOP SECRET".into()));
    }

    #[tokio::test]
    async fn test_after_phase_error_replaces_response() {
        let failing_after = from_fn(|ctx: Context, next: Next| async move {
            let _partial = next.run(ctx).await;
            Err::<Response, _>(HandlerError::msg("audit log unavailable"))
        });
        let dispatcher = build(
            App::new()
                .use_middleware(failing_after)
                .get("/", |_ctx: Context| async { "partial" }),
        );

        let response = dispatcher.handle(request(Method::GET, "/", "")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.outcome(), "middleware_fault");
        assert_eq!(response.body(), &Body::Text("Internal Server Error".into()));
    }

    #[tokio::test]
    async fn test_response_verification_never_changes_response() {
        let config = AppConfig {
            verify_responses: true,
            ..AppConfig::default()
        };
        let dispatcher = App::new()
            .get_with(
                "/count",
                RouteOptions::new().response(Schema::Number),
                |_ctx: Context| async { "not a number" },
            )
            .build(&config)
            .unwrap();

        let response = dispatcher.handle(request(Method::GET, "/count", "")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.outcome(), "ok");
        assert_eq!(response.body(), &Body::Text("not a number".into()));
    }
}
