//! Middleware chain (onion model).
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → app middleware: global, or scoped with a matching pattern (registration order)
//!     → [route resolution]
//!     → route/group/guard middleware, outermost first
//!     → validators + handler
//!     ← each after-phase runs in reverse order on the way out
//! ```
//!
//! # Design Decisions
//! - `Next` is consumed by `run`, so downstream runs at most once per middleware
//! - Returning without calling `next.run` short-circuits the rest of the chain
//! - Faults (error or panic) are converted to the error response where they
//!   happen; outer middleware see that response in their after-phase

pub mod auth;
pub mod headers;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::error::{DispatchError, ErrorHandler, HandlerError};
use crate::http::{Context, Handler, Reply, Response};
use crate::routing::router::normalize;
use crate::routing::Pattern;

pub use auth::{BasicAuth, BearerAuth};
pub use headers::AppendHeader;

/// A unit of the request pipeline wrapping everything downstream of it.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Process a request. Call `next.run(ctx)` to continue the chain.
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError>;
}

/// The remainder of the chain, as seen from one middleware.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    position: usize,
    endpoint: Arc<dyn Handler>,
    on_error: ErrorHandler,
}

impl Next {
    /// Chain `middleware` (outermost first) in front of `endpoint`.
    pub(crate) fn new(
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Handler>,
        on_error: ErrorHandler,
    ) -> Self {
        Self {
            chain: middleware.into(),
            position: 0,
            endpoint,
            on_error,
        }
    }

    /// Run the remaining middleware and the endpoint.
    ///
    /// Always yields a response: downstream faults arrive here already converted
    /// by the error handler.
    pub async fn run(self, ctx: Context) -> Response {
        match self.chain.get(self.position).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain: self.chain.clone(),
                    position: self.position + 1,
                    endpoint: self.endpoint.clone(),
                    on_error: self.on_error.clone(),
                };
                let started =
                    std::panic::catch_unwind(AssertUnwindSafe(|| middleware.handle(ctx, next)));
                contain(started, &self.on_error, DispatchError::MiddlewareFault).await
            }
            None => {
                let started =
                    std::panic::catch_unwind(AssertUnwindSafe(|| self.endpoint.call(ctx)));
                contain(started, &self.on_error, DispatchError::HandlerFault).await
            }
        }
    }

    /// Number of middleware still ahead, not counting the endpoint.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.position)
    }
}

/// Await a started step, converting an error or panic into the error response.
pub(crate) async fn contain<F>(
    started: std::thread::Result<F>,
    on_error: &ErrorHandler,
    fault: fn(HandlerError) -> DispatchError,
) -> Response
where
    F: Future<Output = Result<Response, HandlerError>>,
{
    let result = match started {
        Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::from_panic(payload)),
        },
        Err(payload) => Err(HandlerError::from_panic(payload)),
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            let err = fault(err);
            tracing::error!(error = %err, kind = err.kind(), "Request failed");
            let mut response = on_error(&err);
            response.set_outcome(err.kind());
            response
        }
    }
}

/// Middleware built from an async closure.
pub struct FromFn<F> {
    f: F,
}

/// Adapt `|ctx, next| async move { ... }` into a middleware.
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Reply,
{
    FromFn { f }
}

#[async_trait]
impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Reply,
{
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError> {
        (self.f)(ctx, next).await.into_result()
    }
}

/// A middleware restricted to request paths matching a pattern.
#[derive(Clone)]
pub struct ScopedMiddleware {
    scope: Option<Pattern>,
    middleware: Arc<dyn Middleware>,
    strict: bool,
}

impl ScopedMiddleware {
    /// Applies to every request.
    pub fn global(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            scope: None,
            middleware,
            strict: true,
        }
    }

    /// Applies only where `scope` matches the request path. With `strict`
    /// off, one trailing slash on the path is ignored, as in route matching.
    pub fn scoped(scope: Pattern, middleware: Arc<dyn Middleware>, strict: bool) -> Self {
        Self {
            scope: Some(scope),
            middleware,
            strict,
        }
    }

    pub(crate) fn scope(&self) -> Option<&Pattern> {
        self.scope.as_ref()
    }

    pub fn applies_to(&self, path: &str) -> bool {
        let path = normalize(path, self.strict);
        self.scope
            .as_ref()
            .map_or(true, |scope| scope.matches(path).is_some())
    }

    pub(crate) fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }
}

#[async_trait]
impl Middleware for ScopedMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError> {
        if self.applies_to(ctx.path()) {
            self.middleware.handle(ctx, next).await
        } else {
            Ok(next.run(ctx).await)
        }
    }
}
