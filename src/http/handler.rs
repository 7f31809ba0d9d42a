//! Route handler abstraction.
//!
//! Any `async fn(Context) -> impl Reply` (or closure of that shape) is a handler.

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::error::HandlerError;
use crate::http::{Context, Reply, Response};

/// Terminal step of a request: produces the response.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Response, HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Reply,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Response, HandlerError>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_result() })
    }
}
