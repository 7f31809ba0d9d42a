//! Response header middleware.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::http::{Context, Response};
use crate::middleware::{Middleware, Next};

/// Appends a header to every response after the rest of the chain completes.
#[derive(Debug, Clone)]
pub struct AppendHeader {
    name: String,
    value: String,
}

impl AppendHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Middleware for AppendHeader {
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError> {
        let mut response = next.run(ctx).await;
        response.append_header(&self.name, &self.value);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchError, ErrorHandler};
    use crate::http::Handler;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_header_appended_once() {
        let ctx = Context::new(
            Method::GET,
            "/".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        );
        let endpoint: Arc<dyn Handler> = Arc::new(|_ctx: Context| async {
            Response::text("Hello!").with_header("X-Debug", "handler")
        });
        let on_error: ErrorHandler = Arc::new(|err: &DispatchError| Response::new(err.status()));

        let chain: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(AppendHeader::new("X-Debug", "Debug message"))];
        let response = Next::new(chain, endpoint, on_error).run(ctx).await;

        let values: Vec<&str> = response
            .headers()
            .get_all("x-debug")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["handler", "Debug message"]);
    }
}
