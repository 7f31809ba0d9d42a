//! Error taxonomy for the request pipeline.
//!
//! # Responsibilities
//! - Carry arbitrary failures out of handlers and middleware (`HandlerError`)
//! - Classify pipeline failures for logging, metrics and the error hook
//!   (`DispatchError`)
//!
//! # Design Decisions
//! - `HandlerError` converts from any `std::error::Error`, so handlers can use `?`
//! - `HandlerError` must not implement `std::error::Error`: the blanket
//!   `From` impl would overlap with `From<T> for T`
//! - Fault details are logged, never written to the client body

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::http::Response;
use crate::validation::Target;

/// A failure raised by a handler or middleware.
pub struct HandlerError {
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl HandlerError {
    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Box::new(Message(message.into())),
        }
    }

    /// Convert a panic payload caught at the dispatcher boundary.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::msg(format!("panicked: {}", detail))
    }

    /// Borrow the underlying error.
    pub fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self {
            inner: Box::new(err),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

/// Failures the dispatcher recovers from.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route matched the method and path.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    /// A validator rejected the request.
    #[error("{target} validation failed with {issues} issue(s)")]
    ValidationFailure { target: Target, issues: usize },

    /// A handler returned an error or panicked.
    #[error("handler failed: {0}")]
    HandlerFault(HandlerError),

    /// A middleware returned an error or panicked.
    #[error("middleware failed: {0}")]
    MiddlewareFault(HandlerError),
}

impl DispatchError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::RouteNotFound { .. } => "not_found",
            DispatchError::ValidationFailure { .. } => "invalid",
            DispatchError::HandlerFault(_) => "handler_fault",
            DispatchError::MiddlewareFault(_) => "middleware_fault",
        }
    }

    /// Default status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::ValidationFailure { .. } => StatusCode::BAD_REQUEST,
            DispatchError::HandlerFault(_) | DispatchError::MiddlewareFault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Hook converting a fault into the response sent to the client.
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) -> Response + Send + Sync>;
