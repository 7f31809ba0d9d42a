//! Switchyard: an HTTP routing and middleware engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     App (registration log) ──build──▶ Dispatcher (immutable route table)
//!
//!     Client Request
//!         → http::server   (axum catch-all, tower layers, body buffering)
//!         → dispatch       (Received → Matched → Validated → Handled → Finalized)
//!             → middleware (onion chain: app, then route/group/guard)
//!             → routing    (pattern matching, first registered route wins)
//!             → validation (request schemas before the handler)
//!             → handler
//!         ← http::response (Response → wire format)
//! ```
//!
//! Cross-cutting: `config` (TOML), `observability` (tracing + Prometheus),
//! `lifecycle` (graceful shutdown), `error` (fault taxonomy).

pub mod app;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod routing;
pub mod validation;

pub use app::{App, MethodRouter, RouteOptions};
pub use config::ServerConfig;
pub use dispatch::Dispatcher;
pub use error::{DispatchError, HandlerError};
pub use http::{AppServer, Context, Json, Reply, Response};
pub use lifecycle::Shutdown;
pub use middleware::{from_fn, Middleware, Next};
pub use validation::{Field, Schema, Target, Validator};
