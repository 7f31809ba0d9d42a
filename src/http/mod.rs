//! HTTP surface of the engine.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum catch-all route, tower layers: trace, request id, timeout, body limit)
//!     → context.rs (buffer body, build Context from request parts)
//!     → [dispatcher: middleware chain, route, validators, handler]
//!     → response.rs (Response → axum response, content type, HEAD body strip)
//!     → Send to client
//! ```

pub mod context;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use context::{Context, Store};
pub use handler::Handler;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::{Body, Json, Reply, Response};
pub use server::AppServer;
