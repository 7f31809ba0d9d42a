//! Request and response validation.
//!
//! # Data Flow
//! ```text
//! Matched route
//!     → validator.rs (extract target input, check schema or custom rule)
//!         ✗ failure response (400 by default), handler skipped
//!         ✓ accepted value stored on the Context under its target
//!     → handler
//!     → response.rs (optional conformance check of the body, logged only)
//! ```

pub mod response;
pub mod schema;
pub mod validator;

pub use response::ResponseSchemas;
pub use schema::{Field, Issue, Schema};
pub use validator::{Target, ValidateFn, Validator};
