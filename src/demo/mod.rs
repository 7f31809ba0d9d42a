//! Bundled demo applications, served by the `switchyard` binary.
//!
//! - `hono`: text/JSON replies, scoped auth, mounted sub-apps, form validation
//! - `elysia`: groups, state and decorators, JSON body and response schemas

pub mod elysia;
pub mod hono;
