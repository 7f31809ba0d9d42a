//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (scan routes in registration order)
//!     → pattern.rs (match segments, extract params)
//!     → Return: RouteMatch { route, params } or NotFound
//!
//! Route compilation (at build time):
//!     App registration log
//!     → Join group prefixes, inherit group options
//!     → Compile patterns (errors surface as ConfigError)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup; a table is never mutated in place, late
//!   registrations swap in a new snapshot
//! - Deterministic: same input always matches same route
//! - First match wins (registration order, no priority sorting)

pub mod pattern;
pub mod router;

pub use pattern::{Params, Pattern, PatternError, Segment};
pub use router::{MethodFilter, Resolution, Route, RouteMatch, RouteTable};
