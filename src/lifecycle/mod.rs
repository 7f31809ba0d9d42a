//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Build app → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to servers → stop accepting → drain in-flight → exit
//!
//! Signals (signals.rs):
//!     SIGINT or broadcast → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when the route table is built)
//! - Ordered shutdown: stop accept, drain, close

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
