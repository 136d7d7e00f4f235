//! Built-in middleware.
//!
//! Middleware is an ordinary chain entry built with
//! [`HandlerRef::context`](crate::HandlerRef::context) that calls
//! [`Context::next`](crate::Context::next) to run the rest of the chain.
//! Everything here is constructed the same way and registered with
//! [`Router::middleware`](crate::Router::middleware):
//!
//! ```rust
//! use kelp::{Router, middleware};
//!
//! let app = Router::new()
//!     .middleware(middleware::recovery())
//!     .middleware(middleware::trace_id())
//!     .middleware(middleware::access_log());
//! ```
//!
//! Order matters: `recovery` first so a panic anywhere below it is caught,
//! `trace_id` before `access_log` so the log line carries the id.

mod auth;
mod log;
mod recovery;
mod trace;

pub use auth::token_auth;
pub use log::access_log;
pub use recovery::recovery;
pub use trace::{TRACE_HEADER, TRACE_KEY, trace_id};
