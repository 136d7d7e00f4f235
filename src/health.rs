//! Built-in health-check and process-metric handlers.
//!
//! | Handler | Answers |
//! |---|---|
//! | [`liveness`] | `ok` as plain text, if the process can serve HTTP at all |
//! | [`metrics`] | host, executable directory, arguments, uptime and version |
//!
//! ```rust
//! use std::time::Instant;
//! use kelp::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness())
//!     .get("/_kelp/metric", health::metrics(Instant::now()));
//! ```

use std::time::Instant;

use serde::Serialize;

use crate::context::Context;
use crate::handler::HandlerRef;

/// Always answers `200 OK` with body `ok`.
pub fn liveness() -> HandlerRef {
    HandlerRef::context(|ctx: &mut Context| ctx.text("ok"))
}

/// Process information, sent as `{"data": <Metrics>, "status": 0}`.
#[derive(Debug, Default, Serialize)]
pub struct Metrics {
    pub hostname: String,
    pub pwd: String,
    pub args: Vec<String>,
    pub running_seconds: f64,
    pub kelp_version: &'static str,
}

/// Reports process metrics; `started` is when the process started serving.
pub fn metrics(started: Instant) -> HandlerRef {
    HandlerRef::output(move |out: &mut Metrics| {
        out.hostname = std::env::var("HOSTNAME").unwrap_or_default();
        out.pwd = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.display().to_string()))
            .unwrap_or_default();
        out.args = std::env::args().collect();
        out.running_seconds = started.elapsed().as_secs_f64();
        out.kelp_version = env!("CARGO_PKG_VERSION");
    })
}
