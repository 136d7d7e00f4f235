use uuid::Uuid;

use crate::context::Context;
use crate::handler::HandlerRef;

/// Request and response header carrying the trace id.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Metadata key the trace id is stored under, as a `String`.
pub const TRACE_KEY: &str = "trace_id";

/// Tags the request with a trace id.
///
/// An id sent by the client in `x-trace-id` is kept; otherwise a random UUID
/// is generated. Either way it is stored in the context under [`TRACE_KEY`]
/// and echoed in the `x-trace-id` response header.
pub fn trace_id() -> HandlerRef {
    HandlerRef::context(assign)
}

fn assign(ctx: &mut Context) {
    let id = match ctx.header(TRACE_HEADER) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => Uuid::new_v4().simple().to_string(),
    };
    ctx.set_header(TRACE_HEADER, &id);
    ctx.set(TRACE_KEY, id);
    ctx.next();
}
