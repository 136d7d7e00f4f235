use http::StatusCode;
use http::header::AUTHORIZATION;
use tracing::warn;

use crate::context::Context;
use crate::handler::HandlerRef;

/// Lets a request through only if its `authorization` header is `token`,
/// optionally prefixed with `Bearer `. Anything else is answered with a
/// bodyless `401`.
pub fn token_auth(token: impl Into<String>) -> HandlerRef {
    let token = token.into();
    HandlerRef::context(move |ctx: &mut Context| {
        let presented = ctx.header(AUTHORIZATION.as_str()).map(|v| v.strip_prefix("Bearer ").unwrap_or(v));
        if presented == Some(token.as_str()) {
            ctx.next();
        } else {
            warn!(method = %ctx.method(), path = ctx.path(), "unauthorized request");
            ctx.abort(StatusCode::UNAUTHORIZED);
        }
    })
}
