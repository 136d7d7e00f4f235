use std::borrow::Cow;
use std::time::Instant;

use tracing::info;

use super::trace::TRACE_KEY;
use crate::context::Context;
use crate::handler::HandlerRef;

/// Bodies longer than this are logged as a summary.
const MAX_LOGGED_BODY: usize = 500;
const SUMMARY_HEAD: usize = 100;

/// Emits one `info` event per request, after the rest of the chain has run:
/// client address, method, path and query, status, latency, trace id, and
/// the request and response bodies.
pub fn access_log() -> HandlerRef {
    HandlerRef::context(log)
}

fn log(ctx: &mut Context) {
    let started = Instant::now();
    ctx.next();
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let response = ctx.response();
    info!(
        client = %client_addr(ctx),
        method = %ctx.method(),
        path = ctx.path(),
        query = ctx.request().query().unwrap_or("-"),
        status = response.status_code().as_u16(),
        latency_ms,
        trace_id = ctx.get::<String>(TRACE_KEY).map_or("-", String::as_str),
        request = %summarize(ctx.body()),
        response = %summarize(response.body()),
        "request"
    );
}

/// The first `x-forwarded-for` hop, then `x-real-ip`, then the peer address.
fn client_addr(ctx: &Context) -> Cow<'_, str> {
    let forwarded = ctx
        .header("x-forwarded-for")
        .and_then(|ips| ips.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded.or_else(|| ctx.header("x-real-ip")) {
        return Cow::Borrowed(ip);
    }
    match ctx.request().peer() {
        Some(addr) => Cow::Owned(addr.to_string()),
        None => Cow::Borrowed("-"),
    }
}

fn summarize(body: &[u8]) -> Cow<'_, str> {
    if body.len() > MAX_LOGGED_BODY {
        let head = String::from_utf8_lossy(&body[..SUMMARY_HEAD]);
        return Cow::Owned(format!("body is too large (with {} bytes, head is {head}...)", body.len()));
    }
    String::from_utf8_lossy(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_bodies_are_summarized() {
        assert_eq!(summarize(b"{}"), "{}");
        let body = vec![b'a'; 501];
        let summary = summarize(&body);
        assert!(summary.starts_with("body is too large (with 501 bytes, head is aaaa"));
        assert!(summary.ends_with(&format!("{}...)", "a".repeat(4))));
        assert_eq!(summarize(&vec![b'b'; 500]).len(), 500);
    }
}
