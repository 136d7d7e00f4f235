//! Per-request state threaded through a handler chain.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, LOCATION};
use http::{Method, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::ValidationError;
use crate::handler::HandlerRef;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::settings::Settings;
use crate::validate::{self, Input};

/// The request context.
///
/// A `Context` is created for every request that resolves to a route. It owns
/// the request, the path parameters, request-scoped metadata and the response
/// being built, and it knows its position in the route's handler chain.
///
/// Middleware is an ordinary chain entry that calls [`next`](Context::next):
///
/// ```rust
/// use kelp::{Context, HandlerRef, Router};
///
/// fn timing(ctx: &mut Context) {
///     let started = std::time::Instant::now();
///     ctx.next();
///     ctx.set("elapsed", started.elapsed());
/// }
///
/// let app = Router::new().middleware(HandlerRef::context(timing));
/// ```
pub struct Context {
    request: Request,
    params: Vec<(String, String)>,
    meta: HashMap<String, Box<dyn Any + Send + Sync>>,
    chain: Arc<[HandlerRef]>,
    index: usize,
    settings: Arc<Settings>,
    response: Response,
    written: bool,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        params: Vec<(String, String)>,
        chain: Arc<[HandlerRef]>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            request,
            params,
            meta: HashMap::new(),
            chain,
            index: 0,
            settings,
            response: Response::default(),
            written: false,
        }
    }

    // ── Chain ─────────────────────────────────────────────────────────────────

    /// Runs the first handler of the chain.
    pub(crate) fn start(&mut self) {
        self.index = 0;
        self.run_current();
    }

    /// Runs the next handler of the chain, returning once it (and everything
    /// it calls in turn) has finished. Past the end of the chain this is a
    /// no-op.
    pub fn next(&mut self) {
        self.index += 1;
        self.run_current();
    }

    fn run_current(&mut self) {
        if let Some(handler) = self.chain.get(self.index).cloned() {
            handler.call(self);
        }
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> &Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn body(&self) -> &Bytes { self.request.body() }
    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// A path parameter bound by a `:name` segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// All path parameters, in the order their segments appear in the path.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The first value of query parameter `key`, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
    }

    pub fn query_or(&self, key: &str, default: &str) -> String {
        self.query(key).unwrap_or_else(|| default.to_owned())
    }

    /// Every value of query parameter `key`, in order.
    pub fn query_all(&self, key: &str) -> Vec<String> {
        self.query_pairs().filter(|(k, _)| k == key).map(|(_, v)| v.into_owned()).collect()
    }

    fn query_pairs(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        let query = self.request.query().unwrap_or_default();
        url::form_urlencoded::parse(query.as_bytes())
    }

    /// Decodes the body into `T` and enforces `T`'s validation rules.
    pub fn bind<T: Input>(&self) -> Result<T, ValidationError> {
        validate::bind_json(self.request.body())
    }

    // ── Metadata ──────────────────────────────────────────────────────────────

    /// Stores a request-scoped value, replacing any value under `key`.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.meta.insert(key.into(), Box::new(value));
    }

    /// The value stored under `key`, if it exists and is a `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.meta.get(key).and_then(|value| value.downcast_ref())
    }

    // ── Response ──────────────────────────────────────────────────────────────

    /// Whether a handler has written the response. Once set, the handler
    /// binder leaves the response alone.
    pub fn has_response(&self) -> bool {
        self.written
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// `200 OK` with a plain-text body.
    pub fn text(&mut self, body: impl Into<String>) {
        self.write(StatusCode::OK, Some(ContentType::Text), Bytes::from(body.into()));
    }

    /// `200 OK` with `value` serialized as the JSON body. A value that fails
    /// to serialize aborts the request with `500`.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.write(StatusCode::OK, Some(ContentType::Json), Bytes::from(body)),
            Err(err) => {
                error!(path = %self.request.path(), "response serialization failed: {err}");
                self.abort(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Redirects to `location`. Codes outside `300..=308` are replaced by
    /// `302 Found`.
    pub fn redirect(&mut self, code: StatusCode, location: &str) {
        let code = if (300..=308).contains(&code.as_u16()) { code } else { StatusCode::FOUND };
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.response.headers.insert(LOCATION, value);
                self.write(code, None, Bytes::new());
            }
            Err(_) => {
                error!(location, "invalid redirect location");
                self.abort(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Ends the request with a bodyless response carrying `code`.
    pub fn abort(&mut self, code: StatusCode) {
        self.write(code, None, Bytes::new());
    }

    /// Sets a response header. Invalid names or values are ignored.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.response.headers.insert(name, value);
        }
    }

    fn write(&mut self, status: StatusCode, content_type: Option<ContentType>, body: Bytes) {
        self.response.replace(status, content_type, body);
        self.written = true;
    }
}
