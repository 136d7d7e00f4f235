//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;

/// An incoming HTTP request with its body fully read.
///
/// The server builds one from hyper's request; tests and embedders can build
/// one by hand and hand it to [`Router::dispatch`](crate::Router::dispatch):
///
/// ```rust
/// use kelp::{Method, Request};
///
/// let req = Request::new(Method::POST, "/users?page=2")
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"name":"kelp"}"#);
///
/// assert_eq!(req.path(), "/users");
/// assert_eq!(req.query(), Some("page=2"));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    peer: Option<SocketAddr>,
}

impl Request {
    /// `target` is the request target: a path with an optional `?query`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        Self { method, path: path.to_owned(), query, headers: HeaderMap::new(), body: Bytes::new(), peer: None }
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, peer: SocketAddr) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            peer: Some(peer),
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// The address of the connection the request arrived on. `None` for
    /// requests built by hand.
    pub fn peer(&self) -> Option<SocketAddr> { self.peer }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
