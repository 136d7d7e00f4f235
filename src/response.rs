//! Outgoing HTTP response type.
//!
//! Handlers rarely build one themselves: the handler binder and the
//! [`Context`](crate::Context) writers fill it in. It is what
//! [`Router::dispatch`](crate::Router::dispatch) returns.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values kelp writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Json,  // application/json
    Text,  // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with `body` and the given content type.
    pub fn bytes(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Self { status: StatusCode::OK, headers, body: body.into() }
    }

    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::bytes(ContentType::Json, body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes(ContentType::Text, body.into())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `content-type` header, if one was set.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Headers already set (`x-trace-id`, say) survive; a content type
    /// already present is replaced.
    pub(crate) fn replace(&mut self, status: StatusCode, content_type: Option<ContentType>, body: Bytes) {
        self.status = status;
        match content_type {
            Some(ct) => {
                self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
            }
            None => {
                self.headers.remove(CONTENT_TYPE);
            }
        }
        self.body = body;
    }

    /// Converts into the type hyper writes to the wire.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::status(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_extra_headers() {
        let mut res = Response::default();
        res.headers.insert("x-trace-id", HeaderValue::from_static("abc"));
        res.replace(StatusCode::OK, Some(ContentType::Json), Bytes::from_static(b"{}"));
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(res.header("x-trace-id"), Some("abc"));

        res.replace(StatusCode::INTERNAL_SERVER_ERROR, None, Bytes::new());
        assert_eq!(res.content_type(), None);
        assert_eq!(res.header("x-trace-id"), Some("abc"));
    }

    #[test]
    fn into_inner_carries_status_and_headers() {
        let res = Response::text("ok").into_inner();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}
