//! The JSON envelope every kelp response body is wrapped in.
//!
//! Clients read the outcome from the body's `status` field, not from the HTTP
//! status line:
//!
//! ```text
//! {"status": 0, "message": "success"}          ← default success
//! {"data": {...}, "status": 0}                 ← success with output
//! {"status": 3, "message": "bad name"}         ← invalid parameter
//! {"status": 404, "message": "not found"}      ← no route
//! ```
//!
//! Handlers return a [`Status`] (wrapped in `Option` or `Result`) to reply
//! with an error envelope of their own:
//!
//! ```rust
//! use kelp::Status;
//!
//! fn lookup(id: i64) -> Result<(), Status> {
//!     if id < 0 {
//!         return Err(Status::new(20, "no such user"));
//!     }
//!     Ok(())
//! }
//! # assert_eq!(lookup(-1).unwrap_err().to_string(), "20:\"no such user\"");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

// ── Status ────────────────────────────────────────────────────────────────────

/// A `{"status": …, "message": …}` envelope.
///
/// `message` is any JSON value; it is usually a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: i32,
    pub message: Value,
}

impl Status {
    pub fn new(status: i32, message: impl Into<Value>) -> Self {
        Self { status, message: message.into() }
    }

    /// `0`, with the given message. See [`Settings::success`](crate::Settings::success)
    /// for the configured default.
    pub fn success(message: impl Into<Value>) -> Self {
        Self::new(0, message)
    }

    pub fn unknown() -> Self {
        Self::new(1, "unknown error")
    }

    pub fn database() -> Self {
        Self::new(2, "database error")
    }

    /// `3`, the code used when a request body fails to bind or validate.
    pub fn invalid_param(err: impl fmt::Display) -> Self {
        Self::new(3, err.to_string())
    }

    pub fn unauthorized() -> Self {
        Self::new(401, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(403, "forbidden")
    }

    pub fn not_found() -> Self {
        Self::new(404, "not found")
    }

    /// An envelope whose message is `err`'s display text.
    pub fn error(status: i32, err: impl fmt::Display) -> Self {
        Self::new(status, err.to_string())
    }

    /// An envelope whose message is `obj` encoded as a JSON *string*.
    ///
    /// ```rust
    /// # use kelp::Status;
    /// let status = Status::json(10, &[1, 2]);
    /// assert_eq!(status.message, "[1,2]");
    /// ```
    ///
    /// A value that fails to serialize leaves the message empty.
    pub fn json<T: Serialize + ?Sized>(status: i32, obj: &T) -> Self {
        let message = match serde_json::to_string(obj) {
            Ok(message) => message,
            Err(e) => {
                error!(status, "failed to encode status message: {e}");
                String::new()
            }
        };
        Self::new(status, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.status, self.message)
    }
}

impl std::error::Error for Status {}

// ── Data ──────────────────────────────────────────────────────────────────────

/// The success-with-output envelope: `{"data": …, "status": 0}`.
#[derive(Serialize)]
pub(crate) struct Data<'a, T: ?Sized> {
    pub data: &'a T,
    pub status: i32,
}

impl<'a, T: ?Sized> Data<'a, T> {
    pub fn ok(data: &'a T) -> Self {
        Self { data, status: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_field_order() {
        let body = serde_json::to_string(&Status::not_found()).unwrap();
        assert_eq!(body, r#"{"status":404,"message":"not found"}"#);

        let body = serde_json::to_string(&Data::ok(&serde_json::json!({"result": "kelp"}))).unwrap();
        assert_eq!(body, r#"{"data":{"result":"kelp"},"status":0}"#);
    }

    #[test]
    fn display_joins_code_and_message() {
        assert_eq!(Status::unauthorized().to_string(), r#"401:"unauthorized""#);
        assert_eq!(Status::new(7, 12).to_string(), "7:12");
    }

    #[test]
    fn json_message_is_encoded_or_empty() {
        let status = Status::json(10, &serde_json::json!({"id": 1}));
        assert_eq!(status.message, r#"{"id":1}"#);

        let unencodable: std::collections::BTreeMap<(i32, i32), i32> = [((1, 2), 3)].into();
        let status = Status::json(11, &unencodable);
        assert_eq!(status, Status::new(11, ""));
    }

    #[test]
    fn invalid_param_uses_error_text() {
        let status = Status::invalid_param("field name required");
        assert_eq!(status.status, 3);
        assert_eq!(status.message, "field name required");
    }
}
