//! Error types.
//!
//! Application-level failures (404, bad request bodies, handler-declared
//! errors) are expressed as envelope responses, not as `Error`s. The types in
//! this module surface infrastructure failures and programmer errors made
//! while wiring routes and validation tags.

use thiserror::Error;

/// The error type returned by kelp's fallible infrastructure operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Validation functions can only be registered before the server starts.
    #[error("validation function `{0}` registered after the server started")]
    RegistryFrozen(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A route could not be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid path `{0}`: must start with `/` and must not contain `//`")]
    InvalidPath(String),

    #[error("invalid path `{path}`: reserved character `{ch}`")]
    ReservedChar { path: String, ch: char },

    #[error("invalid path `{0}`: parameter segment without a name")]
    EmptyParam(String),

    #[error("route {method} `{path}` is already registered")]
    Duplicate { method: String, path: String },

    #[error("route {method} `{path}` has no handler")]
    NoHandler { method: String, path: String },
}

/// A `valid` tag could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("tag `{tag}`: unrecognized clause `{clause}`")]
    UnknownClause { tag: String, clause: String },

    #[error("tag `{tag}`: malformed range `{clause}`")]
    BadRange { tag: String, clause: String },

    #[error("tag `{tag}`: unterminated regex clause")]
    UnterminatedRegex { tag: String },

    #[error("tag `{tag}`: {source}")]
    BadRegex {
        tag: String,
        #[source]
        source: regex::Error,
    },

    #[error("tag `{tag}`: `optional` given more than once")]
    DuplicateOptional { tag: String },
}

/// A request body failed to bind or validate.
///
/// The `Display` output is the exact message sent to the client in the
/// `message` field of the error envelope.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A rule failed on a field whose tag configures `message=`.
    #[error("{0}")]
    Message(String),

    #[error("field {0} required")]
    Missing(String),

    #[error("field {0} failed validation")]
    Rejected(String),

    /// The body is not JSON, not an object, or does not fit the input type.
    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Rule(#[from] RuleError),
}
