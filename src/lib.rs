//! # kelp
//!
//! A small HTTP framework built around a request-dispatch pipeline:
//!
//! - **Routing**: a segment tree with `:param` segments and route groups whose
//!   middleware chains are inherited by everything registered below them.
//! - **Handler shapes**: business handlers are plain functions taking a bound
//!   input, an output to fill, the request [`Context`], or a mix of those. The
//!   shape is fixed at registration by the [`HandlerRef`] constructor used.
//! - **Validation**: input types declare a `valid` tag per field
//!   (`optional,[1,10),/^\w+$/,@custom,message=...`), enforced against the raw
//!   JSON body before the handler runs.
//! - **Envelopes**: responses are wrapped as `{"data": …, "status": 0}` or
//!   `{"status": …, "message": …}`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kelp::validate::{Field, Schema};
//! use kelp::{HandlerRef, Router, Server, middleware};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct EchoIn {
//!     name: String,
//! }
//!
//! impl Schema for EchoIn {
//!     fn fields() -> &'static [Field] {
//!         const FIELDS: &[Field] = &[Field::string("name").valid("[1,64],message=bad name")];
//!         FIELDS
//!     }
//! }
//!
//! #[derive(Default, Serialize)]
//! struct EchoOut {
//!     result: String,
//! }
//!
//! fn echo(input: EchoIn, out: &mut EchoOut) {
//!     out.result = input.name;
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kelp::Error> {
//!     let app = Router::new()
//!         .middleware(middleware::recovery())
//!         .middleware(middleware::access_log())
//!         .post("/echo", HandlerRef::input_output(echo))
//!         .get("/ping", HandlerRef::unit(|| {}));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```
//!
//! `POST /echo` with `{"name":"kelp"}` answers `{"data":{"result":"kelp"},"status":0}`;
//! with `{"name":""}` it answers `{"status":3,"message":"bad name"}`.

mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod settings;
mod status;

pub mod health;
pub mod middleware;
pub mod validate;

pub use context::Context;
pub use error::{Error, Result, RouteError, RuleError, ValidationError};
pub use handler::{HandlerRef, Outcome, Shape};
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::{ContentType, Response};
pub use router::{Route, Router};
pub use server::Server;
pub use settings::Settings;
pub use status::Status;
