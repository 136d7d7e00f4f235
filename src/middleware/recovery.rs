use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::handler::HandlerRef;

/// Catches a panic anywhere later in the chain and answers `500` with an
/// empty body. The panic is logged at `error`.
pub fn recovery() -> HandlerRef {
    HandlerRef::context(recover)
}

fn recover(ctx: &mut Context) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.next())) {
        error!(method = %ctx.method(), path = ctx.path(), panic = panic_message(&*payload), "handler panicked");
        ctx.abort(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
