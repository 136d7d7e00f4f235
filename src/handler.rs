//! Handler shapes and type erasure.
//!
//! # How handlers are stored
//!
//! A route's chain mixes middleware and business handlers of many different
//! signatures. The router holds them in one slice, so every handler is wrapped
//! into the same erased form, a closure over the request [`Context`]:
//!
//! ```text
//! fn echo(input: In, out: &mut Out) { … }            ← user writes this
//!        ↓ HandlerRef::input_output(echo)
//! move |ctx| { bind; call; write envelope }         ← chosen per shape, once
//!        ↓  stored as Arc<dyn Fn(&mut Context)>
//! handler.call(ctx)  at request time                ← one vtable dispatch
//! ```
//!
//! Which wrapper is used is decided by the constructor the integrator calls,
//! so the per-request path never inspects a signature.
//!
//! # After the call
//!
//! 1. If the handler wrote the response itself ([`Context::text`],
//!    [`Context::redirect`], …), nothing else happens.
//! 2. A failure return (`Some(e)` / `Err(e)`) is serialized as the whole body.
//! 3. A declared output is sent as `{"data": <out>, "status": 0}`.
//! 4. Otherwise the success envelope is sent.
//!
//! The binder does not catch panics; install
//! [`middleware::recovery`](crate::middleware::recovery) for that.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::context::Context;
use crate::status::Data;
use crate::validate::{self, Input, Schema};

// ── Internal types ────────────────────────────────────────────────────────────

/// A type-erased handler shared across concurrent requests.
pub(crate) type BoxedHandler = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;

/// The signature a handler was registered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// `fn() -> R`
    Unit,
    /// `fn(&mut Context) -> R`, also the middleware shape.
    Context,
    /// `fn(In) -> R`
    Input,
    /// `fn(In, &mut Out) -> R`
    InputOutput,
    /// `fn(In, &mut Out, &mut Context) -> R`
    InputOutputContext,
    /// `fn(&mut Out) -> R`
    Output,
    /// `fn(&mut Out, &mut Context) -> R`
    OutputContext,
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// A handler's return type: `()`, `Option<E>` or `Result<(), E>`, where `E`
/// is any serializable failure value, typically a [`Status`](crate::Status).
///
/// The trait is sealed; only those three forms implement it.
pub trait Outcome: private::Sealed + 'static {
    #[doc(hidden)]
    const FALLIBLE: bool;

    /// Writes the failure value, if any, and reports whether it did.
    #[doc(hidden)]
    fn write_failure(self, ctx: &mut Context) -> bool;
}

mod private {
    pub trait Sealed {}

    impl Sealed for () {}
    impl<E> Sealed for Option<E> {}
    impl<E> Sealed for Result<(), E> {}
}

impl Outcome for () {
    const FALLIBLE: bool = false;

    fn write_failure(self, _ctx: &mut Context) -> bool {
        false
    }
}

impl<E: Serialize + 'static> Outcome for Option<E> {
    const FALLIBLE: bool = true;

    fn write_failure(self, ctx: &mut Context) -> bool {
        match self {
            Some(err) => {
                ctx.json(&err);
                true
            }
            None => false,
        }
    }
}

impl<E: Serialize + 'static> Outcome for Result<(), E> {
    const FALLIBLE: bool = true;

    fn write_failure(self, ctx: &mut Context) -> bool {
        self.err().write_failure(ctx)
    }
}

// ── HandlerRef ────────────────────────────────────────────────────────────────

/// A registered handler: the erased callable plus the shape it was built from.
///
/// ```rust
/// use kelp::validate::{Field, Schema};
/// use kelp::{HandlerRef, Router, Status};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize)]
/// struct In { name: String }
///
/// impl Schema for In {
///     fn fields() -> &'static [Field] {
///         const FIELDS: &[Field] = &[Field::string("name").valid("[1,32]")];
///         FIELDS
///     }
/// }
///
/// #[derive(Default, Serialize)]
/// struct Out { result: String }
///
/// fn echo(input: In, out: &mut Out) -> Option<Status> {
///     if input.name == "root" {
///         return Some(Status::forbidden());
///     }
///     out.result = input.name;
///     None
/// }
///
/// let app = Router::new()
///     .post("/echo", HandlerRef::input_output(echo))
///     .get("/ping", HandlerRef::unit(|| {}));
/// ```
#[derive(Clone)]
pub struct HandlerRef {
    shape: Shape,
    fallible: bool,
    func: BoxedHandler,
}

impl HandlerRef {
    fn new<F>(shape: Shape, fallible: bool, func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self { shape, fallible, func: Arc::new(func) }
    }

    pub fn unit<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Outcome,
    {
        Self::new(Shape::Unit, R::FALLIBLE, move |ctx| {
            let outcome = f();
            finish(ctx, outcome);
        })
    }

    /// Middleware and handlers that work on the raw [`Context`].
    pub fn context<F, R>(f: F) -> Self
    where
        F: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Outcome,
    {
        Self::new(Shape::Context, R::FALLIBLE, move |ctx| {
            let outcome = f(ctx);
            finish(ctx, outcome);
        })
    }

    /// # Panics
    ///
    /// Panics if a `valid` tag in `I`'s schema does not compile.
    pub fn input<F, I, R>(f: F) -> Self
    where
        F: Fn(I) -> R + Send + Sync + 'static,
        I: Input + 'static,
        R: Outcome,
    {
        compile_schema::<I>();
        Self::new(Shape::Input, R::FALLIBLE, move |ctx| {
            let Some(input) = bind::<I>(ctx) else { return };
            let outcome = f(input);
            finish(ctx, outcome);
        })
    }

    /// # Panics
    ///
    /// Panics if a `valid` tag in `I`'s schema does not compile.
    pub fn input_output<F, I, O, R>(f: F) -> Self
    where
        F: Fn(I, &mut O) -> R + Send + Sync + 'static,
        I: Input + 'static,
        O: Default + Serialize + 'static,
        R: Outcome,
    {
        compile_schema::<I>();
        Self::new(Shape::InputOutput, R::FALLIBLE, move |ctx| {
            let Some(input) = bind::<I>(ctx) else { return };
            let mut out = O::default();
            let outcome = f(input, &mut out);
            finish_with(ctx, outcome, &out);
        })
    }

    /// # Panics
    ///
    /// Panics if a `valid` tag in `I`'s schema does not compile.
    pub fn input_output_context<F, I, O, R>(f: F) -> Self
    where
        F: Fn(I, &mut O, &mut Context) -> R + Send + Sync + 'static,
        I: Input + 'static,
        O: Default + Serialize + 'static,
        R: Outcome,
    {
        compile_schema::<I>();
        Self::new(Shape::InputOutputContext, R::FALLIBLE, move |ctx| {
            let Some(input) = bind::<I>(ctx) else { return };
            let mut out = O::default();
            let outcome = f(input, &mut out, ctx);
            finish_with(ctx, outcome, &out);
        })
    }

    /// Like [`input_output`](Self::input_output) without an input: the
    /// request body is not read.
    pub fn output<F, O, R>(f: F) -> Self
    where
        F: Fn(&mut O) -> R + Send + Sync + 'static,
        O: Default + Serialize + 'static,
        R: Outcome,
    {
        Self::new(Shape::Output, R::FALLIBLE, move |ctx| {
            let mut out = O::default();
            let outcome = f(&mut out);
            finish_with(ctx, outcome, &out);
        })
    }

    pub fn output_context<F, O, R>(f: F) -> Self
    where
        F: Fn(&mut O, &mut Context) -> R + Send + Sync + 'static,
        O: Default + Serialize + 'static,
        R: Outcome,
    {
        Self::new(Shape::OutputContext, R::FALLIBLE, move |ctx| {
            let mut out = O::default();
            let outcome = f(&mut out, ctx);
            finish_with(ctx, outcome, &out);
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Whether the handler declared a failure return.
    pub fn is_fallible(&self) -> bool {
        self.fallible
    }

    pub(crate) fn call(&self, ctx: &mut Context) {
        (self.func)(ctx)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef")
            .field("shape", &self.shape)
            .field("fallible", &self.fallible)
            .finish_non_exhaustive()
    }
}

// ── Binding and writing ───────────────────────────────────────────────────────

fn compile_schema<I: Schema>() {
    if let Err(err) = validate::compile_schema(I::fields()) {
        panic!("invalid validation tag on `{}`: {err}", std::any::type_name::<I>());
    }
}

/// Binds the body into `I`, writing the invalid-parameter envelope on failure.
fn bind<I: Input>(ctx: &mut Context) -> Option<I> {
    match ctx.bind::<I>() {
        Ok(input) => Some(input),
        Err(err) => {
            debug!(path = %ctx.path(), "request body rejected: {err}");
            let status = ctx.settings().invalid_param(&err);
            ctx.json(&status);
            None
        }
    }
}

fn finish<R: Outcome>(ctx: &mut Context, outcome: R) {
    if ctx.has_response() || outcome.write_failure(ctx) {
        return;
    }
    let success = ctx.settings().success();
    ctx.json(&success);
}

fn finish_with<R: Outcome, O: Serialize>(ctx: &mut Context, outcome: R, out: &O) {
    if ctx.has_response() || outcome.write_failure(ctx) {
        return;
    }
    ctx.json(&Data::ok(out));
}
