//! Request-body binding and declarative validation.
//!
//! An input type declares its fields once through [`Schema`], attaching a
//! `valid` tag (see [`rules`] for the grammar) to the fields that need
//! checking:
//!
//! ```rust
//! use kelp::validate::{Field, Schema};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! #[serde(default)]
//! struct Register {
//!     name: String,
//!     age: i64,
//!     #[serde(rename = "e-mail")]
//!     email: Option<String>,
//! }
//!
//! impl Schema for Register {
//!     fn fields() -> &'static [Field] {
//!         const FIELDS: &[Field] = &[
//!             Field::string("name").valid("[1,32],message=bad name"),
//!             Field::int("age").valid("optional,[0,150)"),
//!             Field::string("email").rename("e-mail").valid(r"optional,/^[^@]+@[^@]+$/"),
//!         ];
//!         FIELDS
//!     }
//! }
//!
//! let input: Register = kelp::validate::bind_json(br#"{"name":"kelp"}"#).unwrap();
//! assert_eq!(input.name, "kelp");
//! ```
//!
//! Binding happens in three steps: the body must be a JSON object, it must
//! decode into the input type, and every tagged field must pass its rules.
//! Rules see the raw JSON text of each value, not the decoded Rust value, so
//! `"12"` and `12` are different things to a range rule on a string field.

mod engine;
mod registry;
pub mod rules;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::{RuleError, ValidationError};

pub use registry::{regex_fn, register_valid_fn};
pub use rules::{Range, Rule, RuleSet, compile};

pub(crate) use registry::freeze;

/// One level of a JSON document: keys mapped to their raw, undecoded values.
pub type Object<'a> = BTreeMap<String, &'a RawValue>;

/// The JSON type a field decodes from.
#[derive(Clone, Copy, Debug)]
pub enum Kind {
    /// Any integer type. Range rules compare the value as `i64`.
    Int,
    /// `f32` / `f64`. Range rules compare the value as `f64`.
    Float,
    /// `String` and friends. Range rules compare the byte length.
    Str,
    Bool,
    /// A nested struct (or `Option` of one). Validation recurses into it.
    Struct(fn() -> &'static [Field]),
    /// Anything else: lists, maps, enums. Range rules always fail.
    Any,
}

/// Declaration of one input field.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    pub name: &'static str,
    pub rename: Option<&'static str>,
    pub kind: Kind,
    pub valid: Option<&'static str>,
}

impl Field {
    pub const fn new(name: &'static str, kind: Kind) -> Self {
        Self { name, rename: None, kind, valid: None }
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, Kind::Int)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, Kind::Float)
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, Kind::Str)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, Kind::Bool)
    }

    pub const fn any(name: &'static str) -> Self {
        Self::new(name, Kind::Any)
    }

    pub const fn nested(name: &'static str, fields: fn() -> &'static [Field]) -> Self {
        Self::new(name, Kind::Struct(fields))
    }

    /// The key the field is serialized under, when it differs from `name`.
    pub const fn rename(self, key: &'static str) -> Self {
        Self { rename: Some(key), ..self }
    }

    /// Attaches a `valid` tag.
    pub const fn valid(self, tag: &'static str) -> Self {
        Self { valid: Some(tag), ..self }
    }

    /// The JSON key this field is looked up under.
    pub fn key(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }
}

/// Field declarations of an input type, in declaration order.
pub trait Schema {
    fn fields() -> &'static [Field];
}

/// A type a handler can receive as its bound and validated input.
pub trait Input: DeserializeOwned + Schema {}

impl<T: DeserializeOwned + Schema> Input for T {}

/// What a validation function is shown for one field.
pub struct Probe<'a> {
    /// The field being validated.
    pub field: &'a Field,
    /// The field's raw JSON value.
    pub raw: &'a RawValue,
    /// The object the field sits in.
    pub parent: &'a Object<'a>,
    /// The top-level request object.
    pub root: &'a Object<'a>,
}

/// Decodes `body` into `T` and enforces every `valid` tag of `T`'s schema.
///
/// A decode failure caused by a value of the wrong JSON type reports the
/// offending field's `message=` when it has one, and the decoder's own
/// diagnostic when it has none. Decode failures that no field explains (a
/// missing non-defaulted field, say) report the first rule failure if there
/// is one, and the decoder's diagnostic otherwise.
pub fn bind_json<T: Input>(body: &[u8]) -> Result<T, ValidationError> {
    let root: Object<'_> = serde_json::from_slice(body)?;
    let value = match serde_json::from_slice::<T>(body) {
        Ok(value) => value,
        Err(err) => {
            if let Some(field) = engine::mismatched(T::fields(), &root) {
                return Err(match engine::message(field) {
                    Some(message) => ValidationError::Message(message),
                    None => ValidationError::Body(err),
                });
            }
            engine::check(T::fields(), Some(&root), &root)?;
            return Err(ValidationError::Body(err));
        }
    };
    engine::check(T::fields(), Some(&root), &root)?;
    Ok(value)
}

/// Enforces `T`'s `valid` tags against `body` without decoding it into `T`.
pub fn validate<T: Schema>(body: &[u8]) -> Result<(), ValidationError> {
    let root: Object<'_> = serde_json::from_slice(body)?;
    engine::check(T::fields(), Some(&root), &root)
}

/// Compiles every tag of a schema, nested schemas included.
///
/// Handler registration calls this so a bad tag stops the program at startup
/// instead of failing its first request.
pub fn compile_schema(fields: &[Field]) -> Result<(), RuleError> {
    compile_level(fields, &mut Vec::new())
}

/// `seen` holds every schema already compiled, so shared and
/// self-referential schemas are compiled once.
fn compile_level(fields: &[Field], seen: &mut Vec<*const Field>) -> Result<(), RuleError> {
    if seen.contains(&fields.as_ptr()) {
        return Ok(());
    }
    seen.push(fields.as_ptr());

    for field in fields {
        if let Some(tag) = field.valid {
            compile(tag)?;
        }
        if let Kind::Struct(nested) = field.kind {
            compile_level(nested(), seen)?;
        }
    }
    Ok(())
}
