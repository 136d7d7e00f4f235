//! Walks a schema against a decoded JSON object.

use serde_json::value::RawValue;
use tracing::warn;

use super::{Field, Kind, Object, Probe, compile};
use crate::error::ValidationError;

/// Deepest nesting level a request object may reach. Objects below it are
/// rejected.
const MAX_DEPTH: usize = 32;

/// Enforces every tagged field of `fields` against `level`, the JSON object
/// those fields were decoded from. `None` means the enclosing object did not
/// carry this level at all: required fields fail, optional ones pass. A
/// nested field tagged `optional` that is absent or `null` is not descended
/// into. A nested object present past [`MAX_DEPTH`] fails its field.
pub(crate) fn check(
    fields: &[Field],
    level: Option<&Object<'_>>,
    root: &Object<'_>,
) -> Result<(), ValidationError> {
    match level {
        Some(level) => check_level(fields, level, root, 0),
        None => check_absent(fields, &mut Vec::new()),
    }
}

fn check_level(
    fields: &[Field],
    level: &Object<'_>,
    root: &Object<'_>,
    depth: usize,
) -> Result<(), ValidationError> {
    for field in fields {
        let key = field.key();
        let raw = level.get(key).copied();
        let mut optional = false;

        if let Some(tag) = field.valid {
            let rules = compile(tag)?;
            optional = rules.optional;
            match raw {
                Some(raw) => {
                    let probe = Probe { field, raw, parent: level, root };
                    if !rules.rules.iter().all(|rule| rule.check(&probe)) {
                        return Err(rules.rejected(key));
                    }
                }
                None if rules.optional => {}
                None => return Err(rules.missing(key)),
            }
        }

        if let Kind::Struct(nested) = field.kind {
            match raw.filter(|raw| !is_null(raw)) {
                Some(_) if depth == MAX_DEPTH => {
                    warn!(field = key, max_depth = MAX_DEPTH, "request object nested too deep");
                    return Err(ValidationError::Rejected(key.to_owned()));
                }
                Some(raw) => {
                    let inner: Object<'_> = serde_json::from_str(raw.get())
                        .map_err(|_| ValidationError::Rejected(key.to_owned()))?;
                    check_level(nested(), &inner, root, depth + 1)?;
                }
                // An optional nested object that is absent carries no rules.
                None if optional => {}
                None => check_absent(nested(), &mut Vec::new())?,
            }
        }
    }
    Ok(())
}

/// Applies `fields` to an object the request does not carry: the first
/// required field fails. `path` holds the schemas being walked, so a schema
/// that contains itself is walked once.
fn check_absent(fields: &[Field], path: &mut Vec<*const Field>) -> Result<(), ValidationError> {
    if path.contains(&fields.as_ptr()) {
        return Ok(());
    }
    path.push(fields.as_ptr());

    for field in fields {
        if let Some(tag) = field.valid {
            let rules = compile(tag)?;
            if rules.optional {
                continue;
            }
            return Err(rules.missing(field.key()));
        }
        if let Kind::Struct(nested) = field.kind {
            check_absent(nested(), path)?;
        }
    }

    path.pop();
    Ok(())
}

/// Looks for the field whose JSON value has the wrong type for its declared
/// kind, top level first, then inside nested objects.
pub(crate) fn mismatched<'f>(fields: &'f [Field], level: &Object<'_>) -> Option<&'f Field> {
    find_mismatch(fields, level, 0)
}

/// The `message=` configured on `field`, if any.
pub(crate) fn message(field: &Field) -> Option<String> {
    field
        .valid
        .and_then(|tag| compile(tag).ok())
        .and_then(|rules| rules.message.clone())
}

fn find_mismatch<'f>(fields: &'f [Field], level: &Object<'_>, depth: usize) -> Option<&'f Field> {
    if depth > MAX_DEPTH {
        return None;
    }

    let present = || {
        fields
            .iter()
            .filter_map(|field| level.get(field.key()).map(|raw| (field, *raw)))
    };

    if let Some((field, _)) = present().find(|(field, raw)| !fits(field.kind, raw)) {
        return Some(field);
    }

    present().find_map(|(field, raw)| match field.kind {
        Kind::Struct(nested) if !is_null(raw) => {
            let inner: Object<'_> = serde_json::from_str(raw.get()).ok()?;
            find_mismatch(nested(), &inner, depth + 1)
        }
        _ => None,
    })
}

/// Whether a raw JSON value can decode into a field of `kind`. `null` fits
/// everything; a non-optional field rejecting it is not a type mismatch the
/// engine can attribute to a message.
fn fits(kind: Kind, raw: &RawValue) -> bool {
    let text = raw.get();
    if is_null(raw) {
        return true;
    }
    match kind {
        Kind::Int => text.parse::<i64>().is_ok() || text.parse::<u64>().is_ok(),
        Kind::Float => text.parse::<f64>().is_ok(),
        Kind::Str => text.starts_with('"'),
        Kind::Bool => text == "true" || text == "false",
        Kind::Struct(_) => text.starts_with('{'),
        Kind::Any => true,
    }
}

fn is_null(raw: &RawValue) -> bool {
    raw.get() == "null"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Schema;

    struct Sub;
    impl Schema for Sub {
        fn fields() -> &'static [Field] {
            const FIELDS: &[Field] = &[Field::int("d").valid("message=invalid d in sub")];
            FIELDS
        }
    }

    struct Root;
    impl Schema for Root {
        fn fields() -> &'static [Field] {
            const FIELDS: &[Field] = &[
                Field::int("a").valid("message=invalid a"),
                Field::nested("b", Sub::fields),
                Field::nested("c", Sub::fields),
                Field::nested("o", Sub::fields).valid("optional"),
                Field::string("s"),
            ];
            FIELDS
        }
    }

    fn run(fields: &[Field], body: &str) -> Result<(), ValidationError> {
        let root: Object<'_> = serde_json::from_str(body).unwrap();
        check(fields, Some(&root), &root)
    }

    #[test]
    fn lookup_is_scoped_to_the_current_level() {
        // `d` at the top level does not satisfy `b.d`.
        let err = run(Root::fields(), r#"{"a":1,"d":1,"b":{},"c":{"d":2}}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid d in sub");
        assert!(run(Root::fields(), r#"{"a":1,"b":{"d":1},"c":{"d":2}}"#).is_ok());
    }

    #[test]
    fn absent_nested_object_still_applies_inner_rules() {
        let err = run(Root::fields(), r#"{"a":1,"b":{"d":1}}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid d in sub");
        let err = run(Root::fields(), r#"{"a":1,"b":{"d":1},"c":null}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid d in sub");
    }

    #[test]
    fn optional_nested_object_may_be_absent() {
        assert!(run(Root::fields(), r#"{"a":1,"b":{"d":1},"c":{"d":2},"o":null}"#).is_ok());
        let err = run(Root::fields(), r#"{"a":1,"b":{"d":1},"c":{"d":2},"o":{}}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid d in sub");
    }

    fn mismatch_message(body: &str) -> Option<Option<String>> {
        let root: Object<'_> = serde_json::from_str(body).unwrap();
        mismatched(Root::fields(), &root).map(message)
    }

    #[test]
    fn mismatch_search_prefers_top_level() {
        let found = mismatch_message(r#"{"a":1.1,"b":{"d":1.3}}"#);
        assert_eq!(found, Some(Some("invalid a".to_owned())));
    }

    #[test]
    fn mismatch_search_descends_into_nested_objects() {
        for body in [r#"{"a":1,"b":{"d":1.3}}"#, r#"{"a":1,"c":{"d":1.3}}"#] {
            assert_eq!(mismatch_message(body), Some(Some("invalid d in sub".to_owned())));
        }
    }

    #[test]
    fn mismatch_without_message_is_still_found() {
        assert_eq!(mismatch_message(r#"{"a":1,"s":5}"#), Some(None));
        assert_eq!(mismatch_message(r#"{"a":1,"s":"x"}"#), None);
    }

    struct Tree;
    impl Schema for Tree {
        fn fields() -> &'static [Field] {
            const FIELDS: &[Field] = &[Field::nested("child", Tree::fields).valid("optional")];
            FIELDS
        }
    }

    fn nested_body(levels: usize) -> String {
        let mut body = "{}".to_owned();
        for _ in 0..levels {
            body = format!(r#"{{"child":{body}}}"#);
        }
        body
    }

    struct Pair;
    impl Schema for Pair {
        fn fields() -> &'static [Field] {
            const FIELDS: &[Field] = &[
                Field::int("v").valid("optional,[0,10]"),
                Field::nested("left", Pair::fields),
                Field::nested("right", Pair::fields),
            ];
            FIELDS
        }
    }

    #[test]
    fn self_referential_schemas_terminate() {
        crate::validate::compile_schema(Pair::fields()).unwrap();
        assert!(run(Pair::fields(), r#"{"v":1,"left":{"v":2}}"#).is_ok());

        let err = run(Pair::fields(), r#"{"left":{"right":{"v":11}}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Rejected(field) if field == "v"));
    }

    #[test]
    fn objects_nested_past_the_limit_are_rejected() {
        assert!(run(Tree::fields(), &nested_body(3)).is_ok());
        assert!(run(Tree::fields(), &nested_body(MAX_DEPTH)).is_ok());

        let err = run(Tree::fields(), &nested_body(MAX_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, ValidationError::Rejected(field) if field == "child"));
    }

    #[test]
    fn kinds_fit_their_json_types() {
        let raw = |text: &str| RawValue::from_string(text.to_owned()).unwrap();
        assert!(fits(Kind::Int, &raw("-3")));
        assert!(!fits(Kind::Int, &raw("1.5")));
        assert!(fits(Kind::Float, &raw("1")));
        assert!(!fits(Kind::Str, &raw("1")));
        assert!(fits(Kind::Bool, &raw("false")));
        assert!(!fits(Kind::Struct(Sub::fields), &raw("[1]")));
        assert!(fits(Kind::Int, &raw("null")));
    }
}
