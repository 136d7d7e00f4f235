//! The `valid` tag grammar.
//!
//! A tag is a comma-separated list of clauses, in any order:
//!
//! | Clause | Meaning |
//! |---|---|
//! | `optional` | the key may be absent; other rules only run when it is present |
//! | `/pattern/` | the value must match `pattern` (unanchored) |
//! | `[min,max]`, `(min,max)`, `[min,)`, … | numeric value, or string length, within bounds |
//! | `@name` | the registered validation function `name` must accept the value |
//! | `message=text` | message reported for any failure of this field |
//!
//! `message=` swallows the rest of the tag, commas included, so it has to be
//! the last clause. The empty tag means "required, nothing else".
//!
//! ```text
//! "optional,[1,10),message=bad value"
//! ```
//!
//! Compiled rule sets are cached process-wide by tag text: tags are static
//! strings attached to input schemas, so the cache only ever grows to the
//! number of distinct tags in the program.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use serde_json::value::RawValue;

use super::Probe;
use super::registry;
use crate::error::{RuleError, ValidationError};
use crate::validate::Kind;

static CACHE: LazyLock<DashMap<String, Arc<RuleSet>>> = LazyLock::new(DashMap::new);

/// Returns the compiled rule set for `tag`, compiling it on first use.
///
/// Two threads compiling the same tag at once both parse it; the first insert
/// wins and both get the same `Arc` back.
pub fn compile(tag: &str) -> Result<Arc<RuleSet>, RuleError> {
    if let Some(hit) = CACHE.get(tag) {
        return Ok(Arc::clone(hit.value()));
    }
    let parsed = Arc::new(RuleSet::parse(tag)?);
    let entry = CACHE.entry(tag.to_owned()).or_insert(parsed);
    Ok(Arc::clone(entry.value()))
}

/// The compiled form of one field's `valid` tag.
#[derive(Debug, Default)]
pub struct RuleSet {
    pub optional: bool,
    pub message: Option<String>,
    pub rules: Vec<Rule>,
}

/// A single content constraint.
#[derive(Debug)]
pub enum Rule {
    Regex(Regex),
    Range(Range),
    Function(String),
}

/// Bounds of a range clause. A missing bound is unconstrained on its side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Range {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl RuleSet {
    /// Parses a tag without consulting the cache. Prefer [`compile`].
    pub fn parse(tag: &str) -> Result<Self, RuleError> {
        let mut set = RuleSet::default();
        let mut rest = tag.trim_start();

        while !rest.is_empty() {
            if let Some(message) = rest.strip_prefix("message=") {
                set.message = Some(message.to_owned());
                break;
            }

            let tail = match rest.as_bytes()[0] {
                b'/' => {
                    let (pattern, tail) = split_regex(rest)
                        .ok_or_else(|| RuleError::UnterminatedRegex { tag: tag.to_owned() })?;
                    let regex = Regex::new(pattern).map_err(|source| RuleError::BadRegex {
                        tag: tag.to_owned(),
                        source,
                    })?;
                    set.rules.push(Rule::Regex(regex));
                    tail
                }
                b'[' | b'(' => {
                    let (range, tail) = split_range(rest).ok_or_else(|| RuleError::BadRange {
                        tag: tag.to_owned(),
                        clause: clause_text(rest).to_owned(),
                    })?;
                    set.rules.push(Rule::Range(range));
                    tail
                }
                _ => {
                    let (clause, tail) = rest.split_once(',').unwrap_or((rest, ""));
                    let clause = clause.trim();
                    if clause == "optional" {
                        if set.optional {
                            return Err(RuleError::DuplicateOptional { tag: tag.to_owned() });
                        }
                        set.optional = true;
                    } else if let Some(name) = clause.strip_prefix('@').filter(|n| is_ident(n)) {
                        set.rules.push(Rule::Function(name.to_owned()));
                    } else if !clause.is_empty() {
                        return Err(RuleError::UnknownClause {
                            tag: tag.to_owned(),
                            clause: clause.to_owned(),
                        });
                    }
                    // `tail` already has its separator stripped.
                    rest = tail.trim_start();
                    continue;
                }
            };

            rest = match tail.strip_prefix(',') {
                Some(next) => next.trim_start(),
                None if tail.trim().is_empty() => "",
                None => {
                    return Err(RuleError::UnknownClause {
                        tag: tag.to_owned(),
                        clause: clause_text(tail).trim().to_owned(),
                    });
                }
            };
        }

        Ok(set)
    }

    pub(crate) fn missing(&self, field: &str) -> ValidationError {
        match &self.message {
            Some(message) => ValidationError::Message(message.clone()),
            None => ValidationError::Missing(field.to_owned()),
        }
    }

    pub(crate) fn rejected(&self, field: &str) -> ValidationError {
        match &self.message {
            Some(message) => ValidationError::Message(message.clone()),
            None => ValidationError::Rejected(field.to_owned()),
        }
    }
}

impl Rule {
    /// Evaluates the rule against a present field value.
    pub(crate) fn check(&self, probe: &Probe<'_>) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(unquote(probe.raw.get())),
            Self::Range(range) => range.check(probe.field.kind, probe.raw),
            Self::Function(name) => registry::call(name, probe),
        }
    }
}

impl Range {
    fn check(&self, kind: Kind, raw: &RawValue) -> bool {
        let text = raw.get();
        match kind {
            Kind::Int => text.parse::<i64>().is_ok_and(|v| self.contains_int(v)),
            Kind::Float => text.parse::<f64>().is_ok_and(|v| self.contains_float(v)),
            Kind::Str => {
                let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
                quoted && self.contains_int((text.len() - 2) as i64)
            }
            _ => false,
        }
    }

    pub fn contains_int(&self, value: i64) -> bool {
        let above = match self.min {
            Some(min) => value > min || (self.min_inclusive && value == min),
            None => true,
        };
        let below = match self.max {
            Some(max) => value < max || (self.max_inclusive && value == max),
            None => true,
        };
        above && below
    }

    pub fn contains_float(&self, value: f64) -> bool {
        let above = match self.min {
            Some(min) => value > min as f64 || (self.min_inclusive && value == min as f64),
            None => true,
        };
        let below = match self.max {
            Some(max) => value < max as f64 || (self.max_inclusive && value == max as f64),
            None => true,
        };
        above && below
    }
}

/// Renders a range the way it reads: `1<=x<10`, `<x<2`.
impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(min) = self.min {
            write!(f, "{min}")?;
        }
        f.write_str(if self.min_inclusive { "<=x" } else { "<x" })?;
        f.write_str(if self.max_inclusive { "<=" } else { "<" })?;
        if let Some(max) = self.max {
            write!(f, "{max}")?;
        }
        Ok(())
    }
}

/// Strips one pair of enclosing double quotes, if present.
pub(crate) fn unquote(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

// ── Clause scanners ──────────────────────────────────────────────────────────

/// `/pattern/` up to the first `/` that ends the clause (followed by `,` or
/// the end of the tag). Returns the pattern and the text after the closing `/`.
fn split_regex(rest: &str) -> Option<(&str, &str)> {
    let body = &rest[1..];
    let mut search = 0;
    while let Some(pos) = body[search..].find('/') {
        let end = search + pos;
        let after = &body[end + 1..];
        if after.is_empty() || after.starts_with(',') {
            return Some((&body[..end], after));
        }
        search = end + 1;
    }
    None
}

/// `[min,max]` with either bracket style on either side.
fn split_range(rest: &str) -> Option<(Range, &str)> {
    let min_inclusive = rest.starts_with('[');
    let close = rest.find([']', ')'])?;
    let max_inclusive = rest.as_bytes()[close] == b']';
    let (min, max) = rest[1..close].split_once(',')?;
    let range = Range {
        min: parse_bound(min)?,
        max: parse_bound(max)?,
        min_inclusive,
        max_inclusive,
    };
    Some((range, &rest[close + 1..]))
}

/// `Some(None)` for an empty bound, `None` for garbage.
fn parse_bound(text: &str) -> Option<Option<i64>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(None);
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().map(Some)
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The clause text up to the next comma, for error messages.
fn clause_text(rest: &str) -> &str {
    rest.split(',').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(set: &RuleSet) -> Vec<String> {
        set.rules
            .iter()
            .map(|rule| match rule {
                Rule::Regex(re) => re.as_str().to_owned(),
                Rule::Range(range) => range.to_string(),
                Rule::Function(name) => name.clone(),
            })
            .collect()
    }

    #[test]
    fn empty_tag_is_required_without_rules() {
        let set = RuleSet::parse("").unwrap();
        assert!(!set.optional);
        assert!(set.message.is_none());
        assert!(set.rules.is_empty());
    }

    #[test]
    fn parses_every_clause_kind() {
        let cases: &[(&str, bool, Option<&str>, &[&str])] = &[
            ("@func", false, None, &["func"]),
            ("@func1,@func2", false, None, &["func1", "func2"]),
            ("[1,2]", false, None, &["1<=x<=2"]),
            ("[-2,-1]", false, None, &["-2<=x<=-1"]),
            ("(1,2]", false, None, &["1<x<=2"]),
            ("[1,2)", false, None, &["1<=x<2"]),
            ("(1,2)", false, None, &["1<x<2"]),
            ("(1,)", false, None, &["1<x<"]),
            ("(,2)", false, None, &["<x<2"]),
            ("/.*/", false, None, &[".*"]),
            (r"/\d+/", false, None, &[r"\d+"]),
            ("optional", true, None, &[]),
            ("message=aaa", false, Some("aaa"), &[]),
            ("@func,optional", true, None, &["func"]),
            ("[1,2],optional", true, None, &["1<=x<=2"]),
            ("@func,[1,2]", false, None, &["func", "1<=x<=2"]),
            ("@func,[1,2],optional", true, None, &["func", "1<=x<=2"]),
            (
                "@func,[1,2],optional,message=hello 123",
                true,
                Some("hello 123"),
                &["func", "1<=x<=2"],
            ),
        ];

        for &(tag, optional, message, rules) in cases {
            let set = RuleSet::parse(tag).unwrap_or_else(|e| panic!("{tag}: {e}"));
            assert_eq!(set.optional, optional, "{tag}");
            assert_eq!(set.message.as_deref(), message, "{tag}");
            assert_eq!(describe(&set), rules, "{tag}");
        }
    }

    #[test]
    fn message_swallows_commas() {
        let set = RuleSet::parse("optional,message=too long, try again").unwrap();
        assert!(set.optional);
        assert_eq!(set.message.as_deref(), Some("too long, try again"));
    }

    #[test]
    fn regex_may_contain_commas_and_slashes() {
        let set = RuleSet::parse(r"/^\d{1,3}$/,/a/b/").unwrap();
        assert_eq!(describe(&set), [r"^\d{1,3}$", "a/b"]);
    }

    #[test]
    fn rejects_unknown_clauses() {
        assert!(matches!(
            RuleSet::parse("required"),
            Err(RuleError::UnknownClause { clause, .. }) if clause == "required"
        ));
        assert!(matches!(RuleSet::parse("[1,2]x"), Err(RuleError::UnknownClause { .. })));
        assert!(matches!(RuleSet::parse("@9lives"), Err(RuleError::UnknownClause { .. })));
    }

    #[test]
    fn rejects_malformed_ranges_and_regexes() {
        assert!(matches!(RuleSet::parse("[1;2]"), Err(RuleError::BadRange { .. })));
        assert!(matches!(RuleSet::parse("[a,2]"), Err(RuleError::BadRange { .. })));
        assert!(matches!(RuleSet::parse("[-,2]"), Err(RuleError::BadRange { .. })));
        assert!(matches!(RuleSet::parse("/abc"), Err(RuleError::UnterminatedRegex { .. })));
        assert!(matches!(RuleSet::parse("/(/"), Err(RuleError::BadRegex { .. })));
        assert!(matches!(
            RuleSet::parse("optional,optional"),
            Err(RuleError::DuplicateOptional { .. })
        ));
    }

    #[test]
    fn compile_shares_one_instance_per_tag() {
        let a = compile("[3,7],message=shared").unwrap();
        let b = compile("[3,7],message=shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn concurrent_compilation_is_idempotent() {
        let tag = "optional,(0,100],@concurrent_probe";
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || compile(tag).unwrap()))
            .collect();
        let sets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for set in &sets {
            assert!(set.optional);
            assert_eq!(describe(set), ["0<x<=100", "concurrent_probe"]);
        }
        let cached = compile(tag).unwrap();
        assert!(sets.iter().all(|s| s.optional == cached.optional));
    }

    #[test]
    fn range_bounds_honor_brackets_independently() {
        let half_open = Range { min: Some(1), max: Some(10), min_inclusive: true, max_inclusive: false };
        assert!(half_open.contains_int(1));
        assert!(half_open.contains_int(9));
        assert!(!half_open.contains_int(10));
        assert!(!half_open.contains_int(0));

        let open_max = Range { min: Some(0), max: None, min_inclusive: false, max_inclusive: false };
        assert!(open_max.contains_float(0.5));
        assert!(!open_max.contains_float(0.0));
        assert!(open_max.contains_float(1e12));
    }

    #[test]
    fn unquote_strips_one_pair() {
        assert_eq!(unquote(r#""abc""#), "abc");
        assert_eq!(unquote(r#""""#), "");
        assert_eq!(unquote("123"), "123");
        assert_eq!(unquote(r#"""x"""#), r#""x""#);
    }
}
