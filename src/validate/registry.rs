//! Named validation functions referenced by `@name` clauses.
//!
//! Functions are registered once, before the server starts, and looked up on
//! every request. [`Server::serve`](crate::Server::serve) freezes the registry;
//! later registrations are rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, warn};

use super::Probe;
use super::rules::unquote;
use crate::error::Error;

type ValidFn = dyn Fn(&Probe<'_>) -> bool + Send + Sync;

static FUNCTIONS: LazyLock<DashMap<String, Arc<ValidFn>>> = LazyLock::new(DashMap::new);
static FROZEN: AtomicBool = AtomicBool::new(false);

/// Registers `f` under `name`, making `@name` usable in `valid` tags.
///
/// Registering a name twice replaces the earlier function.
///
/// ```rust
/// kelp::validate::register_valid_fn("even", |probe| {
///     probe.raw.get().parse::<i64>().is_ok_and(|n| n % 2 == 0)
/// })
/// .unwrap();
/// ```
pub fn register_valid_fn<F>(name: &str, f: F) -> Result<(), Error>
where
    F: Fn(&Probe<'_>) -> bool + Send + Sync + 'static,
{
    if FROZEN.load(Ordering::Acquire) {
        return Err(Error::RegistryFrozen(name.to_owned()));
    }
    debug!(name, "validation function registered");
    FUNCTIONS.insert(name.to_owned(), Arc::new(f));
    Ok(())
}

/// Builds a validation function from a regular expression.
///
/// Useful when the pattern contains characters a `/…/` clause cannot hold,
/// such as `,/` in sequence. String values are matched without their quotes.
///
/// ```rust
/// use kelp::validate::{regex_fn, register_valid_fn};
///
/// register_valid_fn("datetime", regex_fn(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap()).unwrap();
/// ```
pub fn regex_fn(
    pattern: &str,
) -> Result<impl Fn(&Probe<'_>) -> bool + Send + Sync + 'static, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(predicate(move |probe| regex.is_match(unquote(probe.raw.get()))))
}

fn predicate<F>(f: F) -> F
where
    F: Fn(&Probe<'_>) -> bool,
{
    f
}

pub(crate) fn freeze() {
    FROZEN.store(true, Ordering::Release);
}

/// Runs the function registered as `name`. Unknown names always fail.
pub(crate) fn call(name: &str, probe: &Probe<'_>) -> bool {
    let Some(f) = FUNCTIONS.get(name).map(|entry| Arc::clone(entry.value())) else {
        warn!(function = name, field = probe.field.name, "unregistered validation function");
        return false;
    };
    f(probe)
}
