//! Environment dictionaries for the hub's stacks.
//!
//! Resolved settings are turned into named `KEY=value` maps, one per stack,
//! which inherit from each other (see [`compositor`]). The hub's own set of
//! dictionaries is declared in [`hub`].

pub mod compositor;
pub mod dictionary;
pub mod hub;

pub use compositor::{ComputeFn, DefaultRule, DictionaryDef, StackEnvCompositor, StackEnvCompositorBuilder};
pub use dictionary::EnvironmentDictionary;
pub use hub::hub_compositor;

use std::collections::BTreeSet;

/// Reverse-proxy rule matching any of `hostnames`
///
/// Names are sorted and de-duplicated, so the rule does not depend on input
/// order. No names gives an empty string.
pub fn host_rule<I, S>(hostnames: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hostnames
        .into_iter()
        .map(|h| h.as_ref().trim().to_string())
        .filter(|h| !h.is_empty())
        .collect::<BTreeSet<_>>()
        .iter()
        .map(|h| format!("Host(`{}`)", h))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Double every `$` so compose interpolation yields the literal value
pub fn escape_compose_dollars(value: &str) -> String {
    value.replace('$', "$$")
}
