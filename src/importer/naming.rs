//! Collision-free managed names.

use std::collections::HashSet;

use crate::importer::diagnostics::{codes, Diagnostics};

/// Placeholder for sources without a retrievable name.
pub const UNNAMED: &str = "(unnamed)";

/// The set of names already used inside one scope (the members of a type, the types of an
/// assembly).
#[derive(Debug, Clone, Default)]
pub struct NameScope {
    used: HashSet<String>,
}

impl NameScope {
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `name` is taken.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Reserve `name`, or the first free `name_2`, `name_3`, ... if it is taken. The second
    /// value tells whether a suffix was needed.
    pub fn claim(&mut self, name: &str) -> (String, bool) {
        if self.used.insert(name.to_string()) {
            return (name.to_string(), false);
        }

        let mut suffix = 2_u32;
        loop {
            let candidate = format!("{name}_{suffix}");
            if self.used.insert(candidate.clone()) {
                return (candidate, true);
            }
            suffix += 1;
        }
    }

    /// [`Self::claim`], reporting a rename as `TI2001`.
    pub fn claim_reported(&mut self, name: &str, diagnostics: &mut Diagnostics) -> String {
        let (claimed, renamed) = self.claim(name);
        if renamed {
            diagnostics.warning(
                codes::NAME_COLLISION,
                format!("member name '{name}' duplicated, renamed to '{claimed}'"),
            );
        }
        claimed
    }
}

/// `name`, or `fallback` when the source name is empty.
#[must_use]
pub fn or_fallback(name: &str, fallback: impl FnOnce() -> String) -> String {
    if name.is_empty() {
        fallback()
    } else {
        name.to_string()
    }
}

/// Split a dotted full name into namespace and simple name.
#[must_use]
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rfind('.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => ("", full_name),
    }
}

/// `namespace.name`, or `name` in the global namespace.
#[must_use]
pub fn full_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}
