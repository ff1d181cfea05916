//! Recursive in-value reference expansion.
//!
//! Secret values may refer to sibling secrets with `${NAME}`. References are
//! resolved against the same fetched list, recursively, so a chain like
//! `A = ${B}`, `B = ${C}`, `C = literal` fully flattens. References that do
//! not name a fetched secret stay literal in the output. Expansion depth is
//! capped so mutually recursive values terminate.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::SecretEntry;

static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("valid reference pattern"));

// Bounds chains and cycles; deeper nesting than this is not a real use case.
const MAX_EXPANSION_DEPTH: usize = 32;

/// Expand `${name}` references in every entry's value against the list itself.
pub fn expand_secrets(secrets: Vec<SecretEntry>) -> Vec<SecretEntry> {
    let lookup: HashMap<String, String> =
        secrets.iter().map(|s| (s.name.clone(), s.value.clone())).collect();

    secrets
        .into_iter()
        .map(|mut entry| {
            entry.value = expand_value(&entry.value, &lookup, 0);
            entry
        })
        .collect()
}

fn expand_value(value: &str, lookup: &HashMap<String, String>, depth: usize) -> String {
    if depth >= MAX_EXPANSION_DEPTH || !value.contains("${") {
        return value.to_string();
    }

    REFERENCE_PATTERN
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match lookup.get(name) {
                Some(resolved) => expand_value(resolved, lookup, depth + 1),
                // Unresolved references remain literal.
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<SecretEntry> {
        pairs.iter().map(|(n, v)| SecretEntry::new(*n, *v)).collect()
    }

    fn value_of<'a>(expanded: &'a [SecretEntry], name: &str) -> &'a str {
        &expanded.iter().find(|e| e.name == name).unwrap().value
    }

    #[test]
    fn test_plain_values_unchanged() {
        let expanded = expand_secrets(entries(&[("A", "hello"), ("B", "world")]));
        assert_eq!(value_of(&expanded, "A"), "hello");
        assert_eq!(value_of(&expanded, "B"), "world");
    }

    #[test]
    fn test_single_reference() {
        let expanded = expand_secrets(entries(&[("HOST", "db.internal"), ("URL", "postgres://${HOST}/app")]));
        assert_eq!(value_of(&expanded, "URL"), "postgres://db.internal/app");
    }

    #[test]
    fn test_recursive_reference() {
        let expanded =
            expand_secrets(entries(&[("A", "${B}"), ("B", "${C}"), ("C", "deep")]));
        assert_eq!(value_of(&expanded, "A"), "deep");
        assert_eq!(value_of(&expanded, "B"), "deep");
    }

    #[test]
    fn test_unresolved_reference_stays_literal() {
        let expanded = expand_secrets(entries(&[("A", "prefix-${MISSING}-suffix")]));
        assert_eq!(value_of(&expanded, "A"), "prefix-${MISSING}-suffix");
    }

    #[test]
    fn test_multiple_references_in_one_value() {
        let expanded = expand_secrets(entries(&[
            ("USER", "app"),
            ("PASS", "hunter2"),
            ("DSN", "${USER}:${PASS}@db"),
        ]));
        assert_eq!(value_of(&expanded, "DSN"), "app:hunter2@db");
    }

    #[test]
    fn test_cycle_terminates() {
        let expanded = expand_secrets(entries(&[("A", "${B}"), ("B", "${A}")]));
        // Must terminate; the unexpanded remainder is still a `${...}` literal.
        assert!(value_of(&expanded, "A").contains("${"));
    }
}
