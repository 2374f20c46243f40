//! Frontmatter serialization back to markdown.

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};

use super::types::{ALIAS_PAIRS, Frontmatter, NameStyle};

/// Render a full note document: frontmatter block followed by body.
///
/// Managed fields are written under exactly one name-space; the duplicate
/// alias forms produced by read-side back-fill are collapsed. An empty
/// mapping renders as the body alone.
pub fn render_note(fm: &Frontmatter, body: &str, style: NameStyle) -> String {
    let canonical = canonicalize(fm, style);
    if canonical.is_empty() {
        return body.to_string();
    }
    let yaml = serde_yaml::to_string(&canonical).unwrap_or_default();
    format!("---\n{yaml}---\n\n{body}")
}

/// Collapse alias pairs to the requested name-space, preserving field order
/// and every user key verbatim.
fn canonicalize(fm: &Frontmatter, style: NameStyle) -> Mapping {
    let mut out = Mapping::new();
    for (key, value) in &fm.fields {
        let Some(name) = key.as_str() else {
            out.insert(key.clone(), value.clone());
            continue;
        };
        match alias_pair_for(name) {
            Some((legacy, prefixed)) => {
                let canonical = match style {
                    NameStyle::Legacy => legacy,
                    NameStyle::Prefixed => prefixed,
                };
                // First alias encountered wins; the mirror copy is skipped.
                if !out.contains_key(Value::String(canonical.to_string())) {
                    out.insert(Value::String(canonical.to_string()), value.clone());
                }
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

fn alias_pair_for(name: &str) -> Option<(&'static str, &'static str)> {
    ALIAS_PAIRS
        .iter()
        .copied()
        .find(|(l, p)| name == *l || name == *p)
}

/// Yaml value for a timestamp: ISO-8601 string, not a YAML timestamp scalar.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parser::parse;

    #[test]
    fn render_without_frontmatter_is_body() {
        let fm = Frontmatter::default();
        assert_eq!(render_note(&fm, "# Hi", NameStyle::Prefixed), "# Hi");
    }

    #[test]
    fn render_prefixed_collapses_aliases() {
        let parsed = parse("---\nid: n-12345678\ntitle: T\ntags: [a]\n---\nBody");
        let fm = parsed.frontmatter.unwrap();
        let out = render_note(&fm, &parsed.body, NameStyle::Prefixed);

        assert!(out.contains("flint_id: n-12345678"));
        assert!(out.contains("flint_title: T"));
        assert!(!out.contains("\nid:"));
        assert!(!out.contains("\ntitle:"));
        assert!(out.contains("tags:"));
        assert!(out.ends_with("Body"));
    }

    #[test]
    fn render_legacy_collapses_aliases() {
        let parsed = parse("---\nflint_id: n-12345678\n---\nBody");
        let fm = parsed.frontmatter.unwrap();
        let out = render_note(&fm, &parsed.body, NameStyle::Legacy);

        assert!(out.contains("id: n-12345678"));
        assert!(!out.contains("flint_id"));
    }

    #[test]
    fn round_trip_preserves_user_keys_and_values() {
        let original = "---\nflint_id: n-0a0a0a0a\ncustom: 42\nflag: true\nlist:\n- x\n- y\n---\n\nBody here";
        let parsed = parse(original);
        let fm = parsed.frontmatter.unwrap();
        let rendered = render_note(&fm, &parsed.body, NameStyle::Prefixed);
        let reparsed = parse(&rendered);
        let fm2 = reparsed.frontmatter.unwrap();

        assert_eq!(fm2.get_str("id"), Some("n-0a0a0a0a"));
        assert_eq!(fm2.get("custom").and_then(|v| v.as_i64()), Some(42));
        assert_eq!(fm2.get("flag").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(reparsed.body, "Body here");
    }

    #[test]
    fn timestamps_render_as_strings() {
        let ts = chrono::Utc::now();
        let v = timestamp_value(ts);
        assert!(v.as_str().is_some());
    }
}
