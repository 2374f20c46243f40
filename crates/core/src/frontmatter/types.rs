//! Frontmatter types and data structures.

use serde_yaml::{Mapping, Value};

/// Field-name pairs recognized by the codec: `(legacy, prefixed)`.
///
/// Vaults written before the 2.17.0 migration carry the legacy names; newer
/// vaults carry the prefixed ones. Reads accept either and back-fill the
/// missing side; writes emit exactly one side per [`NameStyle`].
pub const ALIAS_PAIRS: [(&str, &str); 6] = [
    ("id", "flint_id"),
    ("type", "flint_type"),
    ("title", "flint_title"),
    ("filename", "flint_filename"),
    ("created", "flint_created"),
    ("updated", "flint_updated"),
];

/// Which name-space to use for managed fields when writing to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameStyle {
    /// Bare names: `id`, `type`, `title`, ...
    Legacy,
    /// Prefixed names: `flint_id`, `flint_type`, ... (canonical since 2.17.0).
    #[default]
    Prefixed,
}

/// Parsed YAML frontmatter. Preserves key insertion order so that files
/// round-trip without shuffling user keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub fields: Mapping,
}

impl Frontmatter {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(Value::String(key.to_string()))
    }

    /// Look up a managed field under either its legacy or prefixed name.
    pub fn get_aliased(&self, legacy: &str) -> Option<&Value> {
        self.get(legacy).or_else(|| {
            ALIAS_PAIRS
                .iter()
                .find(|(l, _)| *l == legacy)
                .and_then(|(_, p)| self.get(p))
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_aliased(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(Value::String(key.to_string()), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(Value::String(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a field only when neither its legacy nor prefixed form exists.
    /// Returns true when the field was inserted.
    pub fn insert_if_absent(&mut self, legacy_key: &str, value: Value) -> bool {
        if self.get_aliased(legacy_key).is_some() {
            return false;
        }
        self.insert(legacy_key, value);
        true
    }

    /// Back-fill each managed field's missing alias form from the present one.
    pub fn normalize_aliases(&mut self) {
        for (legacy, prefixed) in ALIAS_PAIRS {
            match (self.get(legacy).cloned(), self.get(prefixed).cloned()) {
                (Some(v), None) => self.insert(prefixed, v),
                (None, Some(v)) => self.insert(legacy, v),
                _ => {}
            }
        }
    }

    /// Iterate user keys: every field that is not a managed alias.
    pub fn user_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().filter_map(|(k, v)| {
            let key = k.as_str()?;
            let managed = ALIAS_PAIRS
                .iter()
                .any(|(l, p)| key == *l || key == *p);
            if managed { None } else { Some((key, v)) }
        })
    }
}

/// Result of splitting a markdown document into frontmatter and body.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    /// `None` when the document had no delimited block at all. Malformed YAML
    /// inside a block yields `Some` with an empty mapping.
    pub frontmatter: Option<Frontmatter>,
    /// Everything after the frontmatter block (or the whole document).
    pub body: String,
}

impl ParsedNote {
    /// The frontmatter mapping, empty when absent.
    pub fn metadata(&self) -> Frontmatter {
        self.frontmatter.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_backfill_both_directions() {
        let mut fm = Frontmatter::default();
        fm.insert("id", Value::String("n-12345678".into()));
        fm.insert("flint_title", Value::String("Hello".into()));
        fm.normalize_aliases();

        assert_eq!(fm.get_str("id"), Some("n-12345678"));
        assert_eq!(
            fm.get("flint_id").and_then(Value::as_str),
            Some("n-12345678")
        );
        assert_eq!(fm.get_str("title"), Some("Hello"));
        assert_eq!(fm.get("title").and_then(Value::as_str), Some("Hello"));
    }

    #[test]
    fn insert_if_absent_respects_aliases() {
        let mut fm = Frontmatter::default();
        fm.insert("flint_id", Value::String("n-aaaaaaaa".into()));
        assert!(!fm.insert_if_absent("id", Value::String("n-bbbbbbbb".into())));
        assert!(fm.insert_if_absent("type", Value::String("general".into())));
        assert_eq!(fm.get_str("type"), Some("general"));
    }

    #[test]
    fn user_fields_skip_managed_names() {
        let mut fm = Frontmatter::default();
        fm.insert("flint_id", Value::String("n-aaaaaaaa".into()));
        fm.insert("title", Value::String("T".into()));
        fm.insert("tags", Value::Sequence(vec![Value::String("x".into())]));
        fm.insert("rating", Value::Number(3.into()));

        let keys: Vec<&str> = fm.user_fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["tags", "rating"]);
    }
}
