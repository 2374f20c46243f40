//! Frontmatter parsing from markdown documents.
//!
//! Parsing never fails: a document without a delimited block, or with YAML
//! that does not parse, still yields a usable [`ParsedNote`]. This is what
//! lets syncs and migrations proceed over half-broken files.

use serde_yaml::Mapping;

use super::types::{Frontmatter, ParsedNote};

/// Split a markdown document into frontmatter and body.
///
/// Frontmatter is a `---`-delimited YAML block at the very start of the
/// document (CRLF or LF line endings). Managed field aliases are back-filled
/// on the way out, so callers can read either `id` or `flint_id`.
pub fn parse(content: &str) -> ParsedNote {
    let Some(rest) = strip_open_delimiter(content) else {
        return ParsedNote { frontmatter: None, body: content.to_string() };
    };

    let Some((yaml_block, body)) = split_at_close_delimiter(rest) else {
        // Opening fence with no close: not frontmatter.
        return ParsedNote { frontmatter: None, body: content.to_string() };
    };

    let mapping = if yaml_block.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Mapping>(yaml_block) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!("malformed YAML frontmatter, treating as empty: {err}");
                return ParsedNote {
                    frontmatter: Some(Frontmatter::default()),
                    body: content.to_string(),
                };
            }
        }
    };

    let mut fm = Frontmatter { fields: mapping };
    fm.normalize_aliases();
    ParsedNote { frontmatter: Some(fm), body: body.to_string() }
}

/// Strip the opening `---` line, returning the content after its newline.
fn strip_open_delimiter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

/// Find the closing `---` line; returns (yaml, body-after-close).
fn split_at_close_delimiter(content: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']).trim() == "---" {
            let yaml = &content[..offset];
            let body = &content[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}
