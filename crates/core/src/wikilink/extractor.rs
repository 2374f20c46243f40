//! Wikilink and URL extraction from note bodies.

use std::sync::LazyLock;

use regex::Regex;

use crate::ids::{NoteId, is_note_id};
use crate::index::types::ExternalLinkKind;

/// Matches `[[target]]` or `[[target|display]]`.
pub(crate) static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").unwrap());

/// Matches markdown links `[text](url)` and images `![alt](url)`.
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

/// Classification of a wikilink target, decided purely by its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// `[[n-xxxxxxxx]]`, resolving only if that exact ID exists.
    Id(NoteId),
    /// `[[type/basename]]`, recognized by its single slash.
    TypePath { note_type: String, stem: String },
    /// Anything else, resolved by exact title match.
    Title(String),
}

/// Classify a raw wikilink target.
pub fn classify_target(raw: &str) -> LinkTarget {
    if let Ok(id) = raw.parse::<NoteId>() {
        return LinkTarget::Id(id);
    }
    if !is_note_id(raw) && raw.matches('/').count() == 1 {
        let (note_type, rest) = raw.split_once('/').unwrap_or((raw, ""));
        if !note_type.is_empty() && !rest.is_empty() {
            let stem = rest.strip_suffix(".md").unwrap_or(rest);
            return LinkTarget::TypePath {
                note_type: note_type.to_string(),
                stem: stem.to_string(),
            };
        }
    }
    LinkTarget::Title(raw.to_string())
}

/// A wikilink occurrence in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    /// The target exactly as written between the brackets.
    pub target_raw: String,
    pub target: LinkTarget,
    /// Display text after `|`, when given.
    pub display: Option<String>,
    /// 1-based line number.
    pub line_number: u32,
}

/// A URL occurrence in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlLink {
    pub url: String,
    pub text: Option<String>,
    pub kind: ExternalLinkKind,
    /// 1-based line number.
    pub line_number: u32,
}

/// Extract every wikilink with its line number.
pub fn extract_wikilinks(body: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    for (line_idx, line) in body.lines().enumerate() {
        let line_number = (line_idx + 1) as u32;
        for caps in WIKILINK_RE.captures_iter(line) {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            links.push(WikiLink {
                target_raw: raw.to_string(),
                target: classify_target(raw),
                display: caps.get(2).map(|m| m.as_str().to_string()),
                line_number,
            });
        }
    }
    links
}

/// Extract external links from standard markdown syntax.
///
/// `[text](http…)` is a URL, `![alt](http…)` an image, and `![alt](local)`
/// a file embed. Plain local markdown links are not note references in this
/// grammar and are skipped.
pub fn extract_url_links(body: &str) -> Vec<UrlLink> {
    let mut links = Vec::new();
    for (line_idx, line) in body.lines().enumerate() {
        let line_number = (line_idx + 1) as u32;
        for caps in MARKDOWN_LINK_RE.captures_iter(line) {
            let bang = caps.get(1).is_some_and(|m| m.as_str() == "!");
            let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let url = caps.get(3).map(|m| m.as_str()).unwrap_or("");

            let is_web = url.starts_with("http://") || url.starts_with("https://");
            let kind = match (bang, is_web) {
                (false, true) => ExternalLinkKind::Url,
                (true, true) => ExternalLinkKind::Image,
                (true, false) => ExternalLinkKind::Embed,
                (false, false) => continue,
            };

            links.push(UrlLink {
                url: url.to_string(),
                text: if text.is_empty() { None } else { Some(text.to_string()) },
                kind,
                line_number,
            });
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_shape_in_order() {
        assert_eq!(
            classify_target("n-12345678"),
            LinkTarget::Id("n-12345678".parse().unwrap())
        );
        assert_eq!(
            classify_target("projects/roadmap"),
            LinkTarget::TypePath {
                note_type: "projects".to_string(),
                stem: "roadmap".to_string()
            }
        );
        assert_eq!(
            classify_target("projects/roadmap.md"),
            LinkTarget::TypePath {
                note_type: "projects".to_string(),
                stem: "roadmap".to_string()
            }
        );
        assert_eq!(classify_target("Some Title"), LinkTarget::Title("Some Title".into()));
        // Two slashes is not a type/filename reference.
        assert_eq!(classify_target("a/b/c"), LinkTarget::Title("a/b/c".into()));
        // Near-miss IDs fall through to titles.
        assert_eq!(classify_target("n-XYZ"), LinkTarget::Title("n-XYZ".into()));
    }

    #[test]
    fn extracts_wikilinks_with_lines_and_display() {
        let body = "First line\nSee [[Target]] and [[n-12345678|alias]]\n[[projects/plan]]";
        let links = extract_wikilinks(body);
        assert_eq!(links.len(), 3);

        assert_eq!(links[0].target_raw, "Target");
        assert_eq!(links[0].display, None);
        assert_eq!(links[0].line_number, 2);

        assert_eq!(links[1].display.as_deref(), Some("alias"));
        assert!(matches!(links[1].target, LinkTarget::Id(_)));

        assert_eq!(links[2].line_number, 3);
        assert!(matches!(links[2].target, LinkTarget::TypePath { .. }));
    }

    #[test]
    fn extracts_url_kinds() {
        let body = "\
A [site](https://example.com) link
An image ![shot](https://example.com/a.png)
An embed ![doc](assets/spec.pdf)
A local [note](other.md) is not external";
        let links = extract_url_links(body);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].kind, ExternalLinkKind::Url);
        assert_eq!(links[0].text.as_deref(), Some("site"));
        assert_eq!(links[1].kind, ExternalLinkKind::Image);
        assert_eq!(links[2].kind, ExternalLinkKind::Embed);
        assert_eq!(links[2].line_number, 3);
    }

    #[test]
    fn no_links_in_plain_text() {
        assert!(extract_wikilinks("just [brackets] and (parens)").is_empty());
        assert!(extract_url_links("nothing to see").is_empty());
    }
}
