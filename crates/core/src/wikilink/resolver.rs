//! Wikilink resolution against the index.
//!
//! Resolution policy: ID links resolve only when that exact ID exists (a
//! missing ID is a broken link, never rewritten); title links resolve by
//! exact title, earliest-created note first; `type/filename` links resolve
//! by `(type, stem)`.

use std::collections::HashMap;

use chrono::Utc;

use super::extractor::{
    LinkTarget, WIKILINK_RE, extract_url_links, extract_wikilinks,
};
use crate::ids::NoteId;
use crate::index::types::{ExternalLink, NoteLink};
use crate::index::{IndexDb, IndexError};

/// Resolves link targets and rewrites bodies using the index.
pub struct LinkResolver<'a> {
    db: &'a IndexDb,
}

impl<'a> LinkResolver<'a> {
    pub fn new(db: &'a IndexDb) -> Self {
        Self { db }
    }

    /// Resolve a classified target to a note ID, if one matches.
    pub fn resolve_target(
        &self,
        target: &LinkTarget,
    ) -> Result<Option<NoteId>, IndexError> {
        match target {
            LinkTarget::Id(id) => {
                Ok(if self.db.id_exists(id)? { Some(id.clone()) } else { None })
            }
            LinkTarget::Title(title) => self.db.find_id_by_title(title),
            LinkTarget::TypePath { note_type, stem } => {
                self.db.find_id_by_type_and_stem(note_type, stem)
            }
        }
    }

    /// Extract and resolve all links in a body, then atomically replace the
    /// source note's link rows. Returns the number of internal links stored.
    pub fn store_links_for(
        &self,
        source: &NoteId,
        body: &str,
    ) -> Result<usize, IndexError> {
        let now = Utc::now();

        let mut note_links = Vec::new();
        for link in extract_wikilinks(body) {
            let target_id = self.resolve_target(&link.target)?;
            note_links.push(NoteLink {
                id: None,
                source_id: source.clone(),
                target_id,
                target_title: link.target_raw,
                link_text: link.display,
                line_number: link.line_number,
                created: now,
            });
        }

        let external_links: Vec<ExternalLink> = extract_url_links(body)
            .into_iter()
            .map(|url| ExternalLink {
                id: None,
                note_id: source.clone(),
                url: url.url,
                title: url.text,
                line_number: url.line_number,
                link_type: url.kind,
            })
            .collect();

        let count = note_links.len();
        self.db.store_links(source, &note_links, &external_links)?;
        Ok(count)
    }

    /// Rewrite resolvable non-ID wikilinks into ID form.
    ///
    /// `[[Target]]` becomes `[[<id>|Target]]`, `[[Target|display]]` becomes
    /// `[[<id>|display]]`. Broken links stay verbatim and ID links are never
    /// touched, which makes the rewrite idempotent. Returns the rewritten
    /// text and the number of links converted.
    pub fn convert_title_links_to_id_links(
        &self,
        text: &str,
    ) -> Result<(String, usize), IndexError> {
        // Resolve up front: the replacement closure cannot be fallible.
        let mut resolved: HashMap<String, NoteId> = HashMap::new();
        for link in extract_wikilinks(text) {
            if matches!(link.target, LinkTarget::Id(_)) {
                continue;
            }
            if resolved.contains_key(&link.target_raw) {
                continue;
            }
            if let Some(id) = self.resolve_target(&link.target)? {
                resolved.insert(link.target_raw, id);
            }
        }
        if resolved.is_empty() {
            return Ok((text.to_string(), 0));
        }

        let mut converted = 0;
        let rewritten = WIKILINK_RE.replace_all(text, |caps: &regex::Captures| {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            match resolved.get(raw) {
                Some(id) => {
                    converted += 1;
                    let display = caps.get(2).map(|m| m.as_str()).unwrap_or(raw);
                    format!("[[{id}|{display}]]")
                }
                None => caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string(),
            }
        });

        Ok((rewritten.into_owned(), converted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::NoteRecord;

    fn insert_note(db: &IndexDb, note_type: &str, filename: &str, title: &str) -> NoteId {
        let now = Utc::now();
        let note = NoteRecord {
            id: NoteId::mint(),
            note_type: note_type.to_string(),
            filename: filename.to_string(),
            path: format!("{note_type}/{filename}"),
            title: title.to_string(),
            content: String::new(),
            created: now,
            updated: now,
            file_mtime_ms: 0,
            size_bytes: 0,
            content_hash: "h".to_string(),
            archived: false,
        };
        db.insert_note(&note).unwrap();
        note.id
    }

    #[test]
    fn resolves_title_and_type_path() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "projects", "roadmap.md", "The Roadmap");
        let resolver = LinkResolver::new(&db);

        let by_title = resolver
            .resolve_target(&LinkTarget::Title("The Roadmap".into()))
            .unwrap();
        assert_eq!(by_title, Some(id.clone()));

        let by_path = resolver
            .resolve_target(&LinkTarget::TypePath {
                note_type: "projects".into(),
                stem: "roadmap".into(),
            })
            .unwrap();
        assert_eq!(by_path, Some(id));
    }

    #[test]
    fn id_links_resolve_only_when_present() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "general", "a.md", "A");
        let resolver = LinkResolver::new(&db);

        assert_eq!(
            resolver.resolve_target(&LinkTarget::Id(id.clone())).unwrap(),
            Some(id)
        );
        assert_eq!(
            resolver
                .resolve_target(&LinkTarget::Id("n-00000000".parse().unwrap()))
                .unwrap(),
            None
        );
    }

    #[test]
    fn converts_title_links_and_keeps_display() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "general", "t.md", "Target");
        let resolver = LinkResolver::new(&db);

        let (out, n) = resolver
            .convert_title_links_to_id_links("See [[Target]] and [[Target|the one]]")
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(out, format!("See [[{id}|Target]] and [[{id}|the one]]"));
    }

    #[test]
    fn broken_and_id_links_stay_verbatim() {
        let db = IndexDb::open_in_memory().unwrap();
        insert_note(&db, "general", "t.md", "Target");
        let resolver = LinkResolver::new(&db);

        let text = "[[Nowhere]] and [[n-00000000]] and [[n-00000000|kept]]";
        let (out, n) = resolver.convert_title_links_to_id_links(text).unwrap();
        assert_eq!(n, 0);
        assert_eq!(out, text);
    }

    #[test]
    fn conversion_is_idempotent() {
        let db = IndexDb::open_in_memory().unwrap();
        insert_note(&db, "general", "t.md", "Target");
        let resolver = LinkResolver::new(&db);

        let (once, _) =
            resolver.convert_title_links_to_id_links("Go [[Target]] now").unwrap();
        let (twice, n) = resolver.convert_title_links_to_id_links(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(n, 0);
    }

    #[test]
    fn store_links_records_resolution_state() {
        let db = IndexDb::open_in_memory().unwrap();
        let source = insert_note(&db, "general", "s.md", "Source");
        let target = insert_note(&db, "general", "t.md", "Target");
        let resolver = LinkResolver::new(&db);

        let count = resolver
            .store_links_for(&source, "Hit [[Target]], miss [[Nothing]], web [x](https://x.io)")
            .unwrap();
        assert_eq!(count, 2);

        let links = db.outgoing_links(&source).unwrap();
        assert_eq!(links.len(), 2);
        let hit = links.iter().find(|l| l.target_title == "Target").unwrap();
        assert_eq!(hit.target_id, Some(target));
        let miss = links.iter().find(|l| l.target_title == "Nothing").unwrap();
        assert!(miss.target_id.is_none());

        assert_eq!(db.external_links(&source).unwrap().len(), 1);
    }
}
