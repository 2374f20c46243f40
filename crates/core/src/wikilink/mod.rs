//! Wikilink extraction, classification, and resolution.
//!
//! Grammar: `[[TARGET]]` or `[[TARGET|DISPLAY]]`. Targets are classified in
//! order: note-ID shape, then `type/filename` (exactly one slash), then
//! title. External URLs come from standard markdown `[text](url)` syntax.

pub mod extractor;
pub mod resolver;

pub use extractor::{
    LinkTarget, UrlLink, WikiLink, classify_target, extract_url_links, extract_wikilinks,
};
pub use resolver::LinkResolver;
