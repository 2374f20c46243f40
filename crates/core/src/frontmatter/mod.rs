//! Frontmatter codec.
//!
//! Parses `---`-delimited YAML blocks off the top of markdown documents and
//! renders them back. The codec understands two parallel name-spaces for the
//! managed fields (`id`/`flint_id`, `type`/`flint_type`, ...): reads
//! back-fill whichever side is missing, writes collapse to one canonical
//! side. Malformed YAML never aborts an operation; it degrades to an empty
//! mapping with a warning.

pub mod parser;
pub mod serializer;
pub mod types;

pub use parser::parse;
pub use serializer::{render_note, timestamp_value};
pub use types::{ALIAS_PAIRS, Frontmatter, NameStyle, ParsedNote};
