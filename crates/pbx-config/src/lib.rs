//! Section-based configuration documents for pbx-sync
//!
//! Parses and serializes the engine's INI-like configuration format
//! (`[section]` headers, `key=value` lines, `;`/`#` comments) while keeping
//! every section that is not modified byte-for-byte identical.
//!
//! The [`ConfigStore`] owns the read-modify-write cycle: every write is
//! preceded by a deduplicated backup and committed atomically.

pub mod document;
pub mod error;
pub mod parser;
pub mod section;
pub mod store;

pub use document::{ConfigDocument, SourceSnapshot};
pub use error::{Error, Result};
pub use parser::parse;
pub use section::{ConfigSection, Line};
pub use store::{ConfigStore, WriteOutcome};
