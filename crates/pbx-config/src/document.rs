//! In-memory configuration document
//!
//! A [`ConfigDocument`] is a value: edits take `self` and return the edited
//! document. Nothing touches disk until [`crate::ConfigStore::write`].

use pbx_fs::NormalizedPath;
use serde::Serialize;

use crate::section::{ConfigSection, Line};

/// What the file looked like when the document was loaded.
///
/// Used to detect that someone else changed the file before we write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "hash", rename_all = "snake_case")]
pub enum SourceSnapshot {
    /// Not loaded from disk
    Detached,
    /// The file did not exist
    Missing,
    /// `sha256:` checksum of the loaded bytes
    Content(String),
}

impl SourceSnapshot {
    /// Human-readable form used in conflict errors.
    pub fn describe(&self) -> String {
        match self {
            SourceSnapshot::Detached => "detached".to_string(),
            SourceSnapshot::Missing => "absent".to_string(),
            SourceSnapshot::Content(hash) => hash.clone(),
        }
    }
}

/// Ordered sections plus everything between them, kept byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    pub(crate) path: Option<NormalizedPath>,
    pub(crate) preamble: Vec<Line>,
    pub(crate) sections: Vec<ConfigSection>,
    pub(crate) trailing_newline: bool,
    pub(crate) crlf: bool,
    pub(crate) snapshot: SourceSnapshot,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConfigDocument {
    pub fn empty() -> Self {
        Self {
            path: None,
            preamble: Vec::new(),
            sections: Vec::new(),
            trailing_newline: true,
            crlf: false,
            snapshot: SourceSnapshot::Detached,
        }
    }

    pub fn sections(&self) -> &[ConfigSection] {
        &self.sections
    }

    /// Lines before the first section header.
    pub fn preamble(&self) -> &[Line] {
        &self.preamble
    }

    /// File the document was loaded from.
    pub fn path(&self) -> Option<&NormalizedPath> {
        self.path.as_ref()
    }

    pub fn snapshot(&self) -> &SourceSnapshot {
        &self.snapshot
    }

    pub fn is_empty(&self) -> bool {
        self.preamble.is_empty() && self.sections.is_empty()
    }

    /// The section named `name` with `type=section_type`.
    pub fn find(&self, section_type: &str, name: &str) -> Option<&ConfigSection> {
        self.sections.iter().find(|s| s.is(section_type, name))
    }

    /// Every section called `name`, whatever its type.
    pub fn sections_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigSection> + 'a {
        self.sections.iter().filter(move |s| s.name == name)
    }

    /// Every section whose `type=` equals `section_type`.
    pub fn sections_of_type<'a>(&'a self, section_type: &'a str) -> impl Iterator<Item = &'a ConfigSection> + 'a {
        self.sections.iter().filter(move |s| {
            s.section_type()
                .is_some_and(|t| t.eq_ignore_ascii_case(section_type))
        })
    }

    /// Replace or append the `(section_type, name)` section.
    ///
    /// An existing section keeps its position, its header line and the
    /// blank/comment lines that trail it; only its body is re-rendered.
    /// Duplicates of the same identity are dropped. A new section is
    /// appended after a blank separator line.
    pub fn upsert_section<K, V>(
        mut self,
        section_type: &str,
        name: &str,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let replacement = ConfigSection::rendered(section_type, name, attributes, self.crlf);

        let Some(first) = self.sections.iter().position(|s| s.is(section_type, name)) else {
            self.push_separator();
            self.sections.push(replacement);
            self.trailing_newline = true;
            return self;
        };

        let existing = &mut self.sections[first];
        let trailer = existing.lines.split_off(existing.trailer_start());
        existing.lines = replacement.lines;
        existing.lines.extend(trailer);

        // Anything after the first match with the same identity is a duplicate
        let mut index = first + 1;
        while index < self.sections.len() {
            if self.sections[index].is(section_type, name) {
                self.remove_at(index);
            } else {
                index += 1;
            }
        }
        self
    }

    /// Remove the `(section_type, name)` section. No-op if absent.
    pub fn remove_section(mut self, section_type: &str, name: &str) -> Self {
        let mut index = 0;
        while index < self.sections.len() {
            if self.sections[index].is(section_type, name) {
                self.remove_at(index);
            } else {
                index += 1;
            }
        }
        self
    }

    /// Serialize back to text.
    ///
    /// A parsed document that was not edited renders to exactly its source.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = self.preamble.iter().map(|l| l.raw().to_string()).collect();
        for section in &self.sections {
            section.render_into(&mut out);
        }

        if out.is_empty() {
            return String::new();
        }
        let mut text = out.join("\n");
        if self.trailing_newline {
            text.push('\n');
        }
        text
    }

    fn remove_at(&mut self, index: usize) {
        let was_last = index + 1 == self.sections.len();
        let removed = self.sections.remove(index);
        let trailer = &removed.lines[removed.trailer_start()..];

        let previous = match index.checked_sub(1) {
            Some(i) => &mut self.sections[i].lines,
            None => &mut self.preamble,
        };

        if trailer.iter().any(Line::is_comment) {
            // Comments after a section usually introduce the next one
            previous.extend(trailer.iter().cloned());
        } else if was_last {
            while previous.last().is_some_and(Line::is_blank) {
                previous.pop();
            }
        }
    }

    fn push_separator(&mut self) {
        let crlf = self.crlf;
        match self.sections.last_mut() {
            Some(section) => {
                if section.lines.last().is_none_or(|l| !l.is_blank()) {
                    section.lines.push(Line::blank(crlf));
                }
            }
            None => {
                if self.preamble.last().is_some_and(|l| !l.is_blank()) {
                    self.preamble.push(Line::blank(crlf));
                }
            }
        }
    }
}
