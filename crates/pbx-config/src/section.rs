//! Lines and sections of a configuration document

use serde::Serialize;

/// One physical line of a configuration file, without its terminator.
///
/// Every variant keeps the raw text so unmodified lines render verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Line {
    /// Empty or whitespace-only
    Blank { raw: String },
    /// `;` or `#` comment, including `#include`-style directives
    Comment { raw: String },
    /// `key=value` or `key => value`
    Entry {
        key: String,
        value: String,
        raw: String,
    },
    /// Anything else; carried through untouched
    Other { raw: String },
}

impl Line {
    /// Raw text of the line.
    pub fn raw(&self) -> &str {
        match self {
            Line::Blank { raw } | Line::Comment { raw } | Line::Other { raw } => raw,
            Line::Entry { raw, .. } => raw,
        }
    }

    pub(crate) fn blank(crlf: bool) -> Self {
        Line::Blank {
            raw: terminate(String::new(), crlf),
        }
    }

    /// A freshly rendered `key=value` line. `;` in the value is written as
    /// `\;` so it is not read back as a comment.
    pub(crate) fn entry(key: &str, value: &str, crlf: bool) -> Self {
        Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: terminate(format!("{}={}", key, escape_value(value)), crlf),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Line::Blank { .. })
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Line::Comment { .. })
    }
}

pub(crate) fn escape_value(value: &str) -> String {
    value.replace(';', "\\;")
}

pub(crate) fn unescape_value(value: &str) -> String {
    value.replace("\\;", ";")
}

fn terminate(mut line: String, crlf: bool) -> String {
    if crlf {
        line.push('\r');
    }
    line
}

/// A `[name]` header followed by the lines up to the next header.
///
/// Several sections may share a name; they are told apart by their `type=`
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSection {
    pub(crate) name: String,
    pub(crate) template: Option<String>,
    pub(crate) header: String,
    pub(crate) lines: Vec<Line>,
}

impl ConfigSection {
    /// Build a section of the given type from ordered attributes.
    ///
    /// Renders as `[name]`, then `type=<section_type>`, then one
    /// `key=value` line per attribute in the order given.
    pub fn new<K, V>(section_type: &str, name: &str, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::rendered(section_type, name, attributes, false)
    }

    pub(crate) fn rendered<K, V>(
        section_type: &str,
        name: &str,
        attributes: impl IntoIterator<Item = (K, V)>,
        crlf: bool,
    ) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut lines = vec![Line::entry("type", section_type, crlf)];
        lines.extend(
            attributes
                .into_iter()
                .map(|(k, v)| Line::entry(k.as_ref(), v.as_ref(), crlf)),
        );

        Self {
            name: name.to_string(),
            template: None,
            header: terminate(format!("[{}]", name), crlf),
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template list from a `[name](template)` header.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Value of the first `type=` entry, if any.
    pub fn section_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Value of the first entry named `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
    }

    /// Values of every entry named `key`, in file order.
    ///
    /// Keys such as `allow` may legitimately repeat.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// All `(key, value)` entries in file order, including `type`.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
    }

    /// Entries other than `type`, in file order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.entries()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("type"))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// True if this section is `name` with `type=section_type`.
    pub fn is(&self, section_type: &str, name: &str) -> bool {
        self.name == name
            && self
                .section_type()
                .is_some_and(|t| t.eq_ignore_ascii_case(section_type))
    }

    /// Index where the trailing run of blank and comment lines begins.
    ///
    /// Those lines separate this section from the next and survive when the
    /// section body is replaced.
    pub(crate) fn trailer_start(&self) -> usize {
        self.lines
            .iter()
            .rposition(|line| !(line.is_blank() || line.is_comment()))
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub(crate) fn render_into(&self, out: &mut Vec<String>) {
        out.push(self.header.clone());
        out.extend(self.lines.iter().map(|line| line.raw().to_string()));
    }
}
