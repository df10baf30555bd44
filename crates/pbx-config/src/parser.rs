//! Line-oriented parser for the section configuration format

use std::path::PathBuf;

use pbx_fs::NormalizedPath;

use crate::document::{ConfigDocument, SourceSnapshot};
use crate::section::{ConfigSection, Line, unescape_value};
use crate::{Error, Result};

/// Parse configuration text that did not come from a file.
///
/// The resulting document is detached: writing it never reports a
/// conflict.
pub fn parse(source: &str) -> Result<ConfigDocument> {
    parse_at(source, None, SourceSnapshot::Detached)
}

pub(crate) fn parse_at(
    source: &str,
    path: Option<&NormalizedPath>,
    snapshot: SourceSnapshot,
) -> Result<ConfigDocument> {
    let mut doc = ConfigDocument::empty();
    doc.snapshot = snapshot;
    doc.path = path.cloned();

    if source.is_empty() {
        return Ok(doc);
    }

    let mut raw_lines: Vec<&str> = source.split('\n').collect();
    doc.trailing_newline = source.ends_with('\n');
    if doc.trailing_newline {
        raw_lines.pop();
    }
    doc.crlf = raw_lines.first().is_some_and(|l| l.ends_with('\r'));

    for (index, raw) in raw_lines.into_iter().enumerate() {
        let trimmed = raw.trim();

        if trimmed.starts_with('[') {
            let (name, template) = parse_header(trimmed).map_err(|message| Error::Parse {
                path: path
                    .map(NormalizedPath::to_native)
                    .unwrap_or_else(|| PathBuf::from("<input>")),
                line: index + 1,
                message,
            })?;
            doc.sections.push(ConfigSection {
                name,
                template,
                header: raw.to_string(),
                lines: Vec::new(),
            });
            continue;
        }

        let line = classify(raw);
        match doc.sections.last_mut() {
            Some(section) => section.lines.push(line),
            None => doc.preamble.push(line),
        }
    }

    Ok(doc)
}

/// Split `[name](template) ; comment` into its parts.
fn parse_header(trimmed: &str) -> std::result::Result<(String, Option<String>), String> {
    let close = trimmed
        .find(']')
        .ok_or_else(|| "section header is missing ']'".to_string())?;

    let name = trimmed[1..close].trim();
    if name.is_empty() {
        return Err("section name is empty".to_string());
    }
    if name.contains('[') {
        return Err(format!("invalid section name '{}'", name));
    }

    let rest = strip_inline_comment(&trimmed[close + 1..]).trim();
    let template = if rest.is_empty() {
        None
    } else if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner.trim().to_string())
    } else {
        return Err(format!("unexpected text after section header: '{}'", rest));
    };

    Ok((name.to_string(), template))
}

fn classify(raw: &str) -> Line {
    let trimmed = raw.trim();
    let owned = raw.to_string();

    if trimmed.is_empty() {
        return Line::Blank { raw: owned };
    }
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return Line::Comment { raw: owned };
    }

    let Some((key, value)) = trimmed.split_once('=') else {
        return Line::Other { raw: owned };
    };
    let key = key.trim();
    if key.is_empty() {
        return Line::Other { raw: owned };
    }

    // `key => value` is an accepted spelling of `key = value`
    let value = value.strip_prefix('>').unwrap_or(value);
    Line::Entry {
        key: key.to_string(),
        value: unescape_value(strip_inline_comment(value).trim()),
        raw: owned,
    }
}

/// Cut at the first `;` not escaped as `\;`.
fn strip_inline_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b';' && (i == 0 || bytes[i - 1] != b'\\') {
            return &text[..i];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_template_and_comment() {
        assert_eq!(
            parse_header("[1001](office-phone) ; desk"),
            Ok(("1001".to_string(), Some("office-phone".to_string())))
        );
        assert_eq!(parse_header("[ general ]"), Ok(("general".to_string(), None)));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(parse_header("[1001").is_err());
        assert!(parse_header("[]").is_err());
        assert!(parse_header("[1001] junk").is_err());
    }

    #[test]
    fn classify_entry_spellings() {
        assert!(matches!(
            classify("context => from-internal"),
            Line::Entry { ref key, ref value, .. } if key == "context" && value == "from-internal"
        ));
        assert!(matches!(
            classify("  allow = ulaw ; preferred"),
            Line::Entry { ref value, .. } if value == "ulaw"
        ));
        assert!(matches!(
            classify("password=a\\;b"),
            Line::Entry { ref value, .. } if value == "a;b"
        ));
        assert!(matches!(classify("   "), Line::Blank { .. }));
        assert!(matches!(classify("#include extra.conf"), Line::Comment { .. }));
        assert!(matches!(classify("garbage"), Line::Other { .. }));
    }
}
