//! Translation between records, endpoint configuration sections and live state
//!
//! One extension is configured as up to three sections sharing its id as
//! their name: `type=endpoint`, `type=auth` (only with a secret) and
//! `type=aor`. A disabled extension keeps its sections but its aor accepts
//! no contacts, so it cannot register.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use pbx_config::{ConfigDocument, ConfigSection};
use regex::Regex;

use crate::model::{EntityRecord, Field, LiveEntityState, Registration};
use crate::{Error, Result};

pub const ENDPOINT: &str = "endpoint";
pub const AUTH: &str = "auth";
pub const AOR: &str = "aor";

/// Reject ids that would break the section syntax of the endpoints file.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '[' | ']' | '(' | ')' | ';' | '#' | '=' | '"'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidId { id: id.to_string() })
    }
}

/// Reject field values that would not read back as written.
///
/// `;` is escaped when rendered, so it is allowed. Control characters
/// would split the line, surrounding whitespace is trimmed on read, a `"`
/// ends the quoted callerid name and codecs are joined with `,`.
pub fn validate_record(record: &EntityRecord) -> Result<()> {
    validate_id(&record.id)?;

    let invalid = |field: Field, reason: &str| Error::InvalidValue {
        id: record.id.clone(),
        field,
        reason: reason.to_string(),
    };

    let mut values = vec![
        (Field::Name, record.name.as_str()),
        (Field::Context, record.context.as_str()),
        (Field::Transport, record.transport.as_str()),
    ];
    if let Some(secret) = &record.secret {
        values.push((Field::Secret, secret.as_str()));
    }
    values.extend(record.codecs.iter().map(|c| (Field::Codecs, c.as_str())));

    for (field, value) in values {
        if value.chars().any(char::is_control) {
            return Err(invalid(field, "contains a control character"));
        }
        if value.trim() != value {
            return Err(invalid(field, "has leading or trailing whitespace"));
        }
    }

    if record.name.contains('"') {
        return Err(invalid(Field::Name, "contains '\"'"));
    }
    if record
        .codecs
        .iter()
        .any(|c| c.is_empty() || c.contains(',') || c.contains(char::is_whitespace))
    {
        return Err(invalid(Field::Codecs, "codec names must be single non-empty words"));
    }
    Ok(())
}

/// Attributes of the `type=endpoint` section for `record`, in render order.
pub fn endpoint_attributes(record: &EntityRecord) -> Vec<(&'static str, String)> {
    let mut attrs = Vec::new();
    if !record.context.is_empty() {
        attrs.push(("context", record.context.clone()));
    }
    attrs.push(("disallow", "all".to_string()));
    if !record.codecs.is_empty() {
        attrs.push(("allow", record.codecs.join(",")));
    }
    if !record.transport.is_empty() {
        attrs.push(("transport", record.transport.clone()));
    }
    if record.has_secret() {
        attrs.push(("auth", record.id.clone()));
    }
    attrs.push(("aors", record.id.clone()));
    if !record.name.is_empty() {
        attrs.push(("callerid", format!("\"{}\" <{}>", record.name, record.id)));
    }
    attrs
}

/// Attributes of the `type=auth` section, or `None` without a secret.
pub fn auth_attributes(record: &EntityRecord) -> Option<Vec<(&'static str, String)>> {
    let secret = record.secret.as_ref().filter(|s| !s.is_empty())?;
    Some(vec![
        ("auth_type", "userpass".to_string()),
        ("username", record.id.clone()),
        ("password", secret.clone()),
    ])
}

/// Attributes of the `type=aor` section.
pub fn aor_attributes(record: &EntityRecord) -> Vec<(&'static str, String)> {
    let max_contacts = if record.enabled { "1" } else { "0" };
    vec![
        ("max_contacts", max_contacts.to_string()),
        ("remove_existing", "yes".to_string()),
    ]
}

/// Write `record`'s sections into `doc`, leaving every other section alone.
pub fn apply_record(doc: ConfigDocument, record: &EntityRecord) -> ConfigDocument {
    let id = record.id.as_str();
    let doc = doc.upsert_section(ENDPOINT, id, endpoint_attributes(record));
    let doc = match auth_attributes(record) {
        Some(attrs) => doc.upsert_section(AUTH, id, attrs),
        None => doc.remove_section(AUTH, id),
    };
    doc.upsert_section(AOR, id, aor_attributes(record))
}

/// The record that results from copying `live` onto `existing`.
///
/// The engine never reveals secrets: an existing secret is kept while the
/// endpoint still has one, and dropped when it has none.
pub fn record_from_live(live: &LiveEntityState, existing: Option<&EntityRecord>) -> EntityRecord {
    let secret = if live.has_secret {
        existing.and_then(|r| r.secret.clone())
    } else {
        None
    };

    EntityRecord {
        id: live.id.clone(),
        name: live.name.clone().unwrap_or_default(),
        secret,
        codecs: live.codecs.clone(),
        context: live.context.clone(),
        transport: live.transport.clone(),
        enabled: live.enabled,
    }
}

/// One line per field that copying onto `existing` would change.
///
/// Secrets are reported by presence only.
pub fn describe_changes(existing: Option<&EntityRecord>, updated: &EntityRecord) -> String {
    let Some(old) = existing else {
        return format!("create record {}", updated.id);
    };

    let presence = |r: &EntityRecord| if r.has_secret() { "set" } else { "unset" };
    let fields = [
        ("name", old.name.clone(), updated.name.clone()),
        ("secret", presence(old).to_string(), presence(updated).to_string()),
        ("codecs", old.codecs.join(","), updated.codecs.join(",")),
        ("context", old.context.clone(), updated.context.clone()),
        ("transport", old.transport.clone(), updated.transport.clone()),
        ("enabled", old.enabled.to_string(), updated.enabled.to_string()),
    ];

    fields
        .into_iter()
        .filter(|(_, before, after)| before != after)
        .map(|(field, before, after)| format!("{}: '{}' -> '{}'", field, before, after))
        .collect::<Vec<_>>()
        .join("\n")
}

static CALLERID_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^"([^"]*)""#).expect("valid regex"));

/// Live state implied by the endpoint sections of a configuration file.
///
/// This is what the engine would run after loading `doc`; registration
/// details are unknown.
pub fn live_from_document(doc: &ConfigDocument) -> BTreeMap<String, LiveEntityState> {
    doc.sections_of_type(ENDPOINT)
        .map(|endpoint| {
            let id = endpoint.name();
            let state = live_from_sections(endpoint, doc.find(AUTH, id), doc.find(AOR, id));
            (id.to_string(), state)
        })
        .collect()
}

fn live_from_sections(
    endpoint: &ConfigSection,
    auth: Option<&ConfigSection>,
    aor: Option<&ConfigSection>,
) -> LiveEntityState {
    let codecs = endpoint
        .get_all("allow")
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    let referenced_auth = endpoint.get("auth").is_some_and(|a| !a.is_empty());
    let max_contacts = aor
        .and_then(|s| s.get("max_contacts"))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    LiveEntityState {
        id: endpoint.name().to_string(),
        name: endpoint
            .get("callerid")
            .and_then(|c| CALLERID_NAME.captures(c))
            .map(|c| c[1].to_string())
            .filter(|n| !n.is_empty()),
        has_secret: referenced_auth && auth.is_some(),
        codecs,
        context: endpoint.get("context").unwrap_or_default().to_string(),
        transport: endpoint.get("transport").unwrap_or_default().to_string(),
        enabled: max_contacts > 0,
        registration: Registration::Unknown,
        contact: None,
        negotiated_codec: None,
    }
}
