//! Domain model: intended records, observed live state and their comparison

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An extension as the admin panel intends it to be.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Extension number, unique
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Allowed codecs in preference order
    #[serde(default)]
    pub codecs: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub transport: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            secret: None,
            codecs: Vec::new(),
            context: String::new(),
            transport: String::new(),
            enabled: true,
        }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// Secrets stay out of logs
impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("codecs", &self.codecs)
            .field("context", &self.context)
            .field("transport", &self.transport)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Registration state reported by the engine. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    Registered,
    Unregistered,
    #[default]
    Unknown,
}

/// An endpoint as the engine currently runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntityState {
    pub id: String,
    pub name: Option<String>,
    /// The engine never reveals secrets, only whether one is configured
    pub has_secret: bool,
    pub codecs: Vec<String>,
    pub context: String,
    pub transport: String,
    pub enabled: bool,
    #[serde(default)]
    pub registration: Registration,
    /// `ip:port` of the registered contact
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub negotiated_codec: Option<String>,
}

impl LiveEntityState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            has_secret: false,
            codecs: Vec::new(),
            context: String::new(),
            transport: String::new(),
            enabled: false,
            registration: Registration::Unknown,
            contact: None,
            negotiated_codec: None,
        }
    }
}

/// Fields compared between a record and its live counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Secret,
    Codecs,
    Context,
    Transport,
    Enabled,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Name,
        Field::Secret,
        Field::Codecs,
        Field::Context,
        Field::Transport,
        Field::Enabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Secret => "secret",
            Field::Codecs => "codecs",
            Field::Context => "context",
            Field::Transport => "transport",
            Field::Enabled => "enabled",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two sides of one differing field, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub record: String,
    pub live: String,
}

/// Classification of one id after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Matched,
    RecordOnly,
    LiveOnly,
    Mismatched { fields: BTreeMap<Field, FieldDiff> },
}

impl SyncStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Matched => "matched",
            SyncStatus::RecordOnly => "record-only",
            SyncStatus::LiveOnly => "live-only",
            SyncStatus::Mismatched { .. } => "mismatched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let mut record = EntityRecord::new("1001", "Alice");
        record.secret = Some("hunter2".to_string());

        let debug = format!("{:?}", record);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn record_toml_defaults() {
        let record: EntityRecord = toml::from_str("id = \"1001\"\nname = \"Alice\"\n").unwrap();

        assert!(record.enabled);
        assert!(record.codecs.is_empty());
        assert!(!record.has_secret());
    }

    #[test]
    fn sync_status_serializes_tagged() {
        let mut fields = BTreeMap::new();
        fields.insert(
            Field::Context,
            FieldDiff {
                record: "internal".to_string(),
                live: "external".to_string(),
            },
        );
        let json = serde_json::to_value(SyncStatus::Mismatched { fields }).unwrap();

        assert_eq!(json["status"], "mismatched");
        assert_eq!(json["fields"]["context"]["live"], "external");
        assert_eq!(serde_json::to_value(SyncStatus::RecordOnly).unwrap()["status"], "record_only");
    }
}
