//! Classification of records against live state
//!
//! Pure and deterministic: the same inputs always produce the same report,
//! ordered by id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{EntityRecord, Field, FieldDiff, LiveEntityState, SyncStatus};

/// How many ids fell into each class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub matched: usize,
    pub record_only: usize,
    pub live_only: usize,
    pub mismatched: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.matched + self.record_only + self.live_only + self.mismatched
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Exactly one entry per id present on either side
    pub statuses: BTreeMap<String, SyncStatus>,
    pub counts: StatusCounts,
}

impl ReconcileReport {
    /// True when every id is matched
    pub fn is_in_sync(&self) -> bool {
        self.counts.matched == self.statuses.len()
    }

    /// Ids that applying records to the engine would change
    pub fn record_to_live_candidates(&self) -> Vec<String> {
        self.ids_where(|s| matches!(s, SyncStatus::RecordOnly | SyncStatus::Mismatched { .. }))
    }

    /// Ids that copying live state into records would change
    pub fn live_to_record_candidates(&self) -> Vec<String> {
        self.ids_where(|s| matches!(s, SyncStatus::LiveOnly | SyncStatus::Mismatched { .. }))
    }

    fn ids_where(&self, predicate: impl Fn(&SyncStatus) -> bool) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|(_, status)| predicate(status))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Compares intended records with live endpoints
pub struct Reconciler;

impl Reconciler {
    /// Classify every id in `records ∪ live`.
    pub fn reconcile(
        records: &BTreeMap<String, EntityRecord>,
        live: &BTreeMap<String, LiveEntityState>,
    ) -> ReconcileReport {
        let ids: BTreeSet<&String> = records.keys().chain(live.keys()).collect();
        let mut report = ReconcileReport::default();

        for id in ids {
            let status = match (records.get(id), live.get(id)) {
                (Some(_), None) => {
                    report.counts.record_only += 1;
                    SyncStatus::RecordOnly
                }
                (None, Some(_)) => {
                    report.counts.live_only += 1;
                    SyncStatus::LiveOnly
                }
                (Some(record), Some(state)) => {
                    let fields = Self::compare(record, state);
                    if fields.is_empty() {
                        report.counts.matched += 1;
                        SyncStatus::Matched
                    } else {
                        report.counts.mismatched += 1;
                        SyncStatus::Mismatched { fields }
                    }
                }
                (None, None) => continue,
            };
            report.statuses.insert(id.clone(), status);
        }

        tracing::debug!(
            matched = report.counts.matched,
            record_only = report.counts.record_only,
            live_only = report.counts.live_only,
            mismatched = report.counts.mismatched,
            "Reconciled"
        );
        report
    }

    /// Differing fields between one record and its live endpoint.
    ///
    /// Secrets compare by presence only; codecs as a case-insensitive set.
    pub fn compare(record: &EntityRecord, live: &LiveEntityState) -> BTreeMap<Field, FieldDiff> {
        let mut fields = BTreeMap::new();
        let mut check = |field: Field, record_value: String, live_value: String, equal: bool| {
            if !equal {
                fields.insert(
                    field,
                    FieldDiff {
                        record: record_value,
                        live: live_value,
                    },
                );
            }
        };

        let live_name = live.name.clone().unwrap_or_default();
        check(Field::Name, record.name.clone(), live_name.clone(), record.name == live_name);

        check(
            Field::Secret,
            presence(record.has_secret()),
            presence(live.has_secret),
            record.has_secret() == live.has_secret,
        );

        let record_codecs = codec_set(&record.codecs);
        let live_codecs = codec_set(&live.codecs);
        check(
            Field::Codecs,
            record.codecs.join(","),
            live.codecs.join(","),
            record_codecs == live_codecs,
        );

        check(
            Field::Context,
            record.context.clone(),
            live.context.clone(),
            record.context == live.context,
        );
        check(
            Field::Transport,
            record.transport.clone(),
            live.transport.clone(),
            record.transport == live.transport,
        );
        check(
            Field::Enabled,
            record.enabled.to_string(),
            live.enabled.to_string(),
            record.enabled == live.enabled,
        );

        fields
    }
}

fn presence(set: bool) -> String {
    if set { "set" } else { "unset" }.to_string()
}

fn codec_set(codecs: &[String]) -> BTreeSet<String> {
    codecs
        .iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
