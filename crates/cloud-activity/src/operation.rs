//! Wire model for tracked operations
//!
//! Both status endpoints answer with the same envelope:
//!
//! ```json
//! {
//!   "id": "op-1",
//!   "state": { "pending": {}, "completed": { "result": "vm-42" } },
//!   "concernedItems": [ { "id": "vm-42", "type": "virtual_machine" } ]
//! }
//! ```
//!
//! `state` is a history keyed by phase name. Key order is the order the
//! backend entered the phases, so `PhaseMap` keeps entries as a list.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The two families of tracked operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Generic infrastructure activity (VM create/delete/power/clone, disk resize...)
    Activity,
    /// Backup job run
    BackupJob,
}

impl OperationKind {
    /// Name used in user-facing error messages.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Activity => "activity",
            OperationKind::BackupJob => "backup job",
        }
    }

    /// Label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            OperationKind::Activity => "activity",
            OperationKind::BackupJob => "backup_job",
        }
    }

    /// Status endpoint path, relative to the API root.
    pub fn status_path(&self, id: &str) -> String {
        match self {
            OperationKind::Activity => format!("/activity/v1/activities/{id}"),
            OperationKind::BackupJob => format!("/backup/v1/jobs/{id}"),
        }
    }
}

/// Payload of one phase.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PhaseRecord {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, alias = "reason")]
    pub error: Option<Value>,
}

impl PhaseRecord {
    pub fn with_result(result: impl Into<Value>) -> Self {
        Self {
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn with_error(error: impl Into<Value>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }

    /// Error detail as text: strings verbatim, anything else as JSON.
    pub fn error_detail(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "no error detail provided".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Phase history in the order the backend entered each phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseMap(Vec<(String, PhaseRecord)>);

impl PhaseMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PhaseRecord)> {
        self.0.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn get(&self, phase: &str) -> Option<&PhaseRecord> {
        self.0
            .iter()
            .find(|(name, _)| name == phase)
            .map(|(_, record)| record)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<(S, PhaseRecord)> for PhaseMap {
    fn from_iter<I: IntoIterator<Item = (S, PhaseRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

struct PhaseMapVisitor;

impl<'de> Visitor<'de> for PhaseMapVisitor {
    type Value = PhaseMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by phase name")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<PhaseMap, E> {
        Ok(PhaseMap::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PhaseMap, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, record)) = access.next_entry::<String, Option<PhaseRecord>>()? {
            entries.push((name, record.unwrap_or_default()));
        }
        Ok(PhaseMap(entries))
    }
}

impl<'de> Deserialize<'de> for PhaseMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PhaseMapVisitor)
    }
}

/// A resource touched by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConcernedItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
}

/// How a successful operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Backup job that had nothing to do
    Skipped,
}

/// A tracked asynchronous operation as last observed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: PhaseMap,
    #[serde(default)]
    pub concerned_items: Vec<ConcernedItem>,
    /// Set by the tracker once a terminal success phase is observed.
    #[serde(skip)]
    pub outcome: Option<Outcome>,
}

impl Operation {
    /// The `result` payload of the phase that completed the operation.
    pub fn result(&self, phase: &str) -> Option<&Value> {
        self.state.get(phase).and_then(|r| r.result.as_ref())
    }

    /// First concerned item of the given type.
    pub fn concerned_item(&self, item_type: &str) -> Option<&ConcernedItem> {
        self.concerned_items
            .iter()
            .find(|item| item.item_type == item_type)
    }

    /// Surface a success result as a concerned item when the backend has not
    /// listed any. Accepts a bare id string or an `{id, type}` object.
    pub(crate) fn capture_result(&mut self, record: &PhaseRecord) {
        if !self.concerned_items.is_empty() {
            return;
        }
        let item = match &record.result {
            Some(Value::String(id)) if !id.is_empty() => Some(ConcernedItem {
                id: id.clone(),
                item_type: String::new(),
            }),
            Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(|id| {
                ConcernedItem {
                    id: id.to_string(),
                    item_type: obj
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }
            }),
            _ => None,
        };
        self.concerned_items.extend(item);
    }
}
