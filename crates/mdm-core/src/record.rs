//! Records, local (source-owned) and master (synthetic identity), and the
//! synthesized golden view of a master.
//!
//! Field values are free-form JSON keyed by field name, so the same record
//! type serves every resource kind (patients, organisations, places, ...).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::edge::RelationshipEdge;

/// Field name → value. Ordered so that serialised output is deterministic.
pub type Fields = BTreeMap<String, Value>;

/// Whether a value counts as "no value" for merge purposes: `null`, blank
/// strings, and empty arrays or objects.
pub fn is_empty_value(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.trim().is_empty(),
    Value::Array(a) => a.is_empty(),
    Value::Object(o) => o.is_empty(),
    Value::Bool(_) | Value::Number(_) => false,
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// Whether a record is owned by a source system or is a synthetic master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordClass {
  Local,
  Master,
}

/// A stored record. Masters carry only shell attributes; their golden view
/// is computed on read into a [`SynthesizedRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub key:           Uuid,
  pub class:         RecordClass,
  /// The kind of resource, e.g. `"patient"`.
  pub resource_type: String,
  /// The contributing source system. `None` for masters.
  pub source:        Option<String>,
  pub modified_at:   DateTime<Utc>,
  pub fields:        Fields,
}

impl Record {
  /// A new local record owned by `source`, with no fields.
  pub fn local(resource_type: impl Into<String>, source: impl Into<String>) -> Self {
    Self {
      key:           Uuid::new_v4(),
      class:         RecordClass::Local,
      resource_type: resource_type.into(),
      source:        Some(source.into()),
      modified_at:   Utc::now(),
      fields:        Fields::new(),
    }
  }

  /// A new master shell with no fields.
  pub fn master(resource_type: impl Into<String>) -> Self {
    Self {
      key:           Uuid::new_v4(),
      class:         RecordClass::Master,
      resource_type: resource_type.into(),
      source:        None,
      modified_at:   Utc::now(),
      fields:        Fields::new(),
    }
  }

  pub fn with_key(mut self, key: Uuid) -> Self {
    self.key = key;
    self
  }

  pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.insert(name.into(), value.into());
    self
  }

  pub fn modified(mut self, at: DateTime<Utc>) -> Self {
    self.modified_at = at;
    self
  }

  pub fn is_master(&self) -> bool { self.class == RecordClass::Master }

  /// The value of `name`, or `None` if it is absent or empty.
  pub fn field(&self, name: &str) -> Option<&Value> {
    self.fields.get(name).filter(|v| !is_empty_value(v))
  }
}

// ─── Record shape ────────────────────────────────────────────────────────────

/// The capabilities field-level merging needs from a record.
pub trait RecordShape {
  fn key(&self) -> Uuid;
  fn modified_at(&self) -> DateTime<Utc>;
  fn fields(&self) -> &Fields;
}

impl RecordShape for Record {
  fn key(&self) -> Uuid { self.key }

  fn modified_at(&self) -> DateTime<Utc> { self.modified_at }

  fn fields(&self) -> &Fields { &self.fields }
}

// ─── Synthesized view ────────────────────────────────────────────────────────

/// The golden record of a master. Never stored; derived from the
/// current relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedRecord {
  pub key:             Uuid,
  pub resource_type:   String,
  /// Always `true`; marks the view as a master-level identity.
  pub is_master:       bool,
  /// Always `true`; marks the view as computed rather than stored.
  pub generated:       bool,
  /// The record-of-truth local whose values seeded the view, if any.
  pub record_of_truth: Option<Uuid>,
  /// Keys of the visible locals that contributed, in ascending order.
  pub contributors:    Vec<Uuid>,
  /// Set when no local of this master was visible and the view was built
  /// from a predecessor master reached through lineage.
  pub lineage_source:  Option<Uuid>,
  /// Taken in priority order: the record of truth's time if one is set,
  /// else the newest visible local, else the master shell. A lower-priority
  /// source never overrides a higher one, even when it is newer.
  pub modified_at:     DateTime<Utc>,
  pub synthesized_at:  DateTime<Utc>,
  pub fields:          Fields,
  /// Relationships redirected onto the master, plus any held by it directly.
  pub relationships:   Vec<RelationshipEdge>,
}

impl SynthesizedRecord {
  pub fn uses_record_of_truth(&self) -> bool { self.record_of_truth.is_some() }

  pub fn field(&self, name: &str) -> Option<&Value> {
    self.fields.get(name).filter(|v| !is_empty_value(v))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn blank_values_are_empty() {
    assert!(is_empty_value(&json!(null)));
    assert!(is_empty_value(&json!("  ")));
    assert!(is_empty_value(&json!([])));
    assert!(is_empty_value(&json!({})));
    assert!(!is_empty_value(&json!(0)));
    assert!(!is_empty_value(&json!(false)));
    assert!(!is_empty_value(&json!("Jon")));
  }

  #[test]
  fn field_hides_empty_values() {
    let record = Record::local("patient", "clinic")
      .with_field("name", "Jon")
      .with_field("phone", "");
    assert_eq!(record.field("name"), Some(&json!("Jon")));
    assert_eq!(record.field("phone"), None);
    assert_eq!(record.field("email"), None);
  }
}
