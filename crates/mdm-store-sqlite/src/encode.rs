//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-precision RFC 3339 strings so that they
//! sort lexically. Field maps are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use mdm_core::{
  edge::{Classification, EdgeType, RelationshipEdge},
  record::{Fields, Record, RecordClass},
};
use uuid::Uuid;

use crate::{Error, Result};

/// Prefix distinguishing external edge types from the bookkeeping ones.
const EXTERNAL_PREFIX: &str = "x:";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── RecordClass ──────────────────────────────────────────────────────────────

pub fn encode_class(c: RecordClass) -> &'static str {
  match c {
    RecordClass::Local => "local",
    RecordClass::Master => "master",
  }
}

pub fn decode_class(s: &str) -> Result<RecordClass> {
  match s {
    "local" => Ok(RecordClass::Local),
    "master" => Ok(RecordClass::Master),
    other => Err(Error::UnknownValue { column: "class", value: other.to_owned() }),
  }
}

// ─── EdgeType ─────────────────────────────────────────────────────────────────

pub fn encode_edge_type(t: &EdgeType) -> String {
  match t {
    EdgeType::External(name) => format!("{EXTERNAL_PREFIX}{name}"),
    other => other.to_string(),
  }
}

pub fn decode_edge_type(s: &str) -> Result<EdgeType> {
  if let Some(name) = s.strip_prefix(EXTERNAL_PREFIX) {
    return Ok(EdgeType::External(name.to_owned()));
  }
  match s {
    "master_link" => Ok(EdgeType::MasterLink),
    "candidate" => Ok(EdgeType::Candidate),
    "ignored" => Ok(EdgeType::Ignored),
    "record_of_truth" => Ok(EdgeType::RecordOfTruth),
    "replaces" => Ok(EdgeType::Replaces),
    "original_master" => Ok(EdgeType::OriginalMaster),
    other => Err(Error::UnknownValue { column: "edge_type", value: other.to_owned() }),
  }
}

// ─── Classification ───────────────────────────────────────────────────────────

pub fn encode_classification(c: Classification) -> &'static str {
  match c {
    Classification::Automatic => "automatic",
    Classification::System => "system",
    Classification::Verified => "verified",
  }
}

pub fn decode_classification(s: &str) -> Result<Classification> {
  match s {
    "automatic" => Ok(Classification::Automatic),
    "system" => Ok(Classification::System),
    "verified" => Ok(Classification::Verified),
    other => Err(Error::UnknownValue {
      column: "classification",
      value:  other.to_owned(),
    }),
  }
}

// ─── Fields ───────────────────────────────────────────────────────────────────

pub fn encode_fields(fields: &Fields) -> Result<String> { Ok(serde_json::to_string(fields)?) }

pub fn decode_fields(s: &str) -> Result<Fields> { Ok(serde_json::from_str(s)?) }

// ─── Raw rows ─────────────────────────────────────────────────────────────────

/// A `records` row as read from SQLite, before decoding.
pub struct RawRecord {
  pub record_key:    String,
  pub class:         String,
  pub resource_type: String,
  pub source:        Option<String>,
  pub modified_at:   String,
  pub fields:        String,
}

impl RawRecord {
  pub const COLUMNS: &'static str =
    "record_key, class, resource_type, source, modified_at, fields";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_key:    row.get(0)?,
      class:         row.get(1)?,
      resource_type: row.get(2)?,
      source:        row.get(3)?,
      modified_at:   row.get(4)?,
      fields:        row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      key:           decode_uuid(&self.record_key)?,
      class:         decode_class(&self.class)?,
      resource_type: self.resource_type,
      source:        self.source,
      modified_at:   decode_dt(&self.modified_at)?,
      fields:        decode_fields(&self.fields)?,
    })
  }
}

/// An `edges` row as read from SQLite, before decoding.
pub struct RawEdge {
  pub edge_id:         String,
  pub source_key:      String,
  pub target_key:      String,
  pub edge_type:       String,
  pub role:            Option<String>,
  pub classification:  String,
  pub score:           Option<f64>,
  pub original_source: Option<String>,
  pub original_target: Option<String>,
  pub created_at:      String,
  pub obsoleted_at:    Option<String>,
}

impl RawEdge {
  pub const COLUMNS: &'static str = "edge_id, source_key, target_key, edge_type, role, \
                                     classification, score, original_source, \
                                     original_target, created_at, obsoleted_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      edge_id:         row.get(0)?,
      source_key:      row.get(1)?,
      target_key:      row.get(2)?,
      edge_type:       row.get(3)?,
      role:            row.get(4)?,
      classification:  row.get(5)?,
      score:           row.get(6)?,
      original_source: row.get(7)?,
      original_target: row.get(8)?,
      created_at:      row.get(9)?,
      obsoleted_at:    row.get(10)?,
    })
  }

  /// Encode an edge for insertion. `obsoleted_at` is never written on
  /// insert; new edges are always active.
  pub fn from_edge(edge: &RelationshipEdge) -> Self {
    Self {
      edge_id:         encode_uuid(edge.edge_id),
      source_key:      encode_uuid(edge.source),
      target_key:      encode_uuid(edge.target),
      edge_type:       encode_edge_type(&edge.edge_type),
      role:            edge.role.clone(),
      classification:  encode_classification(edge.classification).to_owned(),
      score:           edge.score,
      original_source: edge.original_source.map(encode_uuid),
      original_target: edge.original_target.map(encode_uuid),
      created_at:      encode_dt(edge.created_at),
      obsoleted_at:    None,
    }
  }

  pub fn into_edge(self) -> Result<RelationshipEdge> {
    Ok(RelationshipEdge {
      edge_id:         decode_uuid(&self.edge_id)?,
      source:          decode_uuid(&self.source_key)?,
      target:          decode_uuid(&self.target_key)?,
      edge_type:       decode_edge_type(&self.edge_type)?,
      role:            self.role,
      classification:  decode_classification(&self.classification)?,
      score:           self.score,
      original_source: decode_opt_uuid(self.original_source)?,
      original_target: decode_opt_uuid(self.original_target)?,
      created_at:      decode_dt(&self.created_at)?,
      obsoleted_at:    self.obsoleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn external_types_cannot_collide_with_bookkeeping_types() {
    let sneaky = EdgeType::external("master_link");
    let encoded = encode_edge_type(&sneaky);
    assert_eq!(encoded, "x:master_link");
    assert_eq!(decode_edge_type(&encoded).unwrap(), sneaky);
    assert_eq!(decode_edge_type("master_link").unwrap(), EdgeType::MasterLink);
  }

  #[test]
  fn timestamps_sort_lexically() {
    let early = DateTime::parse_from_rfc3339("2024-01-01T00:00:09Z")
      .unwrap()
      .with_timezone(&Utc);
    let late = DateTime::parse_from_rfc3339("2024-01-01T00:00:10.5Z")
      .unwrap()
      .with_timezone(&Utc);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }
}
