//! Callers and the privacy filter that decides which records they may see.
//!
//! A filter returning `None` hides the record entirely; synthesis then treats
//! it as if it were not linked at all.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// The identity a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub name:            String,
  /// Source systems whose locals the principal may see. `None` means all.
  pub allowed_sources: Option<BTreeSet<String>>,
}

impl Principal {
  /// An unrestricted principal for internal work such as batch matching.
  pub fn system() -> Self {
    Self { name: "system".to_owned(), allowed_sources: None }
  }

  pub fn restricted<I, S>(name: impl Into<String>, sources: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      name:            name.into(),
      allowed_sources: Some(sources.into_iter().map(Into::into).collect()),
    }
  }

  pub fn may_see_source(&self, source: &str) -> bool {
    self
      .allowed_sources
      .as_ref()
      .is_none_or(|allowed| allowed.contains(source))
  }
}

/// Decides whether (and in what form) a principal may see a record.
pub trait PrivacyFilter: Send + Sync {
  /// Return the record as the principal may see it, or `None` to hide it.
  fn apply(&self, record: Record, principal: &Principal) -> Option<Record>;
}

impl<F> PrivacyFilter for F
where
  F: Fn(Record, &Principal) -> Option<Record> + Send + Sync,
{
  fn apply(&self, record: Record, principal: &Principal) -> Option<Record> {
    self(record, principal)
  }
}

/// Shows every record to everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PrivacyFilter for AllowAll {
  fn apply(&self, record: Record, _principal: &Principal) -> Option<Record> { Some(record) }
}

/// Hides locals from source systems the principal is not cleared for.
/// Masters carry no source and are always visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceFilter;

impl PrivacyFilter for SourceFilter {
  fn apply(&self, record: Record, principal: &Principal) -> Option<Record> {
    match record.source.as_deref() {
      Some(source) if !principal.may_see_source(source) => None,
      _ => Some(record),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_filter_hides_uncleared_sources() {
    let clinic = Record::local("patient", "clinic");
    let lab = Record::local("patient", "lab");
    let master = Record::master("patient");
    let nurse = Principal::restricted("nurse", ["clinic"]);

    assert!(SourceFilter.apply(clinic, &nurse).is_some());
    assert!(SourceFilter.apply(lab.clone(), &nurse).is_none());
    assert!(SourceFilter.apply(master, &nurse).is_some());
    assert!(SourceFilter.apply(lab, &Principal::system()).is_some());
  }

  #[test]
  fn closures_are_filters() {
    let redact = |mut record: Record, _: &Principal| {
      record.fields.remove("ssn");
      Some(record)
    };
    let record = Record::local("patient", "clinic").with_field("ssn", "123");
    let seen = redact.apply(record, &Principal::system()).unwrap();
    assert!(seen.field("ssn").is_none());
  }
}
