//! [`SqliteStore`], the SQLite implementation of [`RecordAccessor`] and
//! [`RelationshipStore`].

use std::path::Path;

use chrono::Utc;
use mdm_core::{
  edge::RelationshipEdge,
  record::Record,
  store::{EdgeQuery, RecordAccessor, RecordQuery, RelationshipStore},
  transaction::{CommittedTransaction, Transaction},
};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawEdge, RawRecord, encode_class, encode_classification, encode_dt, encode_edge_type,
    encode_fields, encode_uuid,
  },
  schema::SCHEMA,
};

/// Why SQLite refused a transaction. Returned from inside the connection
/// thread so the transaction can be rolled back there.
enum Rejection {
  Stale(String),
  Constraint(String),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Records and relationship edges backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or replace a record. Record contents belong to their source
  /// systems; the engine itself never writes records.
  pub async fn put_record(&self, record: &Record) -> Result<()> {
    let key_str      = encode_uuid(record.key);
    let class_str    = encode_class(record.class).to_owned();
    let rtype        = record.resource_type.clone();
    let source       = record.source.clone();
    let modified_str = encode_dt(record.modified_at);
    let fields_str   = encode_fields(&record.fields)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (record_key, class, resource_type, source, modified_at, fields)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(record_key) DO UPDATE SET
             class         = excluded.class,
             resource_type = excluded.resource_type,
             source        = excluded.source,
             modified_at   = excluded.modified_at,
             fields        = excluded.fields",
          rusqlite::params![key_str, class_str, rtype, source, modified_str, fields_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a single edge outside of any engine-built transaction, e.g. an
  /// external relationship written by a source system.
  pub async fn insert_edge(&self, edge: RelationshipEdge) -> Result<RelationshipEdge> {
    let mut tx = Transaction::new();
    tx.insert(edge.clone());
    self.submit(tx).await?;
    Ok(edge)
  }
}

fn insert_raw_edge(conn: &rusqlite::Connection, raw: &RawEdge) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO edges (
       edge_id, source_key, target_key, edge_type, role, classification,
       score, original_source, original_target, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      raw.edge_id,
      raw.source_key,
      raw.target_key,
      raw.edge_type,
      raw.role,
      raw.classification,
      raw.score,
      raw.original_source,
      raw.original_target,
      raw.created_at,
    ],
  )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── RecordAccessor impl ─────────────────────────────────────────────────────

impl RecordAccessor for SqliteStore {
  type Error = Error;

  async fn get(&self, key: Uuid) -> Result<Option<Record>> {
    let key_str = encode_uuid(key);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM records WHERE record_key = ?1", RawRecord::COLUMNS),
              rusqlite::params![key_str],
              RawRecord::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>> {
    let mut conds: Vec<&'static str> = vec![];
    let mut params: Vec<Value> = vec![];
    if let Some(class) = query.class {
      conds.push("class = ?");
      params.push(Value::Text(encode_class(class).to_owned()));
    }
    if let Some(rtype) = &query.resource_type {
      conds.push("resource_type = ?");
      params.push(Value::Text(rtype.clone()));
    }
    if let Some(source) = &query.source {
      conds.push("source = ?");
      params.push(Value::Text(source.clone()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let limit_clause = query.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
    let sql = format!(
      "SELECT {} FROM records {where_clause} ORDER BY record_key {limit_clause}",
      RawRecord::COLUMNS
    );

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

// ─── RelationshipStore impl ──────────────────────────────────────────────────

impl RelationshipStore for SqliteStore {
  type Error = Error;

  async fn query_edges(&self, query: &EdgeQuery) -> Result<Vec<RelationshipEdge>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<Value> = vec![];
    if let Some(source) = query.source {
      conds.push("source_key = ?".to_owned());
      params.push(Value::Text(encode_uuid(source)));
    }
    if let Some(target) = query.target {
      conds.push("target_key = ?".to_owned());
      params.push(Value::Text(encode_uuid(target)));
    }
    if !query.edge_types.is_empty() {
      let slots = vec!["?"; query.edge_types.len()].join(", ");
      conds.push(format!("edge_type IN ({slots})"));
      params.extend(query.edge_types.iter().map(|t| Value::Text(encode_edge_type(t))));
    }
    if let Some(classification) = query.classification {
      conds.push("classification = ?".to_owned());
      params.push(Value::Text(encode_classification(classification).to_owned()));
    }
    if !query.include_obsolete {
      conds.push("obsoleted_at IS NULL".to_owned());
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {} FROM edges {where_clause} ORDER BY created_at, edge_id",
      RawEdge::COLUMNS
    );

    let raws: Vec<RawEdge> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawEdge::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEdge::into_edge).collect()
  }

  async fn submit(&self, transaction: Transaction) -> Result<CommittedTransaction> {
    let committed_at = Utc::now();
    let at_str       = encode_dt(committed_at);
    let stale_ids: Vec<String> =
      transaction.obsoletes.iter().map(|e| encode_uuid(e.edge_id)).collect();
    let inserts: Vec<RawEdge> = transaction.inserts.iter().map(RawEdge::from_edge).collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Obsoletions first, so that replacing an active master link or
        // record of truth within one transaction passes the unique indexes.
        for id in &stale_ids {
          let changed = tx.execute(
            "UPDATE edges SET obsoleted_at = ?1 WHERE edge_id = ?2 AND obsoleted_at IS NULL",
            rusqlite::params![at_str, id],
          )?;
          if changed == 0 {
            return Ok(Err(Rejection::Stale(id.clone())));
          }
        }

        for raw in &inserts {
          match insert_raw_edge(&tx, raw) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
              return Ok(Err(Rejection::Constraint(e.to_string())));
            }
            Err(e) => return Err(e.into()),
          }
        }

        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    match outcome {
      Ok(()) => {}
      Err(Rejection::Stale(id)) => return Err(Error::StaleEdge(Uuid::parse_str(&id)?)),
      Err(Rejection::Constraint(msg)) => return Err(Error::Constraint(msg)),
    }

    let obsoleted = transaction
      .obsoletes
      .into_iter()
      .map(|mut edge| {
        edge.obsoleted_at = Some(committed_at);
        edge
      })
      .collect();

    Ok(CommittedTransaction {
      transaction_id: transaction.transaction_id,
      committed_at,
      inserted: transaction.inserts,
      obsoleted,
    })
  }
}
