//! Integration tests for `SqliteStore` against an in-memory database.

use mdm_core::{
  edge::{Classification, EdgeType, RelationshipEdge},
  record::{Record, RecordClass},
  store::{EdgeQuery, RecordAccessor, RecordQuery, RelationshipStore},
  transaction::Transaction,
};
use serde_json::json;
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn link(local: Uuid, master: Uuid) -> RelationshipEdge {
  RelationshipEdge::new(local, master, EdgeType::MasterLink, Classification::Verified)
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get_record() {
  let s = store().await;
  let record = Record::local("patient", "clinic")
    .with_field("name", "Jon")
    .with_field("birth_year", 1980);
  s.put_record(&record).await.unwrap();

  let fetched = s.get(record.key).await.unwrap().expect("record");
  assert_eq!(fetched.class, RecordClass::Local);
  assert_eq!(fetched.source.as_deref(), Some("clinic"));
  assert_eq!(fetched.field("name"), Some(&json!("Jon")));
  assert_eq!(fetched.field("birth_year"), Some(&json!(1980)));
}

#[tokio::test]
async fn get_missing_record_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn put_record_replaces_existing() {
  let s = store().await;
  let record = Record::local("patient", "clinic").with_field("name", "Jon");
  s.put_record(&record).await.unwrap();
  s.put_record(&record.clone().with_field("name", "John")).await.unwrap();

  let fetched = s.get(record.key).await.unwrap().unwrap();
  assert_eq!(fetched.field("name"), Some(&json!("John")));
}

#[tokio::test]
async fn query_filters_by_class_and_type() {
  let s = store().await;
  s.put_record(&Record::local("patient", "clinic")).await.unwrap();
  s.put_record(&Record::local("patient", "lab")).await.unwrap();
  s.put_record(&Record::local("organization", "clinic")).await.unwrap();
  s.put_record(&Record::master("patient")).await.unwrap();

  let locals = s.query(&RecordQuery::locals("patient")).await.unwrap();
  assert_eq!(locals.len(), 2);
  assert!(locals.iter().all(|r| r.class == RecordClass::Local));

  let masters = s.query(&RecordQuery::masters("patient")).await.unwrap();
  assert_eq!(masters.len(), 1);

  let from_lab = RecordQuery { source: Some("lab".into()), ..RecordQuery::default() };
  assert_eq!(s.query(&from_lab).await.unwrap().len(), 1);
}

// ─── Edges ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_inserts_and_obsoletes_atomically() {
  let s = store().await;
  let (local, master) = (Uuid::new_v4(), Uuid::new_v4());
  let candidate = s
    .insert_edge(RelationshipEdge::new(
      local,
      master,
      EdgeType::Candidate,
      Classification::Automatic,
    ))
    .await
    .unwrap();

  let mut tx = Transaction::new();
  tx.obsolete(candidate.clone());
  tx.insert(link(local, master));
  let committed = s.submit(tx).await.unwrap();
  assert_eq!(committed.inserted.len(), 1);
  assert!(committed.obsoleted[0].obsoleted_at.is_some());

  let active = s.query_edges(&EdgeQuery::between(local, master)).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].edge_type, EdgeType::MasterLink);

  let all = s
    .query_edges(&EdgeQuery::between(local, master).including_obsolete())
    .await
    .unwrap();
  assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn second_active_master_link_is_rejected() {
  let s = store().await;
  let (local, m1, m2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  s.insert_edge(link(local, m1)).await.unwrap();

  let mut tx = Transaction::new();
  tx.insert(link(local, m2));
  let err = s.submit(tx).await.unwrap_err();
  assert!(matches!(err, Error::Constraint(_)), "got {err:?}");

  let links = s
    .query_edges(&EdgeQuery::from_source(local).of_type(EdgeType::MasterLink))
    .await
    .unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].target, m1);
}

#[tokio::test]
async fn replacing_a_link_in_one_transaction_passes_the_index() {
  let s = store().await;
  let (local, m1, m2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let old = s.insert_edge(link(local, m1)).await.unwrap();

  let mut tx = Transaction::new();
  tx.insert(link(local, m2));
  tx.obsolete(old);
  s.submit(tx).await.unwrap();

  let links = s
    .query_edges(&EdgeQuery::from_source(local).of_type(EdgeType::MasterLink))
    .await
    .unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].target, m2);
}

#[tokio::test]
async fn one_pending_decision_per_pair() {
  let s = store().await;
  let (local, master) = (Uuid::new_v4(), Uuid::new_v4());
  let candidate = s
    .insert_edge(RelationshipEdge::new(
      local,
      master,
      EdgeType::Candidate,
      Classification::Automatic,
    ))
    .await
    .unwrap();

  let mut tx = Transaction::new();
  tx.insert(RelationshipEdge::new(local, master, EdgeType::Ignored, Classification::Verified));
  let err = s.submit(tx).await.unwrap_err();
  assert!(matches!(err, Error::Constraint(_)), "got {err:?}");

  // Replacing the candidate within one transaction is allowed.
  let mut tx = Transaction::new();
  tx.obsolete(candidate);
  tx.insert(RelationshipEdge::new(local, master, EdgeType::Ignored, Classification::Verified));
  s.submit(tx).await.unwrap();

  let active = s.query_edges(&EdgeQuery::between(local, master)).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].edge_type, EdgeType::Ignored);
}

#[tokio::test]
async fn obsoleting_a_stale_edge_rolls_back_everything() {
  let s = store().await;
  let (local, master) = (Uuid::new_v4(), Uuid::new_v4());
  let edge = s.insert_edge(link(local, master)).await.unwrap();

  let mut first = Transaction::new();
  first.obsolete(edge.clone());
  s.submit(first).await.unwrap();

  let other = Uuid::new_v4();
  let mut second = Transaction::new();
  second.insert(RelationshipEdge::new(
    local,
    other,
    EdgeType::Ignored,
    Classification::Verified,
  ));
  second.obsolete(edge.clone());
  let err = s.submit(second).await.unwrap_err();
  assert!(matches!(err, Error::StaleEdge(id) if id == edge.edge_id));

  let ignored = s.query_edges(&EdgeQuery::between(local, other)).await.unwrap();
  assert!(ignored.is_empty());
}

#[tokio::test]
async fn edge_fields_roundtrip() {
  let s = store().await;
  let (holder, master, target) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let edge = RelationshipEdge::new(
    holder,
    target,
    EdgeType::external("employer"),
    Classification::System,
  )
  .with_role("primary")
  .with_score(0.75)
  .redirected(master, target);
  s.insert_edge(edge.clone()).await.unwrap();

  let fetched = s
    .query_edges(&EdgeQuery::from_source(master).of_type(EdgeType::external("employer")))
    .await
    .unwrap();
  assert_eq!(fetched.len(), 1);
  let got = &fetched[0];
  assert_eq!(got.edge_id, edge.edge_id);
  assert_eq!(got.role.as_deref(), Some("primary"));
  assert_eq!(got.score, Some(0.75));
  assert_eq!(got.original_source, Some(holder));
  assert_eq!(got.original_target, None);
  assert!(got.is_active());
}

#[tokio::test]
async fn query_by_classification() {
  let s = store().await;
  let (local, master) = (Uuid::new_v4(), Uuid::new_v4());
  s.insert_edge(RelationshipEdge::new(
    local,
    master,
    EdgeType::Candidate,
    Classification::Automatic,
  ))
  .await
  .unwrap();
  s.insert_edge(RelationshipEdge::new(
    local,
    Uuid::new_v4(),
    EdgeType::Candidate,
    Classification::Verified,
  ))
  .await
  .unwrap();

  let automatic = s
    .query_edges(
      &EdgeQuery::from_source(local)
        .of_type(EdgeType::Candidate)
        .classified(Classification::Automatic),
    )
    .await
    .unwrap();
  assert_eq!(automatic.len(), 1);
  assert_eq!(automatic[0].target, master);
}
