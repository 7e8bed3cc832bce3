use mdm_core::{BoxError, edge::RelationshipEdge, store::NotificationSink};
use tracing::info;

/// Writes committed link changes to the log, for downstream log shippers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
  fn on_link_established(&self, edge: &RelationshipEdge) -> Result<(), BoxError> {
    info!(
      target: "mdm::links",
      local = %edge.source,
      master = %edge.target,
      classification = ?edge.classification,
      "link established"
    );
    Ok(())
  }

  fn on_link_removed(&self, edge: &RelationshipEdge) -> Result<(), BoxError> {
    info!(target: "mdm::links", local = %edge.source, master = %edge.target, "link removed");
    Ok(())
  }
}
