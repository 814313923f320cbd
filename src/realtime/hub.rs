//! Backend side of realtime: change events, the broadcast hub and per-viewer feeds.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::Repository;
use crate::gateway::{RowFilter, Table};
use crate::models::Identity;

/// Default number of changes buffered per receiver before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    /// Row after the change; absent for deletes
    #[serde(default)]
    pub record: Option<Value>,
    /// Row before the change; absent for inserts
    #[serde(default)]
    pub old_record: Option<Value>,
    pub commit_timestamp: DateTime<Utc>,
    /// Fixed set of users allowed to see the change, captured before a cascade.
    #[serde(skip)]
    pub audience: Option<Arc<HashSet<Uuid>>>,
}

impl ChangeEvent {
    pub fn insert(table: Table, record: Value) -> Self {
        Self::new(table, ChangeKind::Insert, Some(record), None)
    }

    pub fn update(table: Table, old_record: Value, record: Value) -> Self {
        Self::new(table, ChangeKind::Update, Some(record), Some(old_record))
    }

    pub fn delete(table: Table, old_record: Value) -> Self {
        Self::new(table, ChangeKind::Delete, None, Some(old_record))
    }

    /// Marker telling a subscriber that changes were missed and it should reload.
    pub fn resync(table: Table) -> Self {
        Self::new(table, ChangeKind::Update, None, None)
    }

    fn new(table: Table, kind: ChangeKind, record: Option<Value>, old_record: Option<Value>) -> Self {
        Self {
            table,
            kind,
            record,
            old_record,
            commit_timestamp: Utc::now(),
            audience: None,
        }
    }

    pub fn with_audience(mut self, audience: Arc<HashSet<Uuid>>) -> Self {
        self.audience = Some(audience);
        self
    }

    /// The row the change is about: the new one, or the old one for deletes.
    pub fn row(&self) -> &Value {
        self.record
            .as_ref()
            .or(self.old_record.as_ref())
            .unwrap_or(&Value::Null)
    }

    /// True when either side of the change satisfies the channel filter.
    pub fn matches(&self, filter: &RowFilter) -> bool {
        self.record.as_ref().is_some_and(|r| filter.matches(r))
            || self.old_record.as_ref().is_some_and(|r| filter.matches(r))
    }
}

/// Fan-out of committed changes to every open feed.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, change: ChangeEvent) {
        tracing::debug!("Publishing {:?} on {}", change.kind, change.table);
        // No receivers is fine: nobody is listening.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Changes of one table, narrowed by an optional filter and the viewer's read policy.
pub struct ChangeFeed {
    receiver: broadcast::Receiver<ChangeEvent>,
    repo: Repository,
    viewer: Option<Identity>,
    table: Table,
    filter: Option<RowFilter>,
}

impl ChangeFeed {
    pub fn new(
        repo: Repository,
        viewer: Option<Identity>,
        table: Table,
        filter: Option<RowFilter>,
    ) -> Self {
        Self {
            receiver: repo.hub().subscribe(),
            repo,
            viewer,
            table,
            filter,
        }
    }

    /// Next visible change, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            let change = match self.receiver.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Realtime feed on {} lagged, {} changes dropped",
                        self.table,
                        skipped
                    );
                    // The dropped changes may have touched rows this viewer sees.
                    if self.viewer.is_some() {
                        return Some(ChangeEvent::resync(self.table));
                    }
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            if change.table != self.table {
                continue;
            }
            if let Some(filter) = &self.filter {
                if !change.matches(filter) {
                    continue;
                }
            }

            match self.repo.row_visible(self.viewer.as_ref(), &change).await {
                Ok(true) => return Some(change),
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Visibility check failed on {}: {}", self.table, e);
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_event_wire_shape() {
        let change = ChangeEvent::insert(Table::Tasks, json!({ "id": "t1" }));
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["table"], "tasks");
        assert_eq!(value["eventType"], "INSERT");
        assert_eq!(value["record"]["id"], "t1");
        assert!(value.get("audience").is_none());
    }

    #[test]
    fn test_delete_matches_on_old_record() {
        let change = ChangeEvent::delete(Table::TeamDocuments, json!({ "team_id": "t1" }));
        assert!(change.matches(&RowFilter::eq("team_id", "t1")));
        assert!(!change.matches(&RowFilter::eq("team_id", "t2")));
        assert_eq!(change.row()["team_id"], "t1");
    }

    #[test]
    fn test_update_matches_either_side() {
        let change = ChangeEvent::update(
            Table::Tasks,
            json!({ "team_id": "old" }),
            json!({ "team_id": "new" }),
        );
        assert!(change.matches(&RowFilter::eq("team_id", "old")));
        assert!(change.matches(&RowFilter::eq("team_id", "new")));
    }

    #[test]
    fn test_resync_carries_no_rows() {
        let change = ChangeEvent::resync(Table::Tasks);
        assert_eq!(change.table, Table::Tasks);
        assert!(change.row().is_null());
        assert!(!change.matches(&RowFilter::eq("team_id", "t1")));
    }

    #[tokio::test]
    async fn test_publish_without_receivers_is_silent() {
        let hub = RealtimeHub::new(4);
        hub.publish(ChangeEvent::insert(Table::Events, json!({})));
        let mut rx = hub.subscribe();
        assert_eq!(hub.receiver_count(), 1);
        hub.publish(ChangeEvent::insert(Table::Events, json!({ "id": "e1" })));
        assert_eq!(rx.recv().await.unwrap().row()["id"], "e1");
    }
}
