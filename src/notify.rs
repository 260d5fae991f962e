//! Inventory notifications.
//!
//! Every audited change becomes an [`InventoryEvent`] published on a
//! broadcast hub. Delivery is best effort: a subscriber that falls behind
//! loses the oldest events and is told how many. Events never feed the view
//! engine; seeing a change in a table takes a refresh.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEvent {
    /// `<resource type>_changed`, e.g. `item_changed`
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub resource_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<Record>,
}

impl InventoryEvent {
    /// The event announcing an audit entry. Entries without an action announce nothing.
    pub fn from_audit(entry: &Record) -> Option<Self> {
        let action = entry.text("action")?;
        let resource_type = entry.text("resource_type").unwrap_or_default().to_lowercase();
        Some(Self {
            kind: format!("{}_changed", resource_type),
            action,
            resource_id: entry.get("resource_id").and_then(|v| v.as_number()).map(|n| n as i64),
            audit: Some(entry.clone()),
        })
    }

    /// Toast text, e.g. `UPDATE item #7`.
    pub fn message(&self) -> String {
        let resource = self.kind.split('_').next().unwrap_or_default();
        match self.resource_id {
            Some(id) => format!("{} {} #{}", self.action, resource, id),
            None => format!("{} {}", self.action, resource),
        }
    }
}

/// Events for audit entries present in `current` but not in `previous`, oldest first.
pub fn new_audit_events(previous: &[Record], current: &[Record]) -> Vec<InventoryEvent> {
    let known: HashSet<i64> = previous.iter().filter_map(Record::id).collect();
    let mut fresh: Vec<&Record> = current
        .iter()
        .filter(|r| r.id().is_some_and(|id| !known.contains(&id)))
        .collect();
    fresh.sort_by_key(|r| r.id());
    fresh.into_iter().filter_map(InventoryEvent::from_audit).collect()
}

/// Broadcast hub for inventory events.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<InventoryEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes to whoever is listening; returns how many subscribers got it.
    pub fn publish(&self, event: InventoryEvent) -> usize {
        debug!(kind=%event.kind, action=%event.action, "publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver(&self) -> broadcast::Receiver<InventoryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawns a task that hands every event to `callback` until unsubscribed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(InventoryEvent) + Send + 'static,
    {
        let mut receiver = self.receiver();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "subscriber lagging, events dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

/// A running subscription. Dropping it unsubscribes as well.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
