//! Shared service state: snapshots, memoised views and the notification hub.
//!
//! A [`ViewInterface`] owns one [`Snapshot`] per entity behind a lock and a
//! memo of derived views keyed by entity, snapshot generation and descriptor
//! fingerprint. Derivations copy the snapshot's `Arc` and run without
//! holding any lock, so every view is computed from one consistent
//! collection. Refreshes of one entity run one at a time, so a slow fetch
//! can never land after a newer one. Refreshing the audit log announces
//! entries that were not in the previous snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analytics::{self, CategorySummary, DailyTrend, Dashboard, LowStockItem, TopItem};
use crate::config::Settings;
use crate::engine::{self, DerivedView};
use crate::entity::Entity;
use crate::notify::{new_audit_events, Notifier};
use crate::query::QueryDescriptor;
use crate::record::{Record, Value};
use crate::source::{RecordSource, Snapshot, Source};

const EVENT_CAPACITY: usize = 256;
const MEMO_CAPACITY: usize = 512;
const RECENT_TRANSACTIONS: usize = 10;

type ViewKey = (Entity, u64, u64);

/// Freshness of one entity's snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotHealth {
    pub entity: Entity,
    pub records: usize,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// `ok` once every entity has loaded at least once, `degraded` otherwise.
    pub status: String,
    pub snapshots: Vec<SnapshotHealth>,
}

pub struct ViewInterface<S: RecordSource = Source> {
    source: S,
    settings: Settings,
    snapshots: RwLock<HashMap<Entity, Snapshot>>,
    views: Mutex<HashMap<ViewKey, Arc<DerivedView>>>,
    /// One turn per entity, indexed by `Entity as usize`, held across fetch and apply.
    refreshing: [tokio::sync::Mutex<()>; 3],
    notifier: Notifier,
}

impl<S: RecordSource> ViewInterface<S> {
    pub fn new(source: S, settings: Settings) -> Self {
        let snapshots = Entity::ALL.iter().map(|e| (*e, Snapshot::default())).collect();
        Self {
            source,
            settings,
            snapshots: RwLock::new(snapshots),
            views: Mutex::new(HashMap::new()),
            refreshing: Default::default(),
            notifier: Notifier::new(EVENT_CAPACITY),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A copy of the entity's current snapshot; the records are shared, not cloned.
    pub fn snapshot(&self, entity: Entity) -> Snapshot {
        self.snapshots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    fn records(&self, entity: Entity) -> Arc<Vec<Record>> {
        self.snapshot(entity).records
    }

    /// Refetches one entity. On success returns the new record count; on
    /// failure the stale snapshot stays and the user-facing notice is returned.
    pub async fn refresh(&self, entity: Entity) -> std::result::Result<usize, String> {
        let _turn = self.refreshing[entity as usize].lock().await;
        let outcome = self.source.fetch(entity).await;
        let (previous, was_loaded, current) = {
            let mut snapshots = self.snapshots.write().unwrap_or_else(|p| p.into_inner());
            let snapshot = snapshots.entry(entity).or_default();
            let was_loaded = snapshot.is_loaded();
            let previous = snapshot.apply(entity, outcome)?;
            (previous, was_loaded, Arc::clone(&snapshot.records))
        };
        self.views
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|(e, _, _), _| *e != entity);
        if entity == Entity::AuditLog && was_loaded {
            let events = new_audit_events(&previous, &current);
            for event in events {
                info!(event = %event.message(), "inventory changed");
                self.notifier.publish(event);
            }
        }
        Ok(current.len())
    }

    /// Refreshes every entity, returning the notices of those that failed.
    pub async fn refresh_all(&self) -> Vec<String> {
        let mut notices = Vec::new();
        for entity in Entity::ALL {
            if let Err(notice) = self.refresh(entity).await {
                notices.push(notice);
            }
        }
        notices
    }

    /// The derived view for `descriptor`, memoised per snapshot generation.
    pub fn view(&self, entity: Entity, descriptor: &QueryDescriptor) -> Arc<DerivedView> {
        let snapshot = self.snapshot(entity);
        let key = (entity, snapshot.generation, descriptor.fingerprint());
        if let Some(hit) = self.views.lock().unwrap_or_else(|p| p.into_inner()).get(&key) {
            debug!(%entity, "view memo hit");
            return Arc::clone(hit);
        }
        let view = Arc::new(engine::derive(&snapshot.records, descriptor, &entity.profile()));
        let mut views = self.views.lock().unwrap_or_else(|p| p.into_inner());
        if views.len() >= MEMO_CAPACITY {
            views.clear();
        }
        views.insert(key, Arc::clone(&view));
        view
    }

    pub fn facets(&self, entity: Entity, field: &str) -> Vec<Value> {
        engine::facets(&self.records(entity), field)
    }

    pub fn low_stock(&self) -> Vec<LowStockItem> {
        analytics::low_stock(&self.records(Entity::Items))
    }

    pub fn category_summary(&self) -> Vec<CategorySummary> {
        analytics::category_summary(&self.records(Entity::Items))
    }

    pub fn top_items(&self) -> Vec<TopItem> {
        analytics::top_items(&self.records(Entity::Items), self.settings.top_items)
    }

    /// Daily movement over the last `trend_days`.
    pub fn stock_trends(&self) -> Vec<DailyTrend> {
        let since = Utc::now().naive_utc() - chrono::Duration::days(self.settings.trend_days);
        analytics::stock_trends(&self.records(Entity::Transactions), since)
    }

    pub fn dashboard(&self) -> Dashboard {
        analytics::dashboard(
            &self.records(Entity::Items),
            &self.records(Entity::Transactions),
            self.settings.low_stock_alert_ratio,
            RECENT_TRANSACTIONS,
        )
    }

    pub fn health(&self) -> Health {
        let now = Utc::now();
        let snapshots: Vec<SnapshotHealth> = Entity::ALL
            .iter()
            .map(|entity| {
                let s = self.snapshot(*entity);
                SnapshotHealth {
                    entity: *entity,
                    records: s.records.len(),
                    generation: s.generation,
                    age_secs: s.fetched_at.map(|at| (now - at).num_seconds()),
                    notice: s.notice,
                }
            })
            .collect();
        let status = if snapshots.iter().all(|s| s.generation > 0) { "ok" } else { "degraded" };
        Health { status: status.into(), snapshots }
    }

    /// Refreshes everything every `period` until the returned task is aborted.
    /// The first refresh happens one period from now.
    pub fn spawn_refresh(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let notices = self.refresh_all().await;
                debug!(failed = notices.len(), "periodic refresh");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InvguardError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed item list and fails on every other call after the first.
    struct Flaky {
        calls: AtomicUsize,
    }

    impl RecordSource for Flaky {
        async fn fetch(&self, _entity: Entity) -> Result<Vec<Record>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(vec![Record::new().with("id", 1i64).with("quantity", 1i64).with("reorder_level", 5i64)])
            } else {
                Err(InvguardError::Fetch { message: "down".into(), status: None })
            }
        }
    }

    #[tokio::test]
    async fn views_are_memoised_per_generation() {
        let iface = ViewInterface::new(Flaky { calls: AtomicUsize::new(0) }, Settings::default());
        assert_eq!(iface.refresh(Entity::Items).await, Ok(1));
        let q = QueryDescriptor::new();
        let first = iface.view(Entity::Items, &q);
        assert!(Arc::ptr_eq(&first, &iface.view(Entity::Items, &q)));

        assert!(iface.refresh(Entity::Items).await.is_err());
        assert!(Arc::ptr_eq(&first, &iface.view(Entity::Items, &q)));
        assert_eq!(iface.low_stock().len(), 1);

        assert_eq!(iface.refresh(Entity::Items).await, Ok(1));
        assert!(!Arc::ptr_eq(&first, &iface.view(Entity::Items, &q)));
    }

    /// Answers call `n` with `n + 1` records; the second call is slow.
    struct Slow {
        calls: AtomicUsize,
    }

    impl RecordSource for Slow {
        async fn fetch(&self, _entity: Entity) -> Result<Vec<Record>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok((0..=n as i64).map(|id| Record::new().with("id", id)).collect())
        }
    }

    #[tokio::test]
    async fn overlapping_refreshes_apply_in_call_order() {
        let iface = Arc::new(ViewInterface::new(Slow { calls: AtomicUsize::new(0) }, Settings::default()));
        assert_eq!(iface.refresh(Entity::Items).await, Ok(1));

        let slow = tokio::spawn({
            let iface = Arc::clone(&iface);
            async move { iface.refresh(Entity::Items).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = tokio::spawn({
            let iface = Arc::clone(&iface);
            async move { iface.refresh(Entity::Items).await }
        });
        assert_eq!(slow.await.unwrap(), Ok(2));
        assert_eq!(fast.await.unwrap(), Ok(3));

        let snapshot = iface.snapshot(Entity::Items);
        assert_eq!(snapshot.records.len(), 3, "the older fetch must not overwrite the newer one");
        assert_eq!(snapshot.generation, 3);
    }

    #[tokio::test]
    async fn other_entities_refresh_while_one_is_slow() {
        let iface = Arc::new(ViewInterface::new(Slow { calls: AtomicUsize::new(1) }, Settings::default()));
        let slow = tokio::spawn({
            let iface = Arc::clone(&iface);
            async move { iface.refresh(Entity::Items).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(iface.refresh(Entity::Transactions).await, Ok(3));
        assert_eq!(iface.snapshot(Entity::Items).generation, 0, "items are still fetching");
        assert_eq!(slow.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn health_reports_unloaded_entities() {
        let iface = ViewInterface::new(Flaky { calls: AtomicUsize::new(0) }, Settings::default());
        assert_eq!(iface.health().status, "degraded");
        iface.refresh(Entity::Items).await.unwrap();
        let health = iface.health();
        assert_eq!(health.snapshots[0].generation, 1);
        assert!(health.snapshots[0].age_secs.is_some());
    }
}
