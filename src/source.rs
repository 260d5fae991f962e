//! Where raw collections come from, and how the last good one is kept.
//!
//! A [`RecordSource`] delivers a fresh collection or an error. A
//! [`Snapshot`] holds the last collection that arrived; a failed fetch
//! leaves it untouched and records a notice for the user instead.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value as Json;
use tracing::{info, warn};

use crate::entity::Entity;
use crate::error::{InvguardError, Result};
use crate::record::{records_from_json, Record};
use crate::session::Session;

/// Supplies raw collections. Implementations never retry.
pub trait RecordSource: Send + Sync + 'static {
    fn fetch(&self, entity: Entity) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Fetches from the InvGuard REST API with the session's bearer token.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    api_url: String,
    session: Session,
    transaction_window: u32,
}

impl HttpSource {
    /// `transaction_window` is the page size asked of `/transactions`.
    pub fn new(api_url: &str, session: Session, transaction_window: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_owned(),
            session,
            transaction_window,
        }
    }

    pub fn url(&self, entity: Entity) -> String {
        format!("{}/{}", self.api_url, entity.resource())
    }
}

impl RecordSource for HttpSource {
    async fn fetch(&self, entity: Entity) -> Result<Vec<Record>> {
        let url = self.url(entity);
        let mut request = self.client.get(&url);
        if entity == Entity::Transactions {
            request = request.query(&[("limit", self.transaction_window)]);
        }
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(%url, "token rejected");
            self.session.clear().await;
            return Err(InvguardError::Unauthorized);
        }
        if !status.is_success() {
            return Err(InvguardError::Fetch {
                message: format!("{} answered {}", url, status),
                status: Some(status.as_u16()),
            });
        }
        let json: Json = response.json().await?;
        records_from_json(json)
    }
}

/// Reads `items.json`, `transactions.json` and `audit.json` from a directory of exports.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, entity: Entity) -> PathBuf {
        self.dir.join(format!("{}.json", entity.resource()))
    }
}

impl RecordSource for DirectorySource {
    async fn fetch(&self, entity: Entity) -> Result<Vec<Record>> {
        let bytes = tokio::fs::read(self.path(entity)).await?;
        records_from_json(serde_json::from_slice(&bytes)?)
    }
}

/// Either kind of source, picked from configuration.
#[derive(Debug, Clone)]
pub enum Source {
    Http(HttpSource),
    Directory(DirectorySource),
}

impl RecordSource for Source {
    async fn fetch(&self, entity: Entity) -> Result<Vec<Record>> {
        match self {
            Source::Http(s) => s.fetch(entity).await,
            Source::Directory(s) => s.fetch(entity).await,
        }
    }
}

/// The last collection that arrived for one entity.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Arc<Vec<Record>>,
    /// Bumped on every successful replacement; 0 means never loaded.
    pub generation: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    /// User-facing message from the most recent failed fetch.
    pub notice: Option<String>,
}

impl Snapshot {
    pub fn is_loaded(&self) -> bool {
        self.generation > 0
    }

    /// Installs a fresh collection and returns the one it replaced.
    pub fn replace(&mut self, records: Vec<Record>) -> Arc<Vec<Record>> {
        self.generation += 1;
        self.fetched_at = Some(Utc::now());
        self.notice = None;
        std::mem::replace(&mut self.records, Arc::new(records))
    }

    /// Keeps the stale collection and remembers why the refresh failed.
    pub fn fail(&mut self, entity: Entity, error: &InvguardError) -> String {
        let notice = format!("Failed to load {}: {}", entity, error);
        warn!(%entity, error=%error, stale=self.records.len(), "keeping previous collection");
        self.notice = Some(notice.clone());
        notice
    }

    /// Applies the outcome of a fetch; returns the replaced collection on success.
    pub fn apply(&mut self, entity: Entity, outcome: Result<Vec<Record>>) -> std::result::Result<Arc<Vec<Record>>, String> {
        match outcome {
            Ok(records) => {
                info!(%entity, count = records.len(), "collection refreshed");
                Ok(self.replace(records))
            }
            Err(e) => Err(self.fail(entity, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_fetch_keeps_previous_collection() {
        let mut snapshot = Snapshot::default();
        assert!(!snapshot.is_loaded());
        snapshot.apply(Entity::Items, Ok(vec![Record::new().with("id", 1i64)])).unwrap();
        let notice = snapshot
            .apply(Entity::Items, Err(InvguardError::Fetch { message: "boom".into(), status: Some(500) }))
            .unwrap_err();
        assert!(notice.contains("items"));
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.notice.as_deref(), Some(notice.as_str()));

        let previous = snapshot.apply(Entity::Items, Ok(vec![])).unwrap();
        assert_eq!(previous.len(), 1);
        assert!(snapshot.notice.is_none());
        assert_eq!(snapshot.generation, 2);
    }

    #[tokio::test]
    async fn directory_source_reads_exports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("items.json"), r#"[{"id": 1, "name": "Bolt"}, {"id": 2, "name": "Nut"}]"#).unwrap();
        let source = DirectorySource::new(dir.path());
        let items = source.fetch(Entity::Items).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(source.fetch(Entity::AuditLog).await.is_err());
    }

    #[test]
    fn http_urls_follow_resources() {
        let source = HttpSource::new("http://localhost:5000/api/", Session::default(), 50);
        assert_eq!(source.url(Entity::AuditLog), "http://localhost:5000/api/audit");
    }
}
