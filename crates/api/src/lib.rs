//! community-solr backend façade.
//!
//! [`SearchBackend`] is what the page controller and the CLI depend on. The
//! host wires [`SolrBackend`] at startup; tests use [`MockBackend`].

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use csolr_core::{Entity, EntityStore, Guid, IndexDocument, SearchRequest, SearchResult, TagRegistry};
use csolr_index::{IndexOutcome, Indexer};
use csolr_search::SearchTuning;
use csolr_solr::{SolrClient, SolrConfig, UpdateCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use csolr_search::SearchError;

/// Errors from index maintenance calls, suitable for printing by the CLI.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Search and index operations for plugin projects.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search. `Ok` with `count == 0` means nothing matched; `Err`
    /// means the search itself failed.
    async fn search(&self, req: &SearchRequest) -> Result<SearchResult, SearchError>;

    /// Project `entity` and send it to the index. Send failures are logged
    /// and do not change the outcome.
    async fn index(&self, entity: &Entity) -> IndexOutcome;

    /// Remove a document from the index.
    async fn delete(&self, guid: Guid) -> BackendResult<()>;
}

// ----------------- Solr implementation -----------------

pub struct SolrBackend {
    solr: Arc<dyn SolrClient>,
    store: Arc<dyn EntityStore>,
    tuning: SearchTuning,
    indexer: Indexer,
    registry: Mutex<TagRegistry>,
    commit: bool,
}

impl SolrBackend {
    pub fn new(solr: Arc<dyn SolrClient>, store: Arc<dyn EntityStore>, tuning: SearchTuning) -> Self {
        Self {
            solr,
            store,
            tuning,
            indexer: Indexer::default(),
            registry: Mutex::new(TagRegistry::default()),
            commit: true,
        }
    }

    pub fn with_indexer(mut self, indexer: Indexer) -> Self { self.indexer = indexer; self }
    pub fn with_registry(mut self, registry: TagRegistry) -> Self { self.registry = Mutex::new(registry); self }

    /// Take the commit flag from the Solr connection settings.
    pub fn with_config(mut self, cfg: &SolrConfig) -> Self { self.commit = cfg.commit(); self }

    pub fn tuning(&self) -> &SearchTuning { &self.tuning }

    /// Currently registered tag names.
    pub async fn tag_names(&self) -> Vec<String> { self.registry.lock().await.names().to_vec() }

    async fn send(&self, doc: &IndexDocument) -> bool {
        let cmd = UpdateCommand::Add { docs: vec![doc.clone()], commit: self.commit };
        match self.solr.update(&cmd).await {
            Ok(()) => {
                metrics::counter!("index_docs_total", 1u64);
                true
            }
            Err(e) => {
                metrics::counter!("index_failures_total", 1u64);
                warn!(guid = doc.id, error = %e, "api: index update failed");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for SolrBackend {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResult, SearchError> {
        csolr_search::search(self.solr.as_ref(), self.store.as_ref(), req, &self.tuning).await
    }

    async fn index(&self, entity: &Entity) -> IndexOutcome {
        let t0 = Instant::now();
        let outcome = {
            let mut registry = self.registry.lock().await;
            self.indexer.build(entity, &mut registry)
        };
        if let IndexOutcome::Indexed(doc) = &outcome {
            let sent = self.send(doc).await;
            info!(guid = doc.id, sent, commit = self.commit, took_ms = %t0.elapsed().as_millis(), "api: index done");
        }
        outcome
    }

    async fn delete(&self, guid: Guid) -> BackendResult<()> {
        let t0 = Instant::now();
        let cmd = UpdateCommand::Delete { ids: vec![guid], commit: self.commit };
        self.solr.update(&cmd).await.map_err(|e| {
            warn!(guid, error = %e, "api: delete failed");
            BackendError::Transport(e.to_string())
        })?;
        info!(guid, took_ms = %t0.elapsed().as_millis(), "api: delete ok");
        Ok(())
    }
}

// ----------------- Mock implementation -----------------

/// In-memory backend for tests. Returns `result` for every search (or a
/// transport error when unset) and records what it was asked to do.
#[derive(Default)]
pub struct MockBackend {
    pub result: Option<SearchResult>,
    pub indexer: Indexer,
    pub requests: Mutex<Vec<SearchRequest>>,
    pub indexed: Mutex<Vec<IndexDocument>>,
    pub deleted: Mutex<Vec<Guid>>,
}

impl MockBackend {
    pub fn new() -> Self { Self::default() }

    pub fn with_result(result: SearchResult) -> Self { Self { result: Some(result), ..Self::default() } }

    /// A backend whose searches always fail.
    pub fn failing() -> Self { Self::default() }
}

#[async_trait::async_trait]
impl SearchBackend for MockBackend {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResult, SearchError> {
        self.requests.lock().await.push(req.clone());
        self.result.clone().ok_or_else(|| SearchError::Transport("mock: no result configured".into()))
    }

    async fn index(&self, entity: &Entity) -> IndexOutcome {
        let outcome = self.indexer.build(entity, &mut TagRegistry::default());
        if let Some(doc) = outcome.document() { self.indexed.lock().await.push(doc.clone()); }
        outcome
    }

    async fn delete(&self, guid: Guid) -> BackendResult<()> {
        self.deleted.lock().await.push(guid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csolr_core::EntityKind;

    #[tokio::test]
    async fn mock_records_and_fails_without_result() {
        let mock = MockBackend::failing();
        let req = SearchRequest::default().with_query("seo");
        assert!(matches!(mock.search(&req).await, Err(SearchError::Transport(_))));
        assert_eq!(mock.requests.lock().await.len(), 1);

        let mock = MockBackend::with_result(SearchResult { hits: vec![], count: 0 });
        assert_eq!(mock.search(&req).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn mock_index_skips_other_kinds() {
        let mock = MockBackend::new();
        let blog = Entity::new(1, EntityKind::new("object", "blog"));
        assert_eq!(mock.index(&blog).await, IndexOutcome::Skipped);
        let plugin = Entity::new(2, EntityKind::plugin_project());
        assert!(mock.index(&plugin).await.is_indexed());
        mock.delete(2).await.unwrap();
        assert_eq!(mock.indexed.lock().await.len(), 1);
        assert_eq!(*mock.deleted.lock().await, vec![2]);
    }

    #[test]
    fn backend_error_serializes() {
        let e = BackendError::Transport("down".into());
        assert_eq!(serde_json::to_string(&e).unwrap(), r#"{"Transport":"down"}"#);
    }
}
