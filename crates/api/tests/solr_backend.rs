use std::sync::{Arc, Mutex};

use csolr_api::{BackendError, SearchBackend, SearchError, SolrBackend};
use csolr_core::{Entity, EntityKind, EntityStore, Guid, SearchRequest, StoreResult, TagRegistry};
use csolr_index::IndexOutcome;
use csolr_search::SearchTuning;
use csolr_solr::{SelectQuery, SelectResponse, SolrClient, SolrConfig, SolrError, SolrResult, UpdateCommand};

#[derive(Default)]
struct FakeSolr {
    select_body: Option<&'static str>,
    reject_updates: bool,
    updates: Mutex<Vec<UpdateCommand>>,
}

#[async_trait::async_trait]
impl SolrClient for FakeSolr {
    async fn select(&self, _query: &SelectQuery) -> SolrResult<SelectResponse> {
        match self.select_body {
            Some(b) => serde_json::from_str(b).map_err(|e| SolrError::Decode(e.to_string())),
            None => Err(SolrError::Status { status: 500, body: "boom".into() }),
        }
    }

    async fn update(&self, command: &UpdateCommand) -> SolrResult<()> {
        self.updates.lock().unwrap().push(command.clone());
        if self.reject_updates { Err(SolrError::Transport("refused".into())) } else { Ok(()) }
    }
}

struct Catalog(Vec<Entity>);

#[async_trait::async_trait]
impl EntityStore for Catalog {
    async fn get_many(&self, guids: &[Guid]) -> StoreResult<Vec<Entity>> {
        Ok(self.0.iter().filter(|e| guids.contains(&e.guid)).cloned().collect())
    }
}

fn plugin(guid: Guid) -> Entity {
    let mut e = Entity::new(guid, EntityKind::plugin_project());
    e.title = format!("Plugin {guid}");
    e.category = Some("tools".into());
    e
}

fn backend(solr: Arc<FakeSolr>) -> SolrBackend {
    SolrBackend::new(solr, Arc::new(Catalog(vec![plugin(1), plugin(2)])), SearchTuning::default())
}

#[tokio::test]
async fn zero_hits_and_failures_are_distinct() {
    let empty = Arc::new(FakeSolr { select_body: Some(r#"{"response":{"numFound":0,"docs":[]},"highlighting":{}}"#), ..Default::default() });
    let res = backend(empty).search(&SearchRequest::default()).await.unwrap();
    assert_eq!(res.count, 0);

    let broken = Arc::new(FakeSolr::default());
    let err = backend(broken).search(&SearchRequest::default()).await.unwrap_err();
    assert!(matches!(err, SearchError::Transport(_)));
}

#[tokio::test]
async fn search_maps_hits_to_entities() {
    let solr = Arc::new(FakeSolr {
        select_body: Some(r#"{"response":{"numFound":2,"docs":[{"id":"2"},{"id":"1"}]},"highlighting":{"2":{},"1":{}}}"#),
        ..Default::default()
    });
    let res = backend(solr).search(&SearchRequest::default().with_query("plugin")).await.unwrap();
    assert_eq!(res.count, 2);
    let titles: Vec<&str> = res.hits.iter().map(|h| h.matched_title.as_str()).collect();
    assert_eq!(titles, vec!["Plugin 2", "Plugin 1"]);
}

#[tokio::test]
async fn index_sends_document_and_restores_registry() {
    let solr = Arc::new(FakeSolr::default());
    let b = backend(solr.clone()).with_registry(TagRegistry::new(["tags"]));
    let outcome = b.index(&plugin(1)).await;
    let doc = outcome.document().unwrap();
    assert_eq!(doc.tags, vec!["plugincat%%tools"]);
    assert_eq!(b.tag_names().await, vec!["tags"]);

    let updates = solr.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(matches!(&updates[0], UpdateCommand::Add { docs, commit: true } if docs[0].id == 1));
}

#[tokio::test]
async fn update_failure_still_reports_indexed() {
    let solr = Arc::new(FakeSolr { reject_updates: true, ..Default::default() });
    let cfg = SolrConfig { nocommit: true, ..Default::default() };
    let b = backend(solr.clone()).with_config(&cfg);
    assert!(b.index(&plugin(2)).await.is_indexed());
    assert!(matches!(&solr.updates.lock().unwrap()[0], UpdateCommand::Add { commit: false, .. }));
}

#[tokio::test]
async fn unregistered_kind_sends_nothing() {
    let solr = Arc::new(FakeSolr::default());
    let b = backend(solr.clone());
    let entity = Entity::new(9, EntityKind::new("user", ""));
    let outcome = b.index(&entity);
    assert_eq!(outcome.await, IndexOutcome::Skipped);
    assert!(solr.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delete_surfaces_transport_errors() {
    let ok = Arc::new(FakeSolr::default());
    backend(ok.clone()).delete(5).await.unwrap();
    assert_eq!(ok.updates.lock().unwrap()[0], UpdateCommand::Delete { ids: vec![5], commit: true });

    let down = Arc::new(FakeSolr { reject_updates: true, ..Default::default() });
    assert!(matches!(backend(down).delete(5).await, Err(BackendError::Transport(_))));
}
