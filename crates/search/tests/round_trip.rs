#![forbid(unsafe_code)]

use std::sync::Mutex;

use csolr_core::{CoreError, Entity, EntityKind, EntityStore, Guid, SearchRequest, StoreResult};
use csolr_search::{decode_filters, parse_filter_pairs, search, FacetSettings, SearchError, SearchTuning};
use csolr_solr::{SelectQuery, SelectResponse, SolrClient, SolrError, SolrResult, UpdateCommand};

/// Replays a canned JSON body (or fails) and records the last select.
struct CannedSolr {
    body: Option<&'static str>,
    last: Mutex<Option<SelectQuery>>,
}

impl CannedSolr {
    fn ok(body: &'static str) -> Self { Self { body: Some(body), last: Mutex::new(None) } }
    fn down() -> Self { Self { body: None, last: Mutex::new(None) } }
}

#[async_trait::async_trait]
impl SolrClient for CannedSolr {
    async fn select(&self, query: &SelectQuery) -> SolrResult<SelectResponse> {
        *self.last.lock().unwrap() = Some(query.clone());
        match self.body {
            Some(b) => serde_json::from_str(b).map_err(|e| SolrError::Decode(e.to_string())),
            None => Err(SolrError::Transport("connection refused".into())),
        }
    }

    async fn update(&self, _command: &UpdateCommand) -> SolrResult<()> { Ok(()) }
}

struct Store {
    entities: Vec<Entity>,
    calls: Mutex<usize>,
}

#[async_trait::async_trait]
impl EntityStore for Store {
    async fn get_many(&self, guids: &[Guid]) -> StoreResult<Vec<Entity>> {
        *self.calls.lock().unwrap() += 1;
        // Return in guid order, not request order, like a SQL IN() lookup.
        let mut out: Vec<Entity> = self.entities.iter().filter(|e| guids.contains(&e.guid)).cloned().collect();
        out.sort_by_key(|e| e.guid);
        Ok(out)
    }
}

struct BrokenStore;

#[async_trait::async_trait]
impl EntityStore for BrokenStore {
    async fn get_many(&self, _guids: &[Guid]) -> StoreResult<Vec<Entity>> {
        Err(CoreError::Store("database gone".into()))
    }
}

fn plugin(guid: Guid, title: &str) -> Entity {
    let mut e = Entity::new(guid, EntityKind::plugin_project());
    e.title = title.to_string();
    e.description = format!("{title} description");
    e
}

fn store() -> Store {
    Store { entities: vec![plugin(1, "Alpha"), plugin(2, "Beta"), plugin(3, "Gamma")], calls: Mutex::new(0) }
}

#[tokio::test]
async fn zero_hits_is_an_empty_result_not_a_failure() {
    let solr = CannedSolr::ok(r#"{"response": {"numFound": 0, "docs": []}, "highlighting": {}}"#);
    let st = store();
    let res = search(&solr, &st, &SearchRequest::default(), &SearchTuning::default()).await.unwrap();
    assert_eq!(res.count, 0);
    assert!(res.hits.is_empty());
    assert_eq!(*st.calls.lock().unwrap(), 0, "no store round-trip without hits");
}

#[tokio::test]
async fn client_failure_surfaces_as_error() {
    let solr = CannedSolr::down();
    let res = search(&solr, &store(), &SearchRequest::default(), &SearchTuning::default()).await;
    assert!(matches!(res, Err(SearchError::Transport(_))));
}

#[tokio::test]
async fn store_failure_surfaces_as_error() {
    let solr = CannedSolr::ok(r#"{"response": {"numFound": 1, "docs": [{"id": "1"}]}, "highlighting": {}}"#);
    let res = search(&solr, &BrokenStore, &SearchRequest::default(), &SearchTuning::default()).await;
    assert!(matches!(res, Err(SearchError::Store(_))));
}

#[tokio::test]
async fn hits_follow_relevance_order_with_one_bulk_fetch() {
    let solr = CannedSolr::ok(r#"{
        "response": {"numFound": 12, "docs": [{"id": "3"}, {"id": "1"}, {"id": "2"}]},
        "highlighting": {"3": {"title": ["<strong>Gamma</strong>"]}, "1": {}, "2": {}}
    }"#);
    let st = store();
    let req = SearchRequest::new(0, 3).unwrap().with_query("gamma");
    let res = search(&solr, &st, &req, &SearchTuning::default()).await.unwrap();
    assert_eq!(res.count, 12);
    let guids: Vec<Guid> = res.hits.iter().map(|h| h.entity.guid).collect();
    assert_eq!(guids, vec![3, 1, 2]);
    assert_eq!(res.hits[0].matched_title, "<strong class=\"search-highlight search-highlight-color1\">Gamma</strong>");
    assert_eq!(res.hits[1].matched_title, "Alpha");
    assert_eq!(res.hits[1].matched_description, "Alpha description");
    assert_eq!(*st.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn decoded_filters_reach_the_select() {
    let settings = FacetSettings { category: true, screenshot: true, ..Default::default() };
    let input = parse_filter_pairs([("f[c][]", "community"), ("f[s]", "1")]);
    let decoded = decode_filters(&input, &settings);
    assert_eq!(decoded.query, None);

    let solr = CannedSolr::ok(r#"{"response": {"numFound": 0, "docs": []}, "highlighting": {}}"#);
    let req = SearchRequest::default().with_fq(decoded.fq);
    let tuning = SearchTuning { title_boost: 2.0, description_boost: 1.0, ..Default::default() };
    search(&solr, &store(), &req, &tuning).await.unwrap();

    let sent = solr.last.lock().unwrap().clone().unwrap();
    let params = sent.to_params();
    let fqs: Vec<&str> = params.iter().filter(|(k, _)| k == "fq").map(|(_, v)| v.as_str()).collect();
    assert_eq!(fqs, vec![r#"plugincat_s:("community")"#, "screenshots_i:1", "type:object", "subtype:plugin_project"]);
    assert!(params.iter().any(|(k, v)| k == "qf" && v == "title^2 description^1"));
    assert!(!params.iter().any(|(k, _)| k == "q"));
}
