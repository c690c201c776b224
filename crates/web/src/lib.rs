//! community-solr page controller: `GET /plugins/search`.
//!
//! Reads the facet switches from plugin settings, decodes the `f[...]`
//! filters, asks the [`SearchBackend`] and renders the result page.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::RawQuery;
use axum::response::Html;
use axum::routing::get;
use axum::{Extension, Router};
use csolr_api::{SearchBackend, SolrBackend};
use csolr_core::{EntityKind, SearchRequest, SearchResult, SortDirection, UserDirectory, DEFAULT_LIMIT, DEFAULT_SORT};
use csolr_persist::{FacetCatalog, SettingsStore, SqliteStore, SEARCH_SETTINGS, SETTINGS_PLUGIN};
use csolr_search::{FacetSettings, FilterInput, SearchTuning};
use csolr_solr::{HttpSolr, SolrConfig};
use tracing::{error, info, warn};

pub mod views;

/// Everything a page request needs.
pub struct AppState {
    pub backend: Arc<dyn SearchBackend>,
    pub settings: Arc<dyn SettingsStore>,
    pub users: Arc<dyn UserDirectory>,
    pub catalog: FacetCatalog,
}

impl AppState {
    /// Wire the Solr backend and the SQLite catalog from `CSOLR_*` variables.
    pub fn from_env() -> Result<Self> {
        let cfg = SolrConfig::from_env();
        let solr = Arc::new(HttpSolr::new(cfg.clone()).context("building solr client")?);
        let store = Arc::new(SqliteStore::open_default()?);
        let catalog = store.facet_catalog(&EntityKind::plugin_project())?;
        info!(solr = %cfg.base_url, categories = catalog.categories.len(), versions = catalog.versions.len(), "web: state ready");
        let backend = SolrBackend::new(solr, store.clone(), SearchTuning::from_env()).with_config(&cfg);
        Ok(Self { backend: Arc::new(backend), settings: store.clone(), users: store, catalog })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/plugins/search", get(handle_search))
        .route("/healthz", get(handle_health))
        .layer(Extension(state))
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "web: listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("web: shutdown requested");
        })
        .await
        .context("http server")?;
    Ok(())
}

async fn handle_health() -> &'static str { "ok" }

async fn handle_search(RawQuery(raw): RawQuery, Extension(state): Extension<Arc<AppState>>) -> Html<String> {
    Html(search_page(&state, raw.as_deref().unwrap_or("")).await)
}

/// Plain (non-filter) page parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub offset: usize,
    pub limit: usize,
    pub sort: String,
    pub direction: SortDirection,
    pub owner: Option<String>,
    pub category: Option<String>,
}

impl PageParams {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let get = |k: &str| pairs.iter().rev().find(|(pk, _)| pk == k).map(|(_, v)| v.as_str());
        Self {
            offset: get("offset").and_then(|v| v.trim().parse().ok()).unwrap_or(0),
            limit: get("limit").and_then(|v| v.trim().parse().ok()).filter(|l: &usize| *l > 0).unwrap_or(DEFAULT_LIMIT),
            sort: get("sort").filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SORT).to_string(),
            direction: get("direction").map(SortDirection::parse).unwrap_or_default(),
            owner: get("owner").map(str::to_string).filter(|o| !o.is_empty()),
            category: get("category").map(str::to_string).filter(|c| !c.is_empty()),
        }
    }
}

/// Decode the raw query string. Undecodable input is treated as empty.
pub fn query_pairs(raw: &str) -> Vec<(String, String)> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "web: undecodable query string ignored");
            Vec::new()
        }
    }
}

fn load_settings(store: &dyn SettingsStore) -> FacetSettings {
    match store.get_setting(SETTINGS_PLUGIN, SEARCH_SETTINGS) {
        Ok(blob) => FacetSettings::from_blob(blob.as_deref()),
        Err(e) => {
            warn!(error = %e, "web: search settings unavailable; facets disabled");
            FacetSettings::default()
        }
    }
}

/// Build the search page for one request.
pub async fn search_page(state: &AppState, raw_query: &str) -> String {
    let t0 = Instant::now();
    metrics::counter!("web_search_pages_total", 1u64);
    let pairs = query_pairs(raw_query);
    let params = PageParams::from_pairs(&pairs);
    let settings = load_settings(state.settings.as_ref());
    let filters: FilterInput = csolr_search::parse_filter_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let decoded = csolr_search::decode(&filters, params.owner.as_deref(), &settings, state.users.as_ref()).await;

    let result = match SearchRequest::new(params.offset, params.limit) {
        Ok(req) => {
            let req = req
                .with_query(decoded.query.unwrap_or_default())
                .with_fq(decoded.fq)
                .with_sort(params.sort.clone(), params.direction)
                .with_category(params.category.clone());
            match state.backend.search(&req).await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "web: search failed; rendering empty result");
                    SearchResult::empty()
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "web: invalid paging");
            SearchResult::empty()
        }
    };

    let heading = views::heading(result.count, params.offset, params.limit);
    let mut content = String::new();
    if result.count == 0 {
        content.push_str(&format!("<p>{}</p>", views::NO_RESULTS_INFO));
    }
    content.push_str(&views::entity_list(&result.hits));
    let base: Vec<(String, String)> = pairs.iter().filter(|(k, _)| k != "offset").cloned().collect();
    content.push_str(&views::pagination(result.count, params.offset, params.limit, &base));
    let sidebar = views::sidebar(&settings, &state.catalog, &filters);
    info!(count = result.count, hits = result.hits.len(), took_ms = %t0.elapsed().as_millis(), "web: search page rendered");
    views::page(&heading, &content, &sidebar)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &str) -> Vec<(String, String)> { query_pairs(raw) }

    #[test]
    fn page_params_defaults() {
        let p = PageParams::from_pairs(&pairs(""));
        assert_eq!(p, PageParams { offset: 0, limit: 10, sort: "created".into(), direction: SortDirection::Desc, owner: None, category: None });
    }

    #[test]
    fn page_params_parse_and_ignore_junk() {
        let p = PageParams::from_pairs(&pairs("offset=20&limit=0&sort=title&direction=ASC&owner=cash&category=all"));
        assert_eq!(p.offset, 20);
        assert_eq!(p.limit, 10);
        assert_eq!(p.sort, "title");
        assert_eq!(p.direction, SortDirection::Asc);
        assert_eq!(p.owner.as_deref(), Some("cash"));
        assert_eq!(p.category.as_deref(), Some("all"));
        assert_eq!(PageParams::from_pairs(&pairs("offset=abc")).offset, 0);
    }

    #[test]
    fn bracketed_keys_survive_decoding() {
        let p = pairs("f%5Bc%5D%5B%5D=tools&f[s]=1");
        assert_eq!(p, vec![("f[c][]".to_string(), "tools".to_string()), ("f[s]".to_string(), "1".to_string())]);
    }
}
