//! community-solr search: filter codec, select query builder and result
//! mapping for `object:plugin_project`.
//!
//! Flow: [`filters::decode`] turns request parameters into a query string and
//! filter queries, [`query::build_select`] assembles the Solr request, and
//! [`mapper::map_response`] joins hits and highlight snippets back onto
//! entities. [`search`] runs the whole round-trip.

#![forbid(unsafe_code)]

use std::time::Instant;

use csolr_core::{EntityStore, SearchRequest, SearchResult};
use csolr_solr::SolrClient;
use tracing::{error, info};

pub mod filters;
pub mod mapper;
pub mod query;
pub mod snippet;

pub use filters::{decode, decode_filters, parse_filter_pairs, DecodedFilters, FacetSettings, FilterInput, FilterValue};
pub use query::{build_select, SearchTuning};

/// Why a search produced no result. Callers treat every variant as "no
/// results" but must not confuse it with a successful zero-hit search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("highlighting: {0}")]
    Highlighting(String),
    #[error("store: {0}")]
    Store(String),
}

/// Build, execute and map one search. Failures are logged once here and
/// returned; there is no retry.
pub async fn search(
    solr: &dyn SolrClient,
    store: &dyn EntityStore,
    req: &SearchRequest,
    tuning: &SearchTuning,
) -> Result<SearchResult, SearchError> {
    let t0 = Instant::now();
    metrics::counter!("search_requests_total", 1u64);
    let select = build_select(req, tuning);
    info!(query = %req.query, offset = req.offset, limit = req.limit, fq = select.filter_queries.len(), "search: start");

    let res = match solr.select(&select).await {
        Ok(resp) => mapper::map_response(&resp, &req.query, store).await,
        Err(e) => Err(SearchError::Transport(e.to_string())),
    };
    metrics::histogram!("search_ms", t0.elapsed().as_secs_f64() * 1000.0);
    match &res {
        Ok(r) => info!(count = r.count, hits = r.hits.len(), took_ms = %t0.elapsed().as_millis(), "search: ok"),
        Err(e) => {
            metrics::counter!("search_failures_total", 1u64);
            error!(error = %e, took_ms = %t0.elapsed().as_millis(), "search: failed");
        }
    }
    res
}
