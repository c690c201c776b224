//! community-solr Solr client – select and update over HTTP

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub mod wire;

pub use wire::{DisMax, DocId, HighlightMap, Highlighting, SelectQuery, SelectResponse, SolrDoc, UpdateCommand};

#[derive(Debug, thiserror::Error)]
pub enum SolrError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(String),
}

pub type SolrResult<T> = Result<T, SolrError>;

/// Connection settings for the Solr core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolrConfig {
    /// Core URL without trailing slash, e.g. `http://127.0.0.1:8983/solr/elgg`.
    pub base_url: String,
    pub timeout: Duration,
    /// Skip the commit after updates (bulk reindex relies on autocommit).
    pub nocommit: bool,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:8983/solr/elgg".to_string(), timeout: Duration::from_secs(10), nocommit: false }
    }
}

impl SolrConfig {
    /// Read `CSOLR_SOLR_URL`, `CSOLR_SOLR_TIMEOUT_SECS` and `CSOLR_NOCOMMIT`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let base_url = std::env::var("CSOLR_SOLR_URL").ok().filter(|s| !s.is_empty()).unwrap_or(d.base_url);
        let timeout = std::env::var("CSOLR_SOLR_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(d.timeout);
        let nocommit = std::env::var("CSOLR_NOCOMMIT").map(|v| matches!(v.as_str(), "1" | "true" | "yes")).unwrap_or(false);
        Self { base_url: base_url.trim_end_matches('/').to_string(), timeout, nocommit }
    }

    pub fn commit(&self) -> bool { !self.nocommit }
}

/// The two Solr round-trips the service needs. `HttpSolr` talks to a real
/// server; tests substitute an in-memory double.
#[async_trait::async_trait]
pub trait SolrClient: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> SolrResult<SelectResponse>;
    async fn update(&self, command: &UpdateCommand) -> SolrResult<()>;
}

pub struct HttpSolr {
    http: reqwest::Client,
    cfg: SolrConfig,
}

impl HttpSolr {
    pub fn new(cfg: SolrConfig) -> SolrResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| SolrError::Transport(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    pub fn config(&self) -> &SolrConfig { &self.cfg }

    fn url(&self, handler: &str) -> String { format!("{}/{}", self.cfg.base_url, handler) }

    async fn check(resp: reqwest::Response) -> SolrResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() { return Ok(resp); }
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(512).collect();
        Err(SolrError::Status { status: status.as_u16(), body })
    }
}

#[async_trait::async_trait]
impl SolrClient for HttpSolr {
    async fn select(&self, query: &SelectQuery) -> SolrResult<SelectResponse> {
        let t0 = Instant::now();
        let params = query.to_params();
        debug!(params = params.len(), start = query.start, rows = query.rows, "solr: select");
        let resp = self
            .http
            .get(self.url("select"))
            .query(&params)
            .send()
            .await
            .map_err(|e| SolrError::Transport(e.to_string()))?;
        let resp = Self::check(resp).await?;
        let parsed: SelectResponse = resp.json().await.map_err(|e| SolrError::Decode(e.to_string()))?;
        metrics::histogram!("solr_select_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(num_found = parsed.num_found(), docs = parsed.docs().len(), took_ms = %t0.elapsed().as_millis(), "solr: select ok");
        Ok(parsed)
    }

    async fn update(&self, command: &UpdateCommand) -> SolrResult<()> {
        let t0 = Instant::now();
        let commit = if command.commit() { "true" } else { "false" };
        let resp = self
            .http
            .post(self.url("update"))
            .query(&[("commit", commit), ("wt", "json")])
            .json(&command.body())
            .send()
            .await
            .map_err(|e| SolrError::Transport(e.to_string()))?;
        match Self::check(resp).await {
            Ok(_) => {
                metrics::histogram!("solr_update_ms", t0.elapsed().as_secs_f64() * 1000.0);
                info!(commit, took_ms = %t0.elapsed().as_millis(), "solr: update ok");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "solr: update rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_commits() {
        let cfg = SolrConfig::default();
        assert!(cfg.commit());
        assert!(cfg.base_url.ends_with("/solr/elgg"));
    }

    #[test]
    fn url_joins_handler() {
        let cfg = SolrConfig { base_url: "http://solr:8983/solr/core".into(), ..Default::default() };
        let solr = HttpSolr::new(cfg).unwrap();
        assert_eq!(solr.url("select"), "http://solr:8983/solr/core/select");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let cfg = SolrConfig { base_url: "http://127.0.0.1:9/solr/none".into(), timeout: Duration::from_millis(500), nocommit: true };
        let solr = HttpSolr::new(cfg).unwrap();
        let err = solr.select(&SelectQuery::default()).await.unwrap_err();
        assert!(matches!(err, SolrError::Transport(_)), "got {err}");
    }
}
