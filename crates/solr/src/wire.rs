//! Solr request/response shapes (JSON response writer, dismax + highlighting).

#![forbid(unsafe_code)]

use std::collections::HashMap;

use csolr_core::{FilterQueries, Guid, IndexDocument, SortDirection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisMax {
    /// `qf`, e.g. `title^2 description^1`.
    pub query_fields: String,
    /// `bq`, optional additive boost.
    pub boost_query: Option<String>,
    /// `q.alt`, used by Solr when `q` is absent.
    pub query_alternative: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Highlighting {
    pub fields: Vec<String>,
    pub simple_pre: String,
    pub simple_post: String,
}

/// A select request. Built by the query builder, rendered to URL params here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectQuery {
    pub start: usize,
    pub rows: usize,
    pub fields: Vec<String>,
    pub sorts: Vec<(String, SortDirection)>,
    /// Free text; `None` means "match all" via `q.alt`.
    pub query: Option<String>,
    pub dismax: DisMax,
    pub filter_queries: FilterQueries,
    pub highlighting: Option<Highlighting>,
}

impl SelectQuery {
    pub fn sort_param(&self) -> String {
        self.sorts.iter().map(|(f, d)| format!("{} {}", f, d.as_str())).collect::<Vec<_>>().join(",")
    }

    /// URL parameters in a stable order. `fq` repeats once per filter query.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut p: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| p.push((k.to_string(), v));
        push("wt", "json".into());
        push("defType", "dismax".into());
        if let Some(q) = self.query.as_deref().filter(|q| !q.is_empty()) { push("q", q.to_string()); }
        push("q.alt", self.dismax.query_alternative.clone());
        if !self.dismax.query_fields.is_empty() { push("qf", self.dismax.query_fields.clone()); }
        if let Some(bq) = &self.dismax.boost_query { push("bq", bq.clone()); }
        push("start", self.start.to_string());
        push("rows", self.rows.to_string());
        if !self.fields.is_empty() { push("fl", self.fields.join(",")); }
        if !self.sorts.is_empty() { push("sort", self.sort_param()); }
        for (_key, fq) in self.filter_queries.iter() { push("fq", fq.to_string()); }
        if let Some(hl) = &self.highlighting {
            push("hl", "true".into());
            push("hl.fl", hl.fields.join(","));
            push("hl.simple.pre", hl.simple_pre.clone());
            push("hl.simple.post", hl.simple_post.clone());
        }
        p
    }
}

/// Solr ids come back as strings or numbers depending on the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId { Int(i64), Str(String) }

impl DocId {
    pub fn guid(&self) -> Option<Guid> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn key(&self) -> String {
        match self { Self::Int(n) => n.to_string(), Self::Str(s) => s.clone() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolrDoc {
    pub id: DocId,
    #[serde(default)]
    pub title: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseBody {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub docs: Vec<SolrDoc>,
}

/// Per-document highlight fragments: doc id -> field -> fragments.
pub type HighlightMap = HashMap<String, HashMap<String, Vec<String>>>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectResponse {
    pub response: ResponseBody,
    /// Absent when the highlighting component did not run.
    #[serde(default)]
    pub highlighting: Option<HighlightMap>,
}

impl SelectResponse {
    pub fn num_found(&self) -> u64 { self.response.num_found }
    pub fn docs(&self) -> &[SolrDoc] { &self.response.docs }

    /// Highlighting component output; `None` when the component is missing.
    pub fn highlighting(&self) -> Option<&HighlightMap> { self.highlighting.as_ref() }
}

/// Update request against `/update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCommand {
    Add { docs: Vec<IndexDocument>, commit: bool },
    Delete { ids: Vec<Guid>, commit: bool },
}

impl UpdateCommand {
    pub fn commit(&self) -> bool {
        match self { Self::Add { commit, .. } | Self::Delete { commit, .. } => *commit }
    }

    /// JSON body understood by Solr's JSON update handler.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::Add { docs, .. } => serde_json::to_value(docs).unwrap_or(serde_json::Value::Array(Vec::new())),
            Self::Delete { ids, .. } => {
                let ids: Vec<String> = ids.iter().map(|g| g.to_string()).collect();
                serde_json::json!({ "delete": ids })
            }
        }
    }
}
