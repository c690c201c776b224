//! Select query assembly: paging, fixed relevance sort, dismax field boosts,
//! optional boost query, filter queries and highlighting.

#![forbid(unsafe_code)]

use csolr_core::{fq_keys, FilterQueries, SearchRequest, SortDirection, PLUGIN_SUBTYPE, PLUGIN_TYPE};
use csolr_solr::{DisMax, Highlighting, SelectQuery};

pub const HIGHLIGHT_PRE: &str = "<strong class=\"search-highlight search-highlight-color1\">";
pub const HIGHLIGHT_POST: &str = "</strong>";
pub const MATCH_ALL: &str = "*:*";

/// Relevance knobs read from site configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTuning {
    /// Field boosted as the title in `qf`.
    pub title_field: String,
    pub title_boost: f64,
    pub description_boost: f64,
    /// Explicit `bq` expression; wins over the recency boost.
    pub boost_query: Option<String>,
    /// Boost documents created within this many days.
    pub recent_days: Option<u32>,
    pub recent_weight: f64,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self { title_field: "title".into(), title_boost: 1.5, description_boost: 1.0, boost_query: None, recent_days: None, recent_weight: 2.0 }
    }
}

impl SearchTuning {
    /// `CSOLR_TITLE_FIELD`, `CSOLR_TITLE_BOOST`, `CSOLR_DESCRIPTION_BOOST`,
    /// `CSOLR_BOOST_QUERY`, `CSOLR_BOOST_RECENT_DAYS`, `CSOLR_BOOST_RECENT_WEIGHT`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            title_field: var("CSOLR_TITLE_FIELD").unwrap_or(d.title_field),
            title_boost: var("CSOLR_TITLE_BOOST").and_then(|s| s.parse().ok()).unwrap_or(d.title_boost),
            description_boost: var("CSOLR_DESCRIPTION_BOOST").and_then(|s| s.parse().ok()).unwrap_or(d.description_boost),
            boost_query: var("CSOLR_BOOST_QUERY"),
            recent_days: var("CSOLR_BOOST_RECENT_DAYS").and_then(|s| s.parse().ok()),
            recent_weight: var("CSOLR_BOOST_RECENT_WEIGHT").and_then(|s| s.parse().ok()).unwrap_or(d.recent_weight),
        }
    }

    /// `title^<b> description^<b>`.
    pub fn query_fields(&self) -> String {
        format!("{}^{} description^{}", self.title_field, self.title_boost, self.description_boost)
    }

    /// Boost expression for `bq`, relative to `now` (unix seconds).
    pub fn boost_query_at(&self, now: i64) -> Option<String> {
        if let Some(bq) = &self.boost_query { return Some(bq.clone()); }
        let days = self.recent_days?;
        let since = now - i64::from(days) * 86_400;
        Some(format!("time_created:[{} TO *]^{}", since, self.recent_weight))
    }
}

const SPECIAL_CHARS: &[char] = &['\\', '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '~', '*', '?', ':', '"', ';', ' ', '/'];

/// Backslash-escape Solr query syntax characters.
pub fn escape_query_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if SPECIAL_CHARS.contains(&c) { out.push('\\'); }
        out.push(c);
    }
    out
}

/// Filter queries every search starts from. Currently the viewer's access
/// collections.
pub fn default_filter_queries(req: &SearchRequest) -> FilterQueries {
    let mut fq = FilterQueries::new();
    if !req.access_ids.is_empty() {
        let ids = req.access_ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" OR ");
        fq.insert(fq_keys::ACCESS, format!("access_id:({})", ids));
    }
    fq
}

/// Defaults, then caller filters, then the forced type/subtype and category
/// filters. Later entries replace earlier ones with the same key.
pub fn effective_filter_queries(req: &SearchRequest) -> FilterQueries {
    let mut own = req.fq.clone();
    own.insert(fq_keys::TYPE, format!("type:{}", PLUGIN_TYPE));
    own.insert(fq_keys::SUBTYPE, format!("subtype:{}", PLUGIN_SUBTYPE));
    if let Some(cat) = req.category.as_deref().filter(|c| !c.is_empty() && *c != "all") {
        own.insert(fq_keys::PLUGINCAT, format!("tags:\"{}\"", escape_query_chars(&format!("plugincat%%{}", cat))));
    }
    default_filter_queries(req).merged_with(&own)
}

pub fn build_select(req: &SearchRequest, tuning: &SearchTuning) -> SelectQuery {
    build_select_at(req, tuning, chrono::Utc::now().timestamp())
}

/// [`build_select`] with an explicit clock, for deterministic boost queries.
pub fn build_select_at(req: &SearchRequest, tuning: &SearchTuning, now: i64) -> SelectQuery {
    let query = Some(req.query.trim().to_string()).filter(|q| !q.is_empty());
    SelectQuery {
        start: req.offset,
        rows: req.limit,
        fields: vec!["id".into(), "title".into(), "description".into()],
        sorts: vec![("score".into(), SortDirection::Desc), ("time_created".into(), SortDirection::Desc)],
        query,
        dismax: DisMax {
            query_fields: tuning.query_fields(),
            boost_query: tuning.boost_query_at(now),
            query_alternative: MATCH_ALL.into(),
        },
        filter_queries: effective_filter_queries(req),
        highlighting: Some(Highlighting {
            fields: vec!["title".into(), "description".into()],
            simple_pre: HIGHLIGHT_PRE.into(),
            simple_post: HIGHLIGHT_POST.into(),
        }),
    }
}
