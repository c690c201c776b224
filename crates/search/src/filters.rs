//! Filter codec: short-keyed HTTP filters (`f[t]`, `f[c][]`, `f[l][]`,
//! `f[v][]`, `f[s]`) plus the `owner` username, turned into a free-text query
//! and named Solr filter queries. Facets switched off by the site admin are
//! dropped silently.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use csolr_core::{fq_keys, FilterQueries, UserDirectory};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const FIELD_CATEGORY: &str = "plugincat_s";
pub const FIELD_LICENSE: &str = "license_s";
pub const FIELD_VERSION: &str = "version_ss";
pub const SCREENSHOT_FQ: &str = "screenshots_i:1";

/// Which facets the site admin enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacetSettings {
    pub text: bool,
    pub category: bool,
    pub license: bool,
    pub version: bool,
    pub screenshot: bool,
}

fn flag_enabled(v: Option<&serde_json::Value>) -> bool {
    match v {
        Some(serde_json::Value::String(s)) => s == "enabled",
        Some(serde_json::Value::Array(items)) => items.iter().any(|i| i.as_str() == Some("enabled")),
        _ => false,
    }
}

impl FacetSettings {
    pub fn all_enabled() -> Self {
        Self { text: true, category: true, license: true, version: true, screenshot: true }
    }

    /// Parse the stored settings blob. Missing or malformed blobs disable
    /// every facet.
    pub fn from_blob(blob: Option<&str>) -> Self {
        let Some(raw) = blob.filter(|b| !b.trim().is_empty()) else { return Self::default() };
        let v: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "search settings blob is not valid JSON; facets disabled");
                return Self::default();
            }
        };
        let Some(obj) = v.as_object() else {
            warn!("search settings blob is not an object; facets disabled");
            return Self::default();
        };
        Self {
            text: flag_enabled(obj.get("text")),
            category: flag_enabled(obj.get("category")),
            license: flag_enabled(obj.get("license")) || flag_enabled(obj.get("licence")),
            version: flag_enabled(obj.get("version")),
            screenshot: flag_enabled(obj.get("screenshot")),
        }
    }

    pub fn to_blob(&self) -> String {
        let mut m = serde_json::Map::new();
        for (name, on) in [("text", self.text), ("category", self.category), ("license", self.license), ("version", self.version), ("screenshot", self.screenshot)] {
            if on { m.insert(name.to_string(), serde_json::json!(["enabled"])); }
        }
        serde_json::Value::Object(m).to_string()
    }
}

/// A single filter parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

impl FilterValue {
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            Self::Scalar(s) if s.is_empty() => Vec::new(),
            Self::Scalar(s) => vec![s.as_str()],
            Self::List(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }

    pub fn as_scalar(&self) -> &str {
        match self {
            Self::Scalar(s) => s.as_str(),
            Self::List(v) => v.first().map(|s| s.as_str()).unwrap_or(""),
        }
    }

    pub fn is_truthy(&self) -> bool {
        let s = self.as_scalar().trim();
        !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("off"))
    }
}

/// Short key -> value map as found under `f[...]`.
pub type FilterInput = BTreeMap<String, FilterValue>;

/// Collect `f[key]`, `f[key][]` and `f[key][n]` pairs from decoded query
/// parameters. Other parameters are ignored.
pub fn parse_filter_pairs<'a, I>(pairs: I) -> FilterInput
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = FilterInput::new();
    for (k, v) in pairs {
        let Some(rest) = k.strip_prefix("f[") else { continue };
        let Some(close) = rest.find(']') else { continue };
        let key = &rest[..close];
        if key.is_empty() { continue; }
        let tail = &rest[close + 1..];
        if tail.is_empty() {
            out.insert(key.to_string(), FilterValue::Scalar(v.to_string()));
        } else if tail.starts_with('[') && tail.ends_with(']') {
            let slot = out.entry(key.to_string()).or_insert_with(|| FilterValue::List(Vec::new()));
            match slot {
                FilterValue::List(list) => list.push(v.to_string()),
                FilterValue::Scalar(_) => *slot = FilterValue::List(vec![v.to_string()]),
            }
        }
    }
    out
}

/// Output of the codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFilters {
    /// Free-text query; `None` when unset or the text facet is off.
    pub query: Option<String>,
    pub fq: FilterQueries,
}

/// `field:("a","b")`. Quotes and backslashes inside values are escaped.
pub fn quoted_or_list(field: &str, values: &[&str]) -> String {
    let list = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}:({})", field, list)
}

/// Translate the filter map under the given facet settings. Pure; the owner
/// filter is added by [`decode`].
pub fn decode_filters(input: &FilterInput, settings: &FacetSettings) -> DecodedFilters {
    let mut out = DecodedFilters::default();
    for (key, value) in input {
        match key.as_str() {
            "t" if settings.text => {
                let q = value.as_scalar();
                if !q.is_empty() { out.query = Some(q.to_string()); }
            }
            "c" if settings.category => {
                let list = value.as_list();
                if !list.is_empty() { out.fq.insert(fq_keys::CATEGORY, quoted_or_list(FIELD_CATEGORY, &list)); }
            }
            "l" if settings.license => {
                let list = value.as_list();
                if !list.is_empty() { out.fq.insert(fq_keys::LICENSE, quoted_or_list(FIELD_LICENSE, &list)); }
            }
            "v" if settings.version => {
                let list = value.as_list();
                if !list.is_empty() { out.fq.insert(fq_keys::VERSION, quoted_or_list(FIELD_VERSION, &list)); }
            }
            "s" if settings.screenshot => {
                if value.is_truthy() { out.fq.insert(fq_keys::SCREENSHOT, SCREENSHOT_FQ); }
            }
            other => debug!(key = %other, "filter ignored"),
        }
    }
    out
}

/// Full codec: facet filters plus `owner_guid:<guid>` when `owner` resolves.
pub async fn decode(
    input: &FilterInput,
    owner: Option<&str>,
    settings: &FacetSettings,
    users: &dyn UserDirectory,
) -> DecodedFilters {
    let mut out = decode_filters(input, settings);
    if let Some(username) = owner.map(str::trim).filter(|u| !u.is_empty()) {
        match users.guid_by_username(username).await {
            Some(guid) => out.fq.insert(fq_keys::OWNER, format!("owner_guid:{}", guid)),
            None => debug!(owner = %username, "owner filter: unknown username"),
        }
    }
    out
}
