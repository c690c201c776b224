//! community-solr core types
//!
//! Entities as the CMS hands them to us, the search request/result pair, the
//! filter-query map, and the Solr index document projection.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod registry;

pub use registry::{TagRegistry, TagScope};

pub type Guid = i64;

/// Entity type/subtype registered with the search plugin.
pub const PLUGIN_TYPE: &str = "object";
pub const PLUGIN_SUBTYPE: &str = "plugin_project";

/// `{type, subtype}` pair identifying what kind of entity we hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKind {
    #[serde(rename = "type")]
    pub type_: String,
    pub subtype: String,
}

impl EntityKind {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self { type_: type_.into(), subtype: subtype.into() }
    }

    pub fn plugin_project() -> Self { Self::new(PLUGIN_TYPE, PLUGIN_SUBTYPE) }

    /// `object:plugin_project` style key.
    pub fn key(&self) -> String { format!("{}:{}", self.type_, self.subtype) }
}

/// A release sub-object of a plugin project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Release {
    pub guid: Guid,
    /// Declared target framework versions, e.g. `["1.8", "1.9"]`.
    #[serde(default)]
    pub elgg_versions: Vec<String>,
}

/// Entity as loaded from the CMS store. The only mutable thing search does
/// with it is wrap it in a [`MatchedEntity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub guid: Guid,
    pub kind: EntityKind,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: i64,
    /// Unix seconds.
    pub time_created: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default)]
    pub screenshots: Vec<Guid>,
    /// Remaining metadata by name.
    #[serde(default)]
    pub metadata: BTreeMap<String, Vec<String>>,
}

impl Entity {
    pub fn new(guid: Guid, kind: EntityKind) -> Self {
        Self {
            guid,
            kind,
            owner_guid: 0,
            container_guid: 0,
            access_id: 0,
            time_created: 0,
            title: String::new(),
            name: String::new(),
            summary: String::new(),
            description: String::new(),
            tags: Vec::new(),
            category: None,
            license: None,
            releases: Vec::new(),
            screenshots: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Values stored under a metadata name. `tags`, `plugincat` and `license`
    /// live in typed fields; everything else comes from `metadata`.
    pub fn metadata_values(&self, name: &str) -> Vec<String> {
        match name {
            "tags" => self.tags.clone(),
            "plugincat" => self.category.iter().cloned().collect(),
            "license" => self.license.iter().cloned().collect(),
            other => self.metadata.get(other).cloned().unwrap_or_default(),
        }
    }
}

// ---------------- Filter queries ----------------

/// Named Solr filter-query fragments. Keys are unique: inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterQueries(Vec<(String, String)>);

pub mod fq_keys {
    pub const CATEGORY: &str = "cat";
    pub const LICENSE: &str = "license";
    pub const VERSION: &str = "version";
    pub const SCREENSHOT: &str = "screenshot";
    pub const OWNER: &str = "owner";
    pub const PLUGINCAT: &str = "plugincat";
    pub const TYPE: &str = "type";
    pub const SUBTYPE: &str = "subtype";
    pub const ACCESS: &str = "access";
}

impl FilterQueries {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool { self.get(key).is_some() }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; `other` wins on key collision.
    pub fn merged_with(mut self, other: &FilterQueries) -> Self {
        for (k, v) in other.iter() { self.insert(k, v); }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterQueries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fq = FilterQueries::new();
        for (k, v) in iter { fq.insert(k, v); }
        fq
    }
}

// ---------------- Search request / result ----------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection { Asc, #[default] Desc }

impl SortDirection {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") { Self::Asc } else { Self::Desc }
    }
    pub fn as_str(&self) -> &'static str { match self { Self::Asc => "asc", Self::Desc => "desc" } }
}

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_SORT: &str = "created";

/// One search invocation. Built per HTTP request and not modified afterwards;
/// the `with_*` builders consume and return `Self`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub offset: usize,
    pub limit: usize,
    pub query: String,
    pub sort: String,
    pub direction: SortDirection,
    pub fq: FilterQueries,
    /// Plugin category selected through the `category` parameter (`all` means none).
    pub category: Option<String>,
    /// Access collections visible to the viewer; empty means no access filter.
    pub access_ids: Vec<i64>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            query: String::new(),
            sort: DEFAULT_SORT.to_string(),
            direction: SortDirection::Desc,
            fq: FilterQueries::new(),
            category: None,
            access_ids: Vec::new(),
        }
    }
}

impl SearchRequest {
    pub fn new(offset: usize, limit: usize) -> Result<Self, CoreError> {
        if limit == 0 { return Err(CoreError::Validation("limit must be greater than zero".into())); }
        Ok(Self { offset, limit, ..Self::default() })
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self { self.query = query.into(); self }
    pub fn with_fq(mut self, fq: FilterQueries) -> Self { self.fq = fq; self }
    pub fn with_sort(mut self, sort: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = sort.into();
        self.direction = direction;
        self
    }
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.is_empty());
        self
    }
    pub fn with_access_ids(mut self, ids: Vec<i64>) -> Self { self.access_ids = ids; self }
}

/// Entity plus the transient text shown in result listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchedEntity {
    pub entity: Entity,
    pub matched_title: String,
    pub matched_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub hits: Vec<MatchedEntity>,
    /// Total number of documents Solr matched (not just this page).
    pub count: u64,
}

impl SearchResult {
    pub fn empty() -> Self { Self::default() }
}

// ---------------- Index document ----------------

/// Solr projection of a plugin project. `id` is the entity guid and is the
/// key used to join hits back to entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexDocument {
    pub id: Guid,
    #[serde(rename = "type")]
    pub type_: String,
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: i64,
    pub title: String,
    pub name: String,
    pub description: String,
    pub time_created: i64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugincat_s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_s: Option<String>,
    pub version_ss: Vec<String>,
    pub screenshots_i: u8,
}

// ---------------- Collaborator traits ----------------

/// Bulk entity lookup provided by the host CMS.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch all entities with the given guids in one call. Missing or
    /// inaccessible guids are simply absent from the result.
    async fn get_many(&self, guids: &[Guid]) -> StoreResult<Vec<Entity>>;
}

/// Username resolution for the `owner` filter.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn guid_by_username(&self, username: &str) -> Option<Guid>;
}

pub type StoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("store: {0}")]
    Store(String),
}

pub mod prelude {
    pub use super::{
        fq_keys, CoreError, Entity, EntityKind, EntityStore, FilterQueries, Guid, IndexDocument,
        MatchedEntity, Release, SearchRequest, SearchResult, SortDirection, StoreResult, TagRegistry,
        TagScope, UserDirectory,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_queries_overwrite_in_place() {
        let mut fq = FilterQueries::new();
        fq.insert("cat", "plugincat_s:(\"a\")");
        fq.insert("owner", "owner_guid:3");
        fq.insert("cat", "plugincat_s:(\"b\")");
        assert_eq!(fq.len(), 2);
        let keys: Vec<&str> = fq.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cat", "owner"]);
        assert_eq!(fq.get("cat"), Some("plugincat_s:(\"b\")"));
    }

    #[test]
    fn merged_with_prefers_overlay() {
        let base: FilterQueries = [("access", "access_id:(2)"), ("type", "type:user")].into_iter().collect();
        let overlay: FilterQueries = [("type", "type:object")].into_iter().collect();
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.get("type"), Some("type:object"));
        assert_eq!(merged.get("access"), Some("access_id:(2)"));
    }

    #[test]
    fn request_rejects_zero_limit() {
        assert!(SearchRequest::new(0, 0).is_err());
        let req = SearchRequest::new(20, 10).unwrap().with_category(Some(String::new()));
        assert_eq!(req.offset, 20);
        assert_eq!(req.category, None);
    }

    #[test]
    fn metadata_values_map_typed_fields() {
        let mut e = Entity::new(7, EntityKind::plugin_project());
        e.tags = vec!["seo".into()];
        e.category = Some("tools".into());
        e.metadata.insert("mood".into(), vec!["happy".into()]);
        assert_eq!(e.metadata_values("tags"), vec!["seo"]);
        assert_eq!(e.metadata_values("plugincat"), vec!["tools"]);
        assert!(e.metadata_values("license").is_empty());
        assert_eq!(e.metadata_values("mood"), vec!["happy"]);
    }

    #[test]
    fn index_document_serializes_solr_field_names() {
        let doc = IndexDocument { id: 5, type_: "object".into(), subtype: "plugin_project".into(), ..Default::default() };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["type"], "object");
        assert_eq!(v["screenshots_i"], 0);
        assert!(v.get("plugincat_s").is_none());
    }
}
