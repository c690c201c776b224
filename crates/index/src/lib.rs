//! community-solr indexer: project a plugin project entity onto the Solr
//! document shape.
//!
//! Projection is pure. Sending the document is the backend's job; see
//! `csolr-api`.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use csolr_core::{Entity, EntityKind, IndexDocument, TagRegistry};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator between a metadata name and its value inside the `tags` field.
pub const TAG_SEPARATOR: &str = "%%";
/// Metadata name registered for the duration of a plugin projection.
pub const CATEGORY_TAG: &str = "plugincat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "doc", rename_all = "lowercase")]
pub enum IndexOutcome {
    /// Entity kind is not registered for search; nothing to send.
    Skipped,
    Indexed(IndexDocument),
}

impl IndexOutcome {
    pub fn document(&self) -> Option<&IndexDocument> {
        match self { Self::Indexed(d) => Some(d), Self::Skipped => None }
    }
    pub fn is_indexed(&self) -> bool { matches!(self, Self::Indexed(_)) }
}

/// Builds index documents for registered entity kinds.
#[derive(Debug, Clone)]
pub struct Indexer {
    kinds: BTreeSet<EntityKind>,
}

impl Default for Indexer {
    fn default() -> Self { Self::new([EntityKind::plugin_project()]) }
}

impl Indexer {
    pub fn new<I: IntoIterator<Item = EntityKind>>(registered_kinds: I) -> Self {
        Self { kinds: registered_kinds.into_iter().collect() }
    }

    pub fn handles(&self, kind: &EntityKind) -> bool { self.kinds.contains(kind) }

    /// Project `entity`. `plugincat` is registered as a tag name only while
    /// the tags are collected; the registry is back to its previous state when
    /// this returns.
    pub fn build(&self, entity: &Entity, registry: &mut TagRegistry) -> IndexOutcome {
        if !self.handles(&entity.kind) {
            debug!(guid = entity.guid, kind = %entity.kind.key(), "index: kind not registered");
            counter!("index_skipped_total", 1u64);
            return IndexOutcome::Skipped;
        }
        let tags = {
            let scope = registry.scoped(CATEGORY_TAG);
            tag_values(entity, &scope)
        };
        let doc = IndexDocument {
            id: entity.guid,
            type_: entity.kind.type_.clone(),
            subtype: entity.kind.subtype.clone(),
            owner_guid: entity.owner_guid,
            container_guid: entity.container_guid,
            access_id: entity.access_id,
            title: entity.title.clone(),
            name: entity.name.clone(),
            description: format!("{} {}", entity.summary, entity.description).trim().to_string(),
            time_created: entity.time_created,
            tags,
            plugincat_s: entity.category.clone().filter(|c| !c.is_empty()),
            license_s: entity.license.clone().filter(|l| !l.is_empty()),
            version_ss: release_versions(entity),
            screenshots_i: u8::from(!entity.screenshots.is_empty()),
        };
        debug!(guid = doc.id, tags = doc.tags.len(), versions = doc.version_ss.len(), "index: document built");
        IndexOutcome::Indexed(doc)
    }
}

/// `name%%value` for every registered name and each of its values.
pub fn tag_values(entity: &Entity, registry: &TagRegistry) -> Vec<String> {
    let mut out = Vec::new();
    for name in registry.names() {
        for value in entity.metadata_values(name) {
            if value.is_empty() { continue; }
            out.push(format!("{}{}{}", name, TAG_SEPARATOR, value));
        }
    }
    out
}

/// Union of every release's target versions, first-seen order.
pub fn release_versions(entity: &Entity) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in entity.releases.iter().flat_map(|r| r.elgg_versions.iter()) {
        if !v.is_empty() && !out.contains(v) { out.push(v.clone()); }
    }
    out
}
