//! Result mapping: Solr hits and highlight fragments joined back onto
//! entities from the CMS store.

#![forbid(unsafe_code)]

use csolr_core::{Entity, EntityStore, Guid, MatchedEntity, SearchResult};
use csolr_solr::SelectResponse;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::snippet;
use crate::SearchError;

/// Separator between multiple highlight fragments of one field.
pub const FRAGMENT_SEPARATOR: &str = " (...) ";
/// Length of the description excerpt used when nothing was highlighted.
pub const DESCRIPTION_EXCERPT_CHARS: usize = 100;

/// Highlighted text for one Solr document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocSnippets {
    pub guid: Guid,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Snippets for every returned document, in Solr's relevance order.
/// Fails when the highlighting section is missing from the response.
pub fn extract_snippets(resp: &SelectResponse, query: &str) -> Result<Vec<DocSnippets>, SearchError> {
    let highlighting = resp
        .highlighting()
        .ok_or_else(|| SearchError::Highlighting("response has no highlighting section".into()))?;
    let mut out = Vec::with_capacity(resp.docs().len());
    for doc in resp.docs() {
        let Some(guid) = doc.id.guid() else {
            warn!(id = %doc.id.key(), "solr document id is not a guid; skipped");
            continue;
        };
        let mut snip = DocSnippets { guid, ..Default::default() };
        if let Some(fields) = highlighting.get(&doc.id.key()) {
            for (field, fragments) in fields {
                if fragments.is_empty() { continue; }
                let joined = fragments.join(FRAGMENT_SEPARATOR);
                let text = snippet::relevant_substrings(&snippet::strip_tags(&joined), query);
                match field.as_str() {
                    "title" => snip.title = Some(text),
                    "description" => snip.description = Some(text),
                    other => debug!(field = %other, "highlight for unmapped field ignored"),
                }
            }
        }
        out.push(snip);
    }
    Ok(out)
}

/// Attach snippets to the fetched entities. Output follows the order of
/// `snippets`; guids the store did not return are dropped. Matched text is
/// HTML; the plain-text fallbacks are escaped.
pub fn reconcile(snippets: &[DocSnippets], entities: Vec<Entity>) -> Vec<MatchedEntity> {
    let mut by_guid: FxHashMap<Guid, Entity> = entities.into_iter().map(|e| (e.guid, e)).collect();
    let mut out = Vec::with_capacity(snippets.len());
    for s in snippets {
        let Some(entity) = by_guid.remove(&s.guid) else { continue };
        let matched_title = s.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| snippet::escape_html(&entity.title));
        let matched_description = s
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| snippet::escape_html(&snippet::excerpt(&entity.description, DESCRIPTION_EXCERPT_CHARS)));
        out.push(MatchedEntity { entity, matched_title, matched_description });
    }
    out
}

/// Map a select response to a [`SearchResult`] with a single bulk entity fetch.
pub async fn map_response(resp: &SelectResponse, query: &str, store: &dyn EntityStore) -> Result<SearchResult, SearchError> {
    let snippets = extract_snippets(resp, query)?;
    let count = resp.num_found();
    if snippets.is_empty() {
        return Ok(SearchResult { hits: Vec::new(), count });
    }
    let guids: Vec<Guid> = snippets.iter().map(|s| s.guid).collect();
    let entities = store.get_many(&guids).await.map_err(|e| SearchError::Store(e.to_string()))?;
    if entities.len() < guids.len() {
        debug!(requested = guids.len(), fetched = entities.len(), "some hits not visible in store");
    }
    Ok(SearchResult { hits: reconcile(&snippets, entities), count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use csolr_core::EntityKind;

    fn entity(guid: Guid, title: &str, description: &str) -> Entity {
        let mut e = Entity::new(guid, EntityKind::plugin_project());
        e.title = title.into();
        e.description = description.into();
        e
    }

    fn response(raw: &str) -> SelectResponse { serde_json::from_str(raw).unwrap() }

    #[test]
    fn fragments_are_joined_stripped_and_rehighlighted() {
        let resp = response(r#"{
            "response": {"numFound": 1, "docs": [{"id": "10"}]},
            "highlighting": {"10": {
                "title": ["<strong class=\"search-highlight search-highlight-color1\">Blog</strong> tools"],
                "description": ["a <strong>blog</strong> thing", "another blog"]
            }}
        }"#);
        let snips = extract_snippets(&resp, "blog").unwrap();
        assert_eq!(snips.len(), 1);
        assert_eq!(snips[0].title.as_deref(), Some("<strong class=\"search-highlight search-highlight-color1\">Blog</strong> tools"));
        let d = snips[0].description.as_deref().unwrap();
        assert!(d.contains(" (...) "));
        assert_eq!(d.matches("color1\">blog</strong>").count(), 2);
    }

    #[test]
    fn missing_highlighting_is_an_error() {
        let resp = response(r#"{"response": {"numFound": 1, "docs": [{"id": "10"}]}}"#);
        assert!(matches!(extract_snippets(&resp, "x"), Err(SearchError::Highlighting(_))));
    }

    #[test]
    fn reconcile_applies_fallbacks_and_keeps_relevance_order() {
        let snips = vec![
            DocSnippets { guid: 2, title: Some("<b>two</b>".into()), description: None },
            DocSnippets { guid: 9, title: None, description: None },
            DocSnippets { guid: 1, title: None, description: Some("matched".into()) },
        ];
        let long = "word ".repeat(40);
        let entities = vec![entity(1, "One", "desc one"), entity(2, "Two", &long)];
        let out = reconcile(&snips, entities);
        let guids: Vec<Guid> = out.iter().map(|m| m.entity.guid).collect();
        assert_eq!(guids, vec![2, 1]);
        assert_eq!(out[0].matched_title, "<b>two</b>");
        assert!(out[0].matched_description.ends_with("..."));
        assert!(out[0].matched_description.chars().count() <= 103);
        assert_eq!(out[1].matched_title, "One");
        assert_eq!(out[1].matched_description, "matched");
    }

    #[test]
    fn fallback_text_is_escaped() {
        let snips = vec![DocSnippets { guid: 1, title: None, description: None }];
        let out = reconcile(&snips, vec![entity(1, "<img src=x onerror=alert(1)>", "Tom & \"Jerry\" <b")]);
        assert_eq!(out[0].matched_title, "&lt;img src=x onerror=alert(1)&gt;");
        assert_eq!(out[0].matched_description, "Tom &amp; &quot;Jerry&quot; &lt;b");
    }
}
