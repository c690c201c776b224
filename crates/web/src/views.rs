//! HTML fragments for the search page.

use csolr_core::MatchedEntity;
use csolr_persist::FacetCatalog;
use csolr_search::{FacetSettings, FilterInput};

pub use csolr_search::snippet::escape_html as escape;

pub const PAGE_TITLE: &str = "Search plugins";
pub const NO_RESULTS: &str = "No plugins found";
pub const NO_RESULTS_INFO: &str = "Try a different search term or remove some of the filters.";
/// Page links shown on either side of the current page.
const PAGE_WINDOW: usize = 2;

/// `Showing N results (A-B)`, or the no-results heading when `count` is 0.
pub fn heading(count: u64, offset: usize, limit: usize) -> String {
    if count == 0 { return NO_RESULTS.to_string(); }
    let first = (offset as u64).saturating_add(1);
    let last = (offset as u64).saturating_add(limit as u64).min(count);
    format!("Showing {} results ({}-{})", count, first, last)
}

/// Result list. Matched title/description are HTML from the result mapper:
/// escaped text plus highlight markup.
pub fn entity_list(hits: &[MatchedEntity]) -> String {
    if hits.is_empty() { return String::new(); }
    let mut out = String::from("<ul class=\"elgg-list elgg-list-entity\">");
    for h in hits {
        out.push_str(&format!(
            "<li class=\"elgg-item\" id=\"elgg-object-{guid}\"><h3><a href=\"/plugins/{guid}\">{title}</a></h3><div class=\"elgg-subtext\">{desc}</div></li>",
            guid = h.entity.guid,
            title = h.matched_title,
            desc = h.matched_description,
        ));
    }
    out.push_str("</ul>");
    out
}

fn page_href(base: &[(String, String)], offset: usize) -> String {
    let mut pairs: Vec<(&str, String)> = base.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    pairs.push(("offset", offset.to_string()));
    let qs = serde_urlencoded::to_string(&pairs).unwrap_or_default();
    format!("/plugins/search?{}", escape(&qs))
}

/// Previous/next and numbered page links. `base` holds every request
/// parameter except `offset`.
pub fn pagination(count: u64, offset: usize, limit: usize, base: &[(String, String)]) -> String {
    if limit == 0 || count <= limit as u64 { return String::new(); }
    let pages = count.div_ceil(limit as u64) as usize;
    let current = offset / limit;
    let mut out = String::from("<ul class=\"elgg-pagination\">");
    if current > 0 {
        out.push_str(&format!("<li><a href=\"{}\">&laquo; Previous</a></li>", page_href(base, (current - 1) * limit)));
    }
    let lo = current.saturating_sub(PAGE_WINDOW);
    let hi = current.saturating_add(PAGE_WINDOW).min(pages - 1);
    for p in lo..=hi {
        if p == current {
            out.push_str(&format!("<li class=\"elgg-state-selected\"><span>{}</span></li>", p + 1));
        } else {
            out.push_str(&format!("<li><a href=\"{}\">{}</a></li>", page_href(base, p * limit), p + 1));
        }
    }
    if current.saturating_add(1) < pages {
        out.push_str(&format!("<li><a href=\"{}\">Next &raquo;</a></li>", page_href(base, (current + 1) * limit)));
    }
    out.push_str("</ul>");
    out
}

fn selected<'a>(current: &'a FilterInput, key: &str) -> Vec<&'a str> {
    current.get(key).map(|v| v.as_list()).unwrap_or_default()
}

fn checkbox_group(legend: &str, name: &str, options: &[String], chosen: &[&str]) -> String {
    let mut out = format!("<fieldset><legend>{}</legend>", escape(legend));
    for opt in options {
        let checked = if chosen.contains(&opt.as_str()) { " checked" } else { "" };
        out.push_str(&format!(
            "<label><input type=\"checkbox\" name=\"{}\" value=\"{}\"{}> {}</label>",
            name,
            escape(opt),
            checked,
            escape(opt)
        ));
    }
    out.push_str("</fieldset>");
    out
}

/// Filter form for the enabled facets, reflecting the current selections.
pub fn sidebar(settings: &FacetSettings, catalog: &FacetCatalog, current: &FilterInput) -> String {
    let mut out = String::from("<form class=\"plugins-filters\" method=\"get\" action=\"/plugins/search\">");
    if settings.text {
        let text = current.get("t").map(|v| v.as_scalar()).unwrap_or("");
        out.push_str(&format!("<input type=\"text\" name=\"f[t]\" value=\"{}\">", escape(text)));
    }
    if settings.category {
        out.push_str(&checkbox_group("Categories", "f[c][]", &catalog.categories, &selected(current, "c")));
    }
    if settings.version {
        out.push_str(&checkbox_group("Elgg versions", "f[v][]", &catalog.versions, &selected(current, "v")));
    }
    if settings.license {
        out.push_str(&checkbox_group("Licenses", "f[l][]", &catalog.licenses, &selected(current, "l")));
    }
    if settings.screenshot {
        let checked = if current.get("s").is_some_and(|v| v.is_truthy()) { " checked" } else { "" };
        out.push_str(&format!("<label><input type=\"checkbox\" name=\"f[s]\" value=\"1\"{}> With screenshot</label>", checked));
    }
    out.push_str("<input type=\"submit\" value=\"Filter\"></form>");
    out
}

/// One-sidebar layout.
pub fn page(heading: &str, content: &str, sidebar: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\
<div class=\"elgg-layout elgg-layout-one-sidebar\"><div class=\"elgg-main\"><h2 class=\"elgg-heading-main\">{heading}</h2>{content}</div>\
<div class=\"elgg-sidebar\">{sidebar}</div></div></body></html>\n",
        title = PAGE_TITLE,
        heading = escape(heading),
        content = content,
        sidebar = sidebar,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use csolr_search::FilterValue;

    #[test]
    fn heading_clamps_last_index() {
        assert_eq!(heading(23, 20, 10), "Showing 23 results (21-23)");
        assert_eq!(heading(23, 0, 10), "Showing 23 results (1-10)");
        assert_eq!(heading(0, 0, 10), NO_RESULTS);
    }

    #[test]
    fn huge_offsets_do_not_overflow() {
        assert!(heading(5, usize::MAX, 10).starts_with("Showing 5 results"));
        let html = pagination(50, usize::MAX, 1, &[]);
        assert!(html.contains("Previous"));
        assert!(!html.contains("Next"));
    }

    #[test]
    fn escape_covers_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn pagination_preserves_filters() {
        let base = vec![("f[c][]".to_string(), "tools".to_string())];
        let html = pagination(35, 10, 10, &base);
        assert!(html.contains("/plugins/search?f%5Bc%5D%5B%5D=tools&amp;offset=0"));
        assert!(html.contains("offset=20"));
        assert!(html.contains("<span>2</span>"));
        assert!(html.contains("Next"));
        assert!(pagination(10, 0, 10, &base).is_empty());
    }

    #[test]
    fn sidebar_shows_enabled_facets_only() {
        let catalog = FacetCatalog { categories: vec!["tools".into(), "themes".into()], licenses: vec!["gpl2".into()], versions: vec!["1.8".into()] };
        let mut current = FilterInput::new();
        current.insert("c".into(), FilterValue::List(vec!["themes".into()]));
        let settings = FacetSettings { category: true, screenshot: true, ..Default::default() };
        let html = sidebar(&settings, &catalog, &current);
        assert!(html.contains("value=\"themes\" checked"));
        assert!(html.contains("value=\"tools\">"));
        assert!(html.contains("name=\"f[s]\""));
        assert!(!html.contains("gpl2"));
        assert!(!html.contains("f[t]"));
    }
}
