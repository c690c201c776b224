//! Text snippets for result listings: tag stripping, excerpts, and
//! highlighted context windows around query words.

#![forbid(unsafe_code)]

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters of context kept on each side of a match.
pub const MIN_MATCH_CONTEXT: usize = 30;
/// Upper bound on the combined length of extracted windows.
pub const MAX_SNIPPET_LEN: usize = 300;
/// Query words shorter than this are not highlighted.
pub const MIN_WORD_CHARS: usize = 3;

pub const HIGHLIGHT_TAG: &str = "strong";
pub const HIGHLIGHT_CLASS: &str = "search-highlight search-highlight-color";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

pub fn strip_tags(s: &str) -> String { TAG_RE.replace_all(s, "").into_owned() }

/// Escape text for HTML element and attribute content.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// First `num_chars` characters of the tag-stripped text, cut back to the last
/// space and suffixed with `...` when shortened.
pub fn excerpt(text: &str, num_chars: usize) -> String {
    let text = strip_tags(text);
    let text = text.trim();
    let total = text.chars().count();
    if total <= num_chars { return text.to_string(); }
    let head: String = text.chars().take(num_chars).collect();
    let cut = head.rfind(' ').unwrap_or(head.len());
    let mut out = head[..cut].trim().to_string();
    if out.chars().count() != total { out.push_str("..."); }
    out
}

/// Words of a free-text query worth highlighting: boolean operators and quotes
/// removed, short words dropped, case-insensitive duplicates removed.
pub fn query_words(query: &str) -> Vec<String> {
    let cleaned: String = strip_tags(query).chars().filter(|c| !matches!(c, '"' | '+' | '-' | '~' | '(' | ')' | '*' | '\\')).collect();
    let mut out: Vec<String> = Vec::new();
    for w in cleaned.split_whitespace() {
        if w.chars().count() < MIN_WORD_CHARS { continue; }
        if out.iter().any(|o| o.to_lowercase() == w.to_lowercase()) { continue; }
        out.push(w.to_string());
    }
    out
}

/// Wrap every case-insensitive occurrence of each word in a highlight tag.
/// Word `i` (1-based) gets color class `i`; earlier words win on overlap.
/// `text` is plain text: everything outside the highlight tags is escaped.
pub fn highlight_words(words: &[String], text: &str) -> String {
    let mut claimed: Vec<(usize, usize, usize)> = Vec::new(); // (start, end, color)
    for (i, w) in words.iter().enumerate() {
        let Ok(re) = Regex::new(&format!("(?i){}", regex::escape(w))) else { continue };
        for m in re.find_iter(text) {
            let overlaps = claimed.iter().any(|(s, e, _)| m.start() < *e && *s < m.end());
            if !overlaps { claimed.push((m.start(), m.end(), i + 1)); }
        }
    }
    if claimed.is_empty() { return escape_html(text); }
    claimed.sort_by_key(|(s, _, _)| *s);
    let mut out = String::with_capacity(text.len() + claimed.len() * 64);
    let mut at = 0usize;
    for (s, e, color) in claimed {
        out.push_str(&escape_html(&text[at..s]));
        out.push_str(&format!("<{HIGHLIGHT_TAG} class=\"{HIGHLIGHT_CLASS}{color}\">"));
        out.push_str(&escape_html(&text[s..e]));
        out.push_str(&format!("</{HIGHLIGHT_TAG}>"));
        at = e;
    }
    out.push_str(&escape_html(&text[at..]));
    out
}

fn lower_chars(s: &str) -> Vec<char> {
    s.chars().map(|c| c.to_lowercase().next().unwrap_or(c)).collect()
}

fn positions(hay: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > hay.len() { return Vec::new(); }
    (0..=hay.len() - needle.len()).filter(|&i| hay[i..i + needle.len()] == *needle).collect()
}

/// Merge overlapping `(start, end)` windows. Output is sorted by start.
fn consolidate(mut windows: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    windows.sort_unstable();
    let mut out: Vec<(usize, usize)> = Vec::with_capacity(windows.len());
    for (s, e) in windows {
        match out.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => out.push((s, e)),
        }
    }
    out
}

/// Tag-stripped `haystack` reduced to the windows around the query words,
/// joined with `...` and with the words highlighted. Short haystacks are
/// returned whole. The result is HTML: only the highlight tags are markup.
pub fn relevant_substrings(haystack: &str, query: &str) -> String {
    let haystack = strip_tags(haystack);
    let words = query_words(query);
    let chars: Vec<char> = haystack.chars().collect();
    let len = chars.len();
    if len <= MAX_SNIPPET_LEN { return highlight_words(&words, &haystack); }

    let lower = lower_chars(&haystack);
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for w in &words {
        let needle = lower_chars(w);
        for pos in positions(&lower, &needle) {
            let start = pos.saturating_sub(MIN_MATCH_CONTEXT);
            let end = (pos + needle.len() + MIN_MATCH_CONTEXT).min(len);
            windows.push((start, end));
        }
    }
    let mut windows = consolidate(windows);
    if windows.is_empty() {
        let head: String = chars[..MAX_SNIPPET_LEN].iter().collect();
        return format!("{}...", escape_html(head.trim_end()));
    }

    // Spread the unused budget over the windows for extra context.
    let total: usize = windows.iter().map(|(s, e)| e - s).sum();
    if total < MAX_SNIPPET_LEN {
        let add = (MAX_SNIPPET_LEN - total) / windows.len() / 2;
        windows = consolidate(windows.into_iter().map(|(s, e)| (s.saturating_sub(add), (e + add).min(len))).collect());
    }

    // Keep the widest windows (closest-together terms) within the budget.
    let mut by_width = windows.clone();
    by_width.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));
    let mut kept: Vec<(usize, usize)> = Vec::new();
    let mut used = 0usize;
    for (s, e) in by_width {
        if used + (e - s) > MAX_SNIPPET_LEN { continue; }
        used += e - s;
        kept.push((s, e));
    }
    if kept.is_empty() {
        // A single window wider than the budget: trim it around its start.
        let (s, _) = windows[0];
        kept.push((s, (s + MAX_SNIPPET_LEN).min(len)));
    }
    kept.sort_unstable();

    let parts: Vec<String> = kept.iter().map(|(s, e)| chars[*s..*e].iter().collect::<String>().trim().to_string()).collect();
    let mut matched = parts.join("...");
    if kept.first().map(|(s, _)| *s != 0).unwrap_or(false) { matched = format!("...{matched}"); }
    if kept.last().map(|(_, e)| *e < len).unwrap_or(false) { matched.push_str("..."); }
    highlight_words(&words, &matched)
}
