//! Helpers shared by index drivers: result shaping and fuzzy queries.

use strata_core::{
    build_search_groups, ItemType, RawSearchResult, SearchResponse, SearchResults,
};

/// Shape driver hits into a response. Groups are sorted by title; with
/// `id_only` the ids are returned as found.
pub fn build_search_response(
    item_type: ItemType,
    raw: RawSearchResult,
    id_only: bool,
) -> SearchResponse {
    let RawSearchResult {
        total_hits,
        more_results,
        hits,
    } = raw;

    let results = if id_only {
        SearchResults::Ids(hits.into_iter().map(|hit| hit.id).collect())
    } else {
        let mut groups = build_search_groups(hits);
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        SearchResults::Groups(groups)
    };

    SearchResponse {
        item_type,
        total_hits,
        more_results,
        results,
    }
}

/// Lucene special characters, escaped in user text
const LUCENE_SPECIAL: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
    '/',
];

/// Distinct whitespace-separated tokens, first-seen order, escaped for Lucene
pub fn unique_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in text.split_whitespace() {
        let token = escape_lucene(raw);
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

pub fn escape_lucene(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if LUCENE_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Fuzzy Lucene query matching `text` as a phrase, each token within
/// `fuzziness`, and the last token as a prefix when it is at least
/// `min_prefix_len` long. With `properties` every clause is fielded.
pub fn lucene_fuzzy_query(
    text: &str,
    properties: &[String],
    fuzziness: f64,
    min_prefix_len: usize,
) -> String {
    let tokens = unique_tokens(text);
    let mut clauses = vec![format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))];

    for (i, token) in tokens.iter().enumerate() {
        if fuzziness >= 1.0 {
            clauses.push(token.clone());
        } else {
            clauses.push(format!("{token}~{:.1}", (fuzziness * 10.0).round() / 10.0));
        }
        let last = i + 1 == tokens.len();
        if last && token.chars().count() >= min_prefix_len {
            clauses.push(format!("{token}*"));
        }
    }

    let clauses = clauses.join(" ");
    if properties.is_empty() {
        return clauses;
    }
    properties
        .iter()
        .map(|property| format!("{}:({clauses})", escape_lucene(property)))
        .collect::<Vec<_>>()
        .join(" ")
}
