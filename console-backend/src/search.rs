//! Fuzzy ranking for the global search.

use async_graphql::Enum;

/// Rank returned when the query does not match at all.
pub const NO_MATCH: i32 = -1;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    App,
    Job,
    Team,
}

/// Rank `target` against `query`; lower is better.
///
/// A target matches when the case-folded query is a subsequence of the case-folded target. The
/// rank of a match is the Levenshtein distance between them.
pub fn rank(query: &str, target: &str) -> i32 {
    let query = query.to_lowercase();
    let target = target.to_lowercase();

    if !is_subsequence(&query, &target) {
        return NO_MATCH;
    }
    strsim::levenshtein(&query, &target) as i32
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut haystack = haystack.chars();
    needle.chars().all(|c| haystack.any(|h| h == c))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub rank: i32,
    pub name: String,
    pub node: T,
}

/// Drop non-matches and order the rest by rank, then name.
pub fn rank_all<T>(query: &str, candidates: impl IntoIterator<Item = (String, T)>) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .map(|(name, node)| Ranked {
            rank: rank(query, &name),
            name,
            node,
        })
        .filter(|r| r.rank != NO_MATCH)
        .collect();

    ranked.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
    ranked
}
