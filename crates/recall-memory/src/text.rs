// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenization and keyword extraction shared by clustering, ranking,
//! and the keyword retrieval strategy.

use std::collections::{HashMap, HashSet};

/// Tokens at or below this length never count as content tokens.
const MIN_CONTENT_TOKEN_LEN: usize = 3;

/// Common English function words excluded from keywords and token sets.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "cannot", "could", "couldn't", "did", "didn't", "do", "does",
    "doesn't", "doing", "don't", "down", "during", "each", "even", "ever", "every", "few", "for",
    "from", "further", "had", "hadn't", "has", "hasn't", "have", "haven't", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
    "is", "isn't", "it", "it's", "its", "itself", "just", "let's", "like", "many", "me", "more",
    "most", "much", "must", "my", "myself", "never", "no", "nor", "not", "now", "of", "off",
    "on", "once", "only", "or", "other", "ought", "our", "ours", "ourselves", "out", "over",
    "own", "really", "same", "she", "should", "shouldn't", "so", "some", "such", "than", "that",
    "that's", "the", "their", "theirs", "them", "themselves", "then", "there", "there's",
    "these", "they", "they're", "thing", "things", "this", "those", "through", "to", "too",
    "under", "until", "up", "upon", "very", "was", "wasn't", "we", "we're", "were", "weren't",
    "what", "what's", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "won't", "would", "wouldn't", "yeah", "yes", "you", "you're", "your", "yours", "yourself",
    "yourselves",
];

/// Whether `token` (already lowercased) is a stop word.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Split text into lowercase word tokens.
///
/// Word characters are alphanumerics plus inner apostrophes; everything else
/// separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens longer than three characters that are not stop words, in order.
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > MIN_CONTENT_TOKEN_LEN && !is_stop_word(t))
        .collect()
}

/// Set of content tokens.
pub fn token_set(text: &str) -> HashSet<String> {
    content_tokens(text).into_iter().collect()
}

/// Top `limit` content tokens ranked by frequency, ties broken by first
/// occurrence.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    rank_tokens(content_tokens(text), limit)
}

/// Top `limit` content tokens over several texts, same ranking as
/// [`extract_keywords`].
pub fn extract_keywords_from<'a, I>(texts: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    rank_tokens(texts.into_iter().flat_map(content_tokens), limit)
}

fn rank_tokens<I: IntoIterator<Item = String>>(tokens: I, limit: usize) -> Vec<String> {
    // token -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, token) in tokens.into_iter().enumerate() {
        counts.entry(token).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(t, _, _)| t).collect()
}

/// Jaccard similarity |A ∩ B| / |A ∪ B|. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Fraction of `query_tokens` present in `candidate`.
pub fn overlap_ratio(query_tokens: &HashSet<String>, candidate: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let hits = query_tokens.iter().filter(|t| candidate.contains(*t)).count();
    hits as f32 / query_tokens.len() as f32
}
