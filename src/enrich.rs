//! Per-chunk enrichment: keyword extraction and rolling summaries.
//!
//! Neither the teacher nor any repo in the retrieval pack carries an
//! LLM-summarization or keyword-extraction crate as an ambient dependency, so
//! this module implements deterministic, dependency-free approximations
//! behind the [`Enricher`] trait (see DESIGN.md, Open Question resolution).
//! An LLM-backed implementation is a drop-in replacement satisfying the same
//! trait.

use std::collections::HashMap;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Attaches derived metadata to a slice of chunks from one document.
pub trait Enricher {
    fn enrich(&self, chunks: &mut [Chunk]);
}

/// Frequency-rank keywords plus a truncation-based rolling summary.
pub struct DefaultEnricher {
    pub top_keywords: usize,
}

impl DefaultEnricher {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            top_keywords: config.top_keywords,
        }
    }
}

impl Enricher for DefaultEnricher {
    fn enrich(&self, chunks: &mut [Chunk]) {
        let keyword_sets: Vec<Vec<String>> = chunks
            .iter()
            .map(|c| extract_keywords(&c.text, self.top_keywords))
            .collect();

        let summaries: Vec<String> = (0..chunks.len())
            .map(|i| {
                let prev = i.checked_sub(1).map(|j| chunks[j].text.as_str());
                let next = chunks.get(i + 1).map(|c| c.text.as_str());
                rolling_summary(prev, &chunks[i].text, next)
            })
            .collect();

        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.keywords = keyword_sets[i].clone();
            chunk.rolling_summary = summaries[i].clone();
        }
    }
}

/// Closed stopword list used to filter keyword candidates. Deliberately
/// small and English-only; this is a heuristic extractor, not an NLP engine.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "for", "with", "is", "are",
    "was", "were", "be", "been", "being", "it", "its", "this", "that", "these", "those", "as",
    "at", "by", "from", "into", "than", "then", "so", "not", "no", "can", "will", "would",
    "should", "could", "has", "have", "had", "do", "does", "did", "he", "she", "they", "we",
    "you", "i", "his", "her", "their", "our", "your", "which", "who", "whom", "what", "when",
    "where", "how", "why", "if", "about", "up", "out", "over", "under",
];

/// Extract the top-K most frequent non-stopword tokens by frequency, then
/// alphabetically for ties, preserving the deterministic-given-same-input
/// property SPEC_FULL §4.3 requires.
pub fn extract_keywords(text: &str, top_k: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for raw in text.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if token.len() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(top_k).map(|(w, _)| w).collect()
}

/// A local-context summary built from the first sentence of the previous
/// chunk, the full current chunk, and the first sentence of the next chunk.
pub fn rolling_summary(prev: Option<&str>, current: &str, next: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(p) = prev {
        if let Some(s) = first_sentence(p) {
            parts.push(format!("...{}", s));
        }
    }
    parts.push(current.to_string());
    if let Some(n) = next {
        if let Some(s) = first_sentence(n) {
            parts.push(format!("{}...", s));
        }
    }
    parts.join(" ")
}

fn first_sentence(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed
        .find(". ")
        .or_else(|| trimmed.find('\n'))
        .map(|i| i + 1)
        .unwrap_or(trimmed.len().min(160));
    Some(&trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_extraction_is_deterministic() {
        let text = "graph retrieval graph vector retrieval search search search";
        let k1 = extract_keywords(text, 3);
        let k2 = extract_keywords(text, 3);
        assert_eq!(k1, k2);
        assert_eq!(k1[0], "search");
    }

    #[test]
    fn keyword_extraction_filters_stopwords() {
        let text = "the of and but this";
        let keywords = extract_keywords(text, 5);
        assert!(keywords.is_empty());
    }

    #[test]
    fn rolling_summary_includes_neighbors() {
        let prev = "Previous sentence one. Previous sentence two.";
        let current = "Current chunk text.";
        let next = "Next sentence one. Next sentence two.";
        let summary = rolling_summary(Some(prev), current, Some(next));
        assert!(summary.contains("Current chunk text."));
        assert!(summary.contains("Previous sentence one."));
        assert!(summary.contains("Next sentence one."));
    }

    #[test]
    fn rolling_summary_handles_missing_neighbors() {
        let summary = rolling_summary(None, "Only chunk.", None);
        assert_eq!(summary, "Only chunk.");
    }
}
