//! Deduplication cascade for fused search results.
//!
//! Graph-derived passages frequently arrive decorated with LLM preambles or
//! entity-relation chains (`original_source/flexible-graphrag/hybrid_system.py`
//! `_extract_core_content` / the two-strategy dedup loop in `query()`).
//! Generalized here behind configurable phrase/pattern lists rather than the
//! source's hard-coded prefix/suffix lists and Alfresco/London-specific date
//! regex (SPEC_FULL §9 Open Question: corpus-specific patterns are explicitly
//! not carried over).

use regex::Regex;

use crate::models::SearchResultItem;

const ENTITY_CHAIN_PATTERN: &str = r"^[A-Za-z\s]+->[A-Za-z\s]+(->[A-Za-z\s]+){0,3}:";
const SAME_SOURCE_OVERLAP_THRESHOLD: f64 = 0.7;
const GRAPH_FORMAT_OVERLAP_THRESHOLD: f64 = 0.6;
const FINGERPRINT_LEN: usize = 300;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub preamble_phrases: Vec<String>,
    pub closing_phrases: Vec<String>,
    /// Generic `\d{4}`-style patterns used to locate the original text
    /// embedded after an entity-relation chain, not corpus-specific ones.
    pub date_patterns: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            preamble_phrases: vec![
                "here are some facts extracted from the provided text:".to_string(),
                "extracted facts:".to_string(),
                "key information:".to_string(),
                "summary:".to_string(),
                "based on the provided text:".to_string(),
                "the document states:".to_string(),
                "the following facts were extracted:".to_string(),
            ],
            closing_phrases: vec![
                "end of document".to_string(),
                "end of text".to_string(),
                "this concludes the document".to_string(),
                "this concludes the text".to_string(),
            ],
            date_patterns: vec![
                r"[A-Z][a-z]+\s+\d{1,2},?\s+\d{4}".to_string(),
                r"\d{4}-\d{2}-\d{2}".to_string(),
                r"[A-Z]{2,}.*?\d{1,2}.*?\d{4}".to_string(),
            ],
        }
    }
}

/// Strip a configured preamble/closing phrase and, if what remains looks
/// like an entity-relation chain, try to locate the original embedded text
/// via the configured date patterns and trim to that point.
pub fn extract_core_content(text: &str, config: &DedupConfig) -> String {
    let mut text = text.trim().to_string();

    let lower = text.to_lowercase();
    for phrase in &config.preamble_phrases {
        if lower.starts_with(&phrase.to_lowercase()) {
            text = text[phrase.len()..].trim().to_string();
            break;
        }
    }

    let lower = text.to_lowercase();
    for phrase in &config.closing_phrases {
        let needle = phrase.to_lowercase();
        if lower.ends_with(&needle) {
            text.truncate(text.len() - needle.len());
            text = text.trim().to_string();
            break;
        }
    }

    if let Ok(chain_re) = Regex::new(ENTITY_CHAIN_PATTERN) {
        if chain_re.is_match(&text) {
            for pattern in &config.date_patterns {
                if let Ok(re) = Regex::new(pattern) {
                    if let Some(m) = re.find(&text) {
                        text = text[m.start()..].to_string();
                        break;
                    }
                }
            }
        }
    }

    text.trim().to_string()
}

/// Lowercased first `FINGERPRINT_LEN` characters of the core content.
pub fn fingerprint(core: &str) -> String {
    let lower = core.trim().to_lowercase();
    lower.chars().take(FINGERPRINT_LEN).collect()
}

/// Jaccard-like word-set overlap between two fingerprints.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / union as f64
}

/// Apply the dedup cascade to a fused, ranked result list, dropping later
/// duplicates and re-numbering the surviving ranks.
pub fn dedup(results: Vec<SearchResultItem>, config: &DedupConfig) -> Vec<SearchResultItem> {
    let mut kept: Vec<(SearchResultItem, String, String, bool)> = Vec::new(); // (item, source, fingerprint, is_graph_chain)

    for item in results {
        let core = extract_core_content(&item.content, config);
        let print = fingerprint(&core);
        let is_graph_chain = item.content.contains("->");

        if print.len() > 50 {
            let same_source_dup = kept.iter().any(|(_, src, fp, _)| {
                *src == item.source && fp.len() > 50 && word_overlap(&print, fp) > SAME_SOURCE_OVERLAP_THRESHOLD
            });
            if same_source_dup {
                continue;
            }

            if is_graph_chain {
                let prose_dup = kept.iter().any(|(_, _, fp, other_is_chain)| {
                    !other_is_chain && fp.len() > 50 && word_overlap(&print, fp) > GRAPH_FORMAT_OVERLAP_THRESHOLD
                });
                if prose_dup {
                    continue;
                }
            }
        }

        let source = item.source.clone();
        kept.push((item, source, print, is_graph_chain));
    }

    kept.into_iter()
        .enumerate()
        .map(|(i, (mut item, _, _, _))| {
            item.rank = i + 1;
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, content: &str, score: f64) -> SearchResultItem {
        SearchResultItem {
            rank: 0,
            content: content.to_string(),
            score,
            source: source.to_string(),
            file_type: "text/plain".to_string(),
            file_name: "f.txt".to_string(),
        }
    }

    #[test]
    fn strips_a_configured_preamble_phrase() {
        let config = DedupConfig::default();
        let core = extract_core_content("Summary: Paul Atreides rules Arrakis.", &config);
        assert_eq!(core, "Paul Atreides rules Arrakis.");
    }

    #[test]
    fn strips_a_configured_closing_phrase() {
        let config = DedupConfig::default();
        let core = extract_core_content("Paul Atreides rules Arrakis. End of document", &config);
        assert_eq!(core, "Paul Atreides rules Arrakis.");
    }

    #[test]
    fn entity_chain_is_trimmed_to_the_embedded_original_text() {
        let config = DedupConfig::default();
        let text = "Paul -> RULES -> Arrakis: January 1, 2026 the spice flowed freely.";
        let core = extract_core_content(text, &config);
        assert!(core.starts_with("January 1, 2026"));
    }

    #[test]
    fn word_overlap_of_identical_text_is_one() {
        assert!((word_overlap("the spice flows", "the spice flows") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn word_overlap_of_disjoint_text_is_zero() {
        assert_eq!(word_overlap("spice melange", "ocean waves"), 0.0);
    }

    #[test]
    fn drops_near_duplicate_results_from_the_same_source() {
        let long_text = "the spice melange flows across the vast deserts of Arrakis in great quantities every year";
        let results = vec![
            item("filesystem", long_text, 0.9),
            item("filesystem", long_text, 0.8),
        ];
        let deduped = dedup(results, &DedupConfig::default());
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn keeps_similar_results_from_different_sources() {
        let long_text = "the spice melange flows across the vast deserts of Arrakis in great quantities every year";
        let results = vec![
            item("filesystem", long_text, 0.9),
            item("cmis", long_text, 0.8),
        ];
        let deduped = dedup(results, &DedupConfig::default());
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn renumbers_ranks_after_dropping_duplicates() {
        let long_text = "the spice melange flows across the vast deserts of Arrakis in great quantities every year";
        let results = vec![
            item("filesystem", long_text, 0.9),
            item("filesystem", long_text, 0.8),
            item("filesystem", "totally unrelated short text", 0.7),
        ];
        let deduped = dedup(results, &DedupConfig::default());
        assert_eq!(deduped[0].rank, 1);
        assert_eq!(deduped[1].rank, 2);
    }
}
