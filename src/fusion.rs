//! Reciprocal-rank fusion over the candidate sets from up to three
//! retrievers, generalized from the teacher's `search.rs` min-max
//! normalize-and-weighted-merge into the RRF scheme SPEC_FULL §4.5 calls for
//! (`score = Σ 1 / (k + rank)`, `k = 60`, top 15). When only one retriever
//! produced candidates, it is returned directly — fusing a single source
//! against itself can only dilute its own ranking.

use std::collections::HashMap;

use crate::models::SearchResultItem;
use crate::stores::RetrievalCandidate;

const RRF_K: f64 = 60.0;

/// One retriever's ranked candidate list, already sorted best-first.
pub struct RankedList {
    pub candidates: Vec<RetrievalCandidate>,
}

/// Fuse zero to three ranked candidate lists into a single ranked list of
/// `top_k` [`SearchResultItem`]s, applying reciprocal-rank fusion when more
/// than one list is non-empty.
pub fn fuse(lists: Vec<RankedList>, top_k: usize) -> Vec<SearchResultItem> {
    let active: Vec<&RankedList> = lists.iter().filter(|l| !l.candidates.is_empty()).collect();

    let merged: Vec<(RetrievalCandidate, f64)> = match active.len() {
        0 => Vec::new(),
        1 => active[0]
            .candidates
            .iter()
            .cloned()
            .map(|c| {
                let score = c.score;
                (c, score)
            })
            .collect(),
        _ => reciprocal_rank_fuse(&active),
    };

    let mut merged = merged;
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);

    merged
        .into_iter()
        .enumerate()
        .map(|(i, (candidate, score))| SearchResultItem {
            rank: i + 1,
            content: candidate.text,
            score,
            source: candidate.source,
            file_type: candidate.file_type,
            file_name: candidate.file_name,
        })
        .collect()
}

fn reciprocal_rank_fuse(lists: &[&RankedList]) -> Vec<(RetrievalCandidate, f64)> {
    let mut fused_scores: HashMap<String, f64> = HashMap::new();
    let mut by_chunk: HashMap<String, RetrievalCandidate> = HashMap::new();

    for list in lists {
        for (rank, candidate) in list.candidates.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            *fused_scores.entry(candidate.chunk_id.clone()).or_insert(0.0) += contribution;
            by_chunk.entry(candidate.chunk_id.clone()).or_insert_with(|| candidate.clone());
        }
    }

    fused_scores
        .into_iter()
        .filter_map(|(chunk_id, score)| by_chunk.remove(&chunk_id).map(|c| (c, score)))
        .collect()
}

/// Results with a fused score at or below this threshold are dropped as
/// non-relevant (SPEC_FULL §4.5).
pub fn filter_post_fusion(results: Vec<SearchResultItem>, min_score: f64) -> Vec<SearchResultItem> {
    results.into_iter().filter(|r| r.score > min_score).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chunk_id: &str, score: f64) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk_id: chunk_id.to_string(),
            document_id: format!("doc-{chunk_id}"),
            score,
            text: format!("text for {chunk_id}"),
            source: "filesystem".to_string(),
            file_name: "notes.md".to_string(),
            file_type: "text/markdown".to_string(),
        }
    }

    #[test]
    fn single_retriever_is_passed_through_unfused() {
        let list = RankedList { candidates: vec![candidate("c1", 0.9), candidate("c2", 0.5)] };
        let results = fuse(vec![list], 15);
        assert_eq!(results[0].content, "text for c1");
        assert!((results[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn two_retrievers_agreeing_on_top_rank_scores_highest() {
        let vector = RankedList { candidates: vec![candidate("c1", 0.9), candidate("c2", 0.5)] };
        let bm25 = RankedList { candidates: vec![candidate("c1", 4.0), candidate("c3", 2.0)] };
        let results = fuse(vec![vector, bm25], 15);
        assert_eq!(results[0].content, "text for c1");
    }

    #[test]
    fn empty_candidate_lists_produce_no_results() {
        let results = fuse(vec![RankedList { candidates: vec![] }], 15);
        assert!(results.is_empty());
    }

    #[test]
    fn truncates_to_top_k() {
        let candidates: Vec<_> = (0..20).map(|i| candidate(&format!("c{i}"), 1.0 / (i as f64 + 1.0))).collect();
        let list = RankedList { candidates };
        let results = fuse(vec![list], 15);
        assert_eq!(results.len(), 15);
    }

    #[test]
    fn post_fusion_filter_drops_scores_at_or_below_threshold() {
        let results = vec![
            SearchResultItem { rank: 1, content: "a".into(), score: 0.5, source: "s".into(), file_type: "t".into(), file_name: "f".into() },
            SearchResultItem { rank: 2, content: "b".into(), score: 1e-3, source: "s".into(), file_type: "t".into(), file_name: "f".into() },
            SearchResultItem { rank: 3, content: "c".into(), score: 1e-4, source: "s".into(), file_type: "t".into(), file_name: "f".into() },
        ];
        let filtered = filter_post_fusion(results, 1e-3);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].content, "a");
    }
}
