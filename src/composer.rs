//! Retrieval composer (C5): instantiates zero to three retrievers from the
//! enabled backends, fuses and deduplicates their candidates, and answers
//! queries. Generalized from `original_source/flexible-graphrag/hybrid_system.py`'s
//! `HybridSearchEngine` — its `vector_index`/`graph_index`/`hybrid_retriever`
//! instance attributes and partial-state detection become an explicit
//! `ComposerState` enum (SPEC_FULL §4.5/§9: "framework-supplied... inheritance
//! hierarchies... replaced with explicit composition").

use std::sync::Arc;

use crate::config::{BackendsConfig, Config, LlmConfig};
use crate::dedup::{self, DedupConfig};
use crate::embedding::EmbeddingProvider;
use crate::errors::{EngineError, Result};
use crate::fusion::{self, RankedList};
use crate::models::SearchResultItem;
use crate::stores::opensearch::OpenSearchStore;
use crate::stores::{FullTextStore, GraphStore, VectorStore};

/// The handles a `READY` composer holds. Each is `None` when that modality
/// is disabled in configuration.
pub struct ComposerHandles {
    pub vector: Option<Arc<dyn VectorStore>>,
    pub graph: Option<Arc<dyn GraphStore>>,
    pub fulltext: Option<Arc<dyn FullTextStore>>,
    /// Set only when vector and search are both configured against the same
    /// OpenSearch instance, in which case `vector`/`fulltext` above are not
    /// used for querying (SPEC_FULL §4.5 native hybrid).
    pub opensearch_hybrid: Option<Arc<OpenSearchStore>>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

/// `UNINITIALIZED` → `READY` per SPEC_FULL §4.5. There is no reverse
/// transition object; detecting a partial state simply replaces this with
/// `Uninitialized` again.
pub enum ComposerState {
    Uninitialized,
    Ready(ComposerHandles),
}

pub struct Composer {
    state: ComposerState,
    backends: BackendsConfig,
    retrieval: crate::config::RetrievalConfig,
    dedup_config: DedupConfig,
}

impl Composer {
    pub fn new(config: &Config) -> Self {
        Self {
            state: ComposerState::Uninitialized,
            backends: config.backends.clone(),
            retrieval: config.retrieval.clone(),
            dedup_config: DedupConfig::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ComposerState::Ready(_))
    }

    /// Install freshly built handles, transitioning to `READY`.
    pub fn install(&mut self, handles: ComposerHandles) {
        self.state = ComposerState::Ready(handles);
    }

    /// Detect an inconsistent partial state (e.g. vector configured but no
    /// vector handle present) and reset to `UNINITIALIZED` if found.
    pub fn detect_partial_state(&mut self) -> bool {
        let inconsistent = match &self.state {
            ComposerState::Uninitialized => false,
            ComposerState::Ready(handles) => {
                (self.backends.vector != crate::config::VectorBackend::None
                    && handles.vector.is_none()
                    && handles.opensearch_hybrid.is_none())
                    || (self.backends.graph != crate::config::GraphBackend::None && handles.graph.is_none())
                    || (self.backends.search != crate::config::SearchBackend::None
                        && handles.fulltext.is_none()
                        && handles.opensearch_hybrid.is_none())
            }
        };
        if inconsistent {
            tracing::warn!("composer in partial state - missing required indexes, resetting to uninitialized");
            self.state = ComposerState::Uninitialized;
        }
        inconsistent
    }

    fn handles(&self) -> Result<&ComposerHandles> {
        match &self.state {
            ComposerState::Ready(h) => Ok(h),
            ComposerState::Uninitialized => Err(EngineError::not_ready()),
        }
    }

    /// Expose the installed handles to the ingestion orchestrator, which
    /// needs direct access to write into each store (unlike `search`/`query`,
    /// which only read through the trait methods above).
    pub fn handles_for_ingestion(&self) -> Result<&ComposerHandles> {
        self.handles()
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResultItem>> {
        let handles = self.handles()?;

        let lists = if let Some(hybrid) = &handles.opensearch_hybrid {
            let embedding = self.embed(handles, query).await?;
            let candidates = hybrid
                .hybrid_query(query, &embedding, self.retrieval.fusion_top_k)
                .await?;
            vec![RankedList { candidates }]
        } else {
            let mut lists = Vec::new();

            if let Some(vector_store) = &handles.vector {
                let embedding = self.embed(handles, query).await?;
                let candidates = vector_store
                    .query(&embedding, self.retrieval.vector_top_k)
                    .await?;
                lists.push(RankedList { candidates });
            }

            if let Some(fulltext) = &handles.fulltext {
                let candidates = fulltext
                    .query(query, self.retrieval.bm25_similarity_top_k)
                    .await?;
                lists.push(RankedList { candidates });
            }

            if let Some(graph) = &handles.graph {
                let candidates = graph.retrieve(query, self.retrieval.graph_top_k).await?;
                lists.push(RankedList { candidates });
            }

            lists
        };

        let fused = fusion::fuse(lists, self.retrieval.fusion_top_k);
        let filtered = fusion::filter_post_fusion(fused, self.retrieval.post_fusion_min_score);
        let deduped = dedup::dedup(filtered, &self.dedup_config);
        Ok(deduped.into_iter().take(top_k).enumerate().map(|(i, mut r)| {
            r.rank = i + 1;
            r
        }).collect())
    }

    pub async fn query(&self, query: &str, top_k: usize, llm: &LlmConfig) -> Result<String> {
        let results = self.search(query, top_k).await?;
        generate_answer(llm, query, &results).await
    }

    async fn embed(&self, handles: &ComposerHandles, query: &str) -> Result<Vec<f32>> {
        crate::embedding::embed_query(handles.embedder.as_ref(), query)
            .await
            .map_err(|e| EngineError::ModelIO(e.to_string()))
    }
}

/// Generate an LLM answer grounded in the composer's retrieved context,
/// mirroring the source's `RetrieverQueryEngine.from_args(retriever=...,
/// llm=...)` with an explicit prompt instead of a framework call.
async fn generate_answer(llm: &LlmConfig, query: &str, context: &[SearchResultItem]) -> Result<String> {
    if context.is_empty() {
        return Ok("No relevant information was found to answer this query.".to_string());
    }

    let context_block = context
        .iter()
        .map(|r| format!("[{}] {}", r.file_name, r.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Answer the question using only the context below. If the context does not \
         contain the answer, say so.\n\nContext:\n{context_block}\n\nQuestion: {query}\n\nAnswer:"
    );

    crate::llm_chat::complete(llm, &prompt).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphBackend, SearchBackend, VectorBackend};
    use crate::embedding::DisabledProvider;

    fn backends(vector: VectorBackend, graph: GraphBackend, search: SearchBackend) -> BackendsConfig {
        BackendsConfig { vector, graph, search }
    }

    fn composer_with(backends_cfg: BackendsConfig) -> Composer {
        Composer {
            state: ComposerState::Uninitialized,
            backends: backends_cfg,
            retrieval: crate::config::RetrievalConfig::default(),
            dedup_config: DedupConfig::default(),
        }
    }

    #[tokio::test]
    async fn search_fails_when_uninitialized() {
        let composer = composer_with(backends(VectorBackend::None, GraphBackend::None, SearchBackend::Bm25));
        let err = composer.search("hello", 10).await.unwrap_err();
        assert!(matches!(err, EngineError::NotReady(_)));
    }

    #[test]
    fn detects_partial_state_when_a_configured_backend_has_no_handle() {
        let mut composer = composer_with(backends(VectorBackend::Qdrant, GraphBackend::None, SearchBackend::None));
        composer.install(ComposerHandles {
            vector: None,
            graph: None,
            fulltext: None,
            opensearch_hybrid: None,
            embedder: Arc::new(DisabledProvider),
        });
        assert!(composer.detect_partial_state());
        assert!(!composer.is_ready());
    }

    #[test]
    fn fully_consistent_state_is_not_flagged_partial() {
        let mut composer = composer_with(backends(VectorBackend::None, GraphBackend::None, SearchBackend::Bm25));
        composer.install(ComposerHandles {
            vector: None,
            graph: None,
            fulltext: Some(Arc::new(crate::stores::fulltext_sqlite::SqliteFullTextStore::new(
                futures_lite_pool(),
            ))),
            opensearch_hybrid: None,
            embedder: Arc::new(DisabledProvider),
        });
        assert!(!composer.detect_partial_state());
        assert!(composer.is_ready());
    }

    fn futures_lite_pool() -> sqlx::SqlitePool {
        // Tests only need a pool handle to type-check Arc<dyn FullTextStore>
        // construction; connecting lazily avoids pulling async setup into a
        // sync test.
        sqlx::sqlite::SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .unwrap()
    }
}
