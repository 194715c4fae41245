//! `Engine`: the single explicit, `Arc`-held context owning the composer,
//! job registry, database pool, and configuration — replacing the source's
//! process-wide lazily-initialized backend singleton with one value
//! constructed once at startup (CLI: per invocation; server: at `serve`
//! time) and threaded through every handler (SPEC_FULL §5 "Global state
//! lifecycle").

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};

use crate::composer::{Composer, ComposerHandles};
use crate::config::{Config, DataSourceKind, GraphBackend, SearchBackend, VectorBackend};
use crate::connectors::alfresco::AlfrescoConnector;
use crate::connectors::cmis::CmisConnector;
use crate::connectors::fs::FilesystemConnector;
use crate::connectors::Connector;
use crate::embedding::{self, EmbeddingProvider};
use crate::errors::{EngineError, Result};
use crate::jobs::{IngestShape, JobRegistry};
use crate::stores::elasticsearch::ElasticsearchStore;
use crate::stores::fulltext_sqlite::SqliteFullTextStore;
use crate::stores::kuzu::KuzuGraphStore;
use crate::stores::neo4j::Neo4jStore;
use crate::stores::opensearch::OpenSearchStore;
use crate::stores::qdrant::QdrantStore;
use crate::stores::{FullTextStore, GraphStore, VectorStore};

pub struct Engine {
    pub config: Config,
    pub pool: SqlitePool,
    pub registry: Arc<JobRegistry>,
    /// Serializes ingestions against the composer; queries never block on it
    /// (SPEC_FULL §5 "Shared resources").
    pub ingest_lock: Mutex<()>,
    pub composer: RwLock<Composer>,
}

impl Engine {
    pub async fn new(config: Config, pool: SqlitePool) -> Result<Arc<Self>> {
        let registry = Arc::new(JobRegistry::new(config.job_retention_hours));
        let composer = Composer::new(&config);

        // One-time destructive reset, run only here (not from `rebuild_composer`,
        // which also runs after every ingestion and would otherwise wipe the
        // graph it just wrote).
        if config.backends.graph == GraphBackend::Kuzu && config.graph.allow_destructive_reset {
            KuzuGraphStore::new(pool.clone(), true).reset().await?;
        }

        let engine = Arc::new(Self { config, pool, registry, ingest_lock: Mutex::new(()), composer: RwLock::new(composer) });

        engine.rebuild_composer().await?;
        Ok(engine)
    }

    /// (Re)build the composer's handles from current configuration and
    /// install them, then run partial-state detection. Called at startup and
    /// after a successful ingestion.
    pub async fn rebuild_composer(&self) -> Result<()> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&self.config.llm, self.config.backends.vector != VectorBackend::None)
                .map_err(|e| EngineError::config(e.to_string()))?);

        let mut vector: Option<Arc<dyn VectorStore>> = None;
        let mut graph: Option<Arc<dyn GraphStore>> = None;
        let mut fulltext: Option<Arc<dyn FullTextStore>> = None;
        let mut opensearch_hybrid: Option<Arc<OpenSearchStore>> = None;

        if self.config.backends.opensearch_native_hybrid() {
            let os_config = self
                .config
                .connections
                .opensearch
                .clone()
                .ok_or_else(|| EngineError::config("connections.opensearch required for native hybrid"))?;
            opensearch_hybrid = Some(Arc::new(OpenSearchStore::new(os_config)));
        } else {
            match self.config.backends.vector {
                VectorBackend::None => {}
                VectorBackend::Qdrant => {
                    let qdrant_config = self.config.connections.qdrant.clone().ok_or_else(|| {
                        EngineError::config("connections.qdrant required for vector backend qdrant")
                    })?;
                    vector = Some(Arc::new(QdrantStore::new(qdrant_config)));
                }
                VectorBackend::Neo4j => {
                    let neo4j_config = self.config.connections.neo4j.clone().ok_or_else(|| {
                        EngineError::config("connections.neo4j required for vector backend neo4j")
                    })?;
                    vector = Some(Arc::new(Neo4jStore::new(neo4j_config)));
                }
                VectorBackend::Elasticsearch => {
                    let es_config = self.config.connections.elasticsearch.clone().ok_or_else(|| {
                        EngineError::config("connections.elasticsearch required for vector backend elasticsearch")
                    })?;
                    vector = Some(Arc::new(ElasticsearchStore::new(es_config)));
                }
                VectorBackend::Opensearch => {
                    let os_config = self.config.connections.opensearch.clone().ok_or_else(|| {
                        EngineError::config("connections.opensearch required for vector backend opensearch")
                    })?;
                    vector = Some(Arc::new(OpenSearchStore::new(os_config)));
                }
            }

            match self.config.backends.search {
                SearchBackend::None => {}
                SearchBackend::Bm25 => {
                    fulltext = Some(Arc::new(SqliteFullTextStore::new(self.pool.clone())));
                }
                SearchBackend::Elasticsearch => {
                    let es_config = self.config.connections.elasticsearch.clone().ok_or_else(|| {
                        EngineError::config("connections.elasticsearch required for search backend elasticsearch")
                    })?;
                    fulltext = Some(Arc::new(ElasticsearchStore::new(es_config)));
                }
                SearchBackend::Opensearch => {
                    let os_config = self.config.connections.opensearch.clone().ok_or_else(|| {
                        EngineError::config("connections.opensearch required for search backend opensearch")
                    })?;
                    fulltext = Some(Arc::new(OpenSearchStore::new(os_config)));
                }
            }
        }

        match self.config.backends.graph {
            GraphBackend::None => {}
            GraphBackend::Neo4j => {
                let neo4j_config = self
                    .config
                    .connections
                    .neo4j
                    .clone()
                    .ok_or_else(|| EngineError::config("connections.neo4j required for graph backend neo4j"))?;
                graph = Some(Arc::new(Neo4jStore::new(neo4j_config)));
            }
            GraphBackend::Kuzu => {
                graph = Some(Arc::new(KuzuGraphStore::new(self.pool.clone(), self.config.graph.allow_destructive_reset)));
            }
        }

        let mut composer = self.composer.write().await;
        composer.install(ComposerHandles { vector, graph, fulltext, opensearch_hybrid, embedder });
        composer.detect_partial_state();
        Ok(())
    }

    /// Build the connector for the configured data source.
    pub fn connector(&self) -> Result<Box<dyn Connector>> {
        match self.config.source.kind {
            DataSourceKind::Filesystem => {
                let fs_config = self
                    .config
                    .source
                    .filesystem
                    .clone()
                    .ok_or_else(|| EngineError::config("source.filesystem not configured"))?;
                Ok(Box::new(FilesystemConnector::new(fs_config)))
            }
            DataSourceKind::Cmis => {
                let cmis_config = self
                    .config
                    .source
                    .cmis
                    .clone()
                    .ok_or_else(|| EngineError::config("source.cmis not configured"))?;
                Ok(Box::new(CmisConnector::new(cmis_config)))
            }
            DataSourceKind::Alfresco => {
                let alfresco_config = self
                    .config
                    .source
                    .alfresco
                    .clone()
                    .ok_or_else(|| EngineError::config("source.alfresco not configured"))?;
                Ok(Box::new(AlfrescoConnector::new(alfresco_config)))
            }
            DataSourceKind::Upload => Err(EngineError::config(
                "the upload source kind has no connector; use ingest_text instead",
            )),
        }
    }

    /// A pure read of engine readiness plus a credential-free configuration
    /// summary (SPEC_FULL §6 `status`). Never echoes `connections.*` /
    /// `source.cmis` / `source.alfresco`, which carry passwords.
    pub async fn status(&self) -> serde_json::Value {
        let composer = self.composer.read().await;
        serde_json::json!({
            "has_vector": self.config.backends.vector != VectorBackend::None,
            "has_graph": self.config.backends.graph != GraphBackend::None,
            "has_retriever": composer.is_ready(),
            "config": {
                "source_kind": format!("{:?}", self.config.source.kind),
                "vector_backend": format!("{:?}", self.config.backends.vector),
                "graph_backend": format!("{:?}", self.config.backends.graph),
                "search_backend": format!("{:?}", self.config.backends.search),
                "llm_provider": format!("{:?}", self.config.llm.provider),
                "chunk_size": self.config.chunking.chunk_size,
                "chunk_overlap": self.config.chunking.chunk_overlap,
                "enable_knowledge_graph": self.config.graph.enable_knowledge_graph,
            },
        })
    }

    pub fn estimate_shape(&self, total_files: usize, total_bytes: u64, complex: bool) -> IngestShape {
        IngestShape { total_files, total_bytes, has_complex_formats: complex }
    }
}

pub async fn bootstrap(config_path: &Path) -> anyhow::Result<Arc<Engine>> {
    let config = crate::config::load_config(config_path)?;
    let pool = crate::db::connect(&config).await?;
    crate::migrate::run_migrations_on(&pool).await?;
    let engine = Engine::new(config, pool).await?;
    Ok(engine)
}
