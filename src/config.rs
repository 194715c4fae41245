//! Configuration parsing and validation.
//!
//! The engine is configured via a TOML file (default: `config/hre.toml`).
//! It enumerates the data source, which of the three retrieval backends are
//! enabled, the LLM/embedding provider, chunking/timeout parameters, and the
//! per-backend connection tables referenced in SPEC_FULL §6.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub backends: BackendsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub graph: GraphSchemaConfig,
    #[serde(default)]
    pub connections: BackendConnections,
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
}

fn default_job_retention_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

// ============ Data source (C1) ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Filesystem,
    Cmis,
    Alfresco,
    Upload,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: DataSourceKind,
    #[serde(default)]
    pub filesystem: Option<FilesystemConnectorConfig>,
    #[serde(default)]
    pub cmis: Option<CmisConnectorConfig>,
    #[serde(default)]
    pub alfresco: Option<AlfrescoConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    /// Absolute or relative path strings; single/double-quote wrapping is
    /// stripped by the connector per SPEC_FULL §4.1.
    pub paths: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

/// Bit-exact connector configuration fields per SPEC_FULL §6.
#[derive(Debug, Deserialize, Clone)]
pub struct CmisConnectorConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub folder_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlfrescoConnectorConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub path: String,
}

// ============ Backends (C4/C5) ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    None,
    Qdrant,
    Neo4j,
    Elasticsearch,
    Opensearch,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    None,
    Neo4j,
    Kuzu,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    None,
    Bm25,
    Elasticsearch,
    Opensearch,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendsConfig {
    #[serde(default = "default_vector_backend")]
    pub vector: VectorBackend,
    #[serde(default = "default_graph_backend")]
    pub graph: GraphBackend,
    #[serde(default = "default_search_backend")]
    pub search: SearchBackend,
}

fn default_vector_backend() -> VectorBackend {
    VectorBackend::None
}
fn default_graph_backend() -> GraphBackend {
    GraphBackend::None
}
fn default_search_backend() -> SearchBackend {
    SearchBackend::Bm25
}

impl BackendsConfig {
    pub fn any_enabled(&self) -> bool {
        self.vector != VectorBackend::None
            || self.graph != GraphBackend::None
            || self.search != SearchBackend::None
    }

    /// True when vector and search are both OpenSearch against the same
    /// instance, triggering the native-hybrid composition rule (SPEC_FULL §4.5).
    pub fn opensearch_native_hybrid(&self) -> bool {
        self.vector == VectorBackend::Opensearch && self.search == SearchBackend::Opensearch
    }
}

// ============ LLM / embedding provider ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Openai,
    Gemini,
    AzureOpenai,
    Anthropic,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dims: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            embedding_model: None,
            embedding_dims: None,
        }
    }
}

fn default_llm_provider() -> LlmProvider {
    LlmProvider::Openai
}
fn default_temperature() -> f64 {
    0.1
}
fn default_timeout_secs() -> u64 {
    120
}

// ============ Chunking (C3) ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_triplets")]
    pub max_triplets_per_chunk: usize,
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_triplets_per_chunk: default_max_triplets(),
            top_keywords: default_top_keywords(),
        }
    }
}

fn default_chunk_size() -> usize {
    1024
}
fn default_chunk_overlap() -> usize {
    128
}
fn default_max_triplets() -> usize {
    10
}
fn default_top_keywords() -> usize {
    5
}

// ============ Retrieval (C5) ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_bm25_top_k")]
    pub bm25_similarity_top_k: usize,
    #[serde(default)]
    pub bm25_persist_dir: Option<PathBuf>,
    #[serde(default)]
    pub vector_persist_dir: Option<PathBuf>,
    #[serde(default)]
    pub graph_persist_dir: Option<PathBuf>,
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default = "default_graph_top_k")]
    pub graph_top_k: usize,
    #[serde(default = "default_fusion_top_k")]
    pub fusion_top_k: usize,
    #[serde(default = "default_post_fusion_min_score")]
    pub post_fusion_min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_similarity_top_k: default_bm25_top_k(),
            bm25_persist_dir: None,
            vector_persist_dir: None,
            graph_persist_dir: None,
            vector_top_k: default_vector_top_k(),
            graph_top_k: default_graph_top_k(),
            fusion_top_k: default_fusion_top_k(),
            post_fusion_min_score: default_post_fusion_min_score(),
        }
    }
}

fn default_bm25_top_k() -> usize {
    10
}
fn default_vector_top_k() -> usize {
    10
}
fn default_graph_top_k() -> usize {
    5
}
fn default_fusion_top_k() -> usize {
    15
}
fn default_post_fusion_min_score() -> f64 {
    1e-3
}

// ============ Timeouts ============

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsConfig {
    #[serde(default = "default_docling_timeout")]
    pub docling_timeout_secs: u64,
    #[serde(default = "default_docling_interval")]
    pub docling_cancel_check_interval_secs: f64,
    #[serde(default = "default_kg_timeout")]
    pub kg_extraction_timeout_secs: u64,
    #[serde(default = "default_kg_interval")]
    pub kg_cancel_check_interval_secs: f64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            docling_timeout_secs: default_docling_timeout(),
            docling_cancel_check_interval_secs: default_docling_interval(),
            kg_extraction_timeout_secs: default_kg_timeout(),
            kg_cancel_check_interval_secs: default_kg_interval(),
        }
    }
}

fn default_docling_timeout() -> u64 {
    300
}
fn default_docling_interval() -> f64 {
    0.5
}
fn default_kg_timeout() -> u64 {
    3600
}
fn default_kg_interval() -> f64 {
    2.0
}

// ============ Graph schema ============

#[derive(Debug, Deserialize, Clone)]
pub struct NamedSchema {
    pub name: String,
    pub entities: Vec<String>,
    pub relations: Vec<String>,
    pub relationships: Vec<(String, String, String)>,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphSchemaConfig {
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(default)]
    pub schemas: Vec<NamedSchema>,
    #[serde(default = "default_true")]
    pub enable_knowledge_graph: bool,
    /// Gate on the Kuzu destructive-reset-between-runs behavior. See
    /// SPEC_FULL §9 "Kuzu schema reset — Open Question resolved".
    #[serde(default)]
    pub allow_destructive_reset: bool,
}

impl Default for GraphSchemaConfig {
    fn default() -> Self {
        Self {
            schema_name: default_schema_name(),
            schemas: Vec::new(),
            enable_knowledge_graph: true,
            allow_destructive_reset: false,
        }
    }
}

fn default_schema_name() -> String {
    "none".to_string()
}
fn default_true() -> bool {
    true
}

impl GraphSchemaConfig {
    pub fn active_schema(&self) -> Option<&NamedSchema> {
        if self.schema_name == "none" {
            return None;
        }
        self.schemas.iter().find(|s| s.name == self.schema_name)
    }
}

// ============ Per-backend connections ============

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendConnections {
    pub neo4j: Option<Neo4jConfig>,
    pub qdrant: Option<QdrantConfig>,
    pub elasticsearch: Option<ElasticsearchConfig>,
    pub opensearch: Option<OpenSearchConfig>,
    pub kuzu: Option<KuzuConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Neo4jConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_neo4j_database")]
    pub database: String,
    #[serde(default = "default_vector_index_name")]
    pub index_name: String,
    pub embed_dim: usize,
}

fn default_neo4j_database() -> String {
    "neo4j".to_string()
}
fn default_vector_index_name() -> String {
    "hybrid_search_vector".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    pub host: String,
    #[serde(default = "default_qdrant_port")]
    pub port: u16,
    pub api_key: Option<String>,
    pub collection_name: String,
    #[serde(default)]
    pub https: bool,
    pub embed_dim: usize,
}

fn default_qdrant_port() -> u16 {
    6333
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub embed_dim: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenSearchConfig {
    pub url: String,
    pub index_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub embed_dim: usize,
    #[serde(default = "default_embedding_field")]
    pub embedding_field: String,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_hybrid_pipeline")]
    pub search_pipeline: String,
}

fn default_embedding_field() -> String {
    "embedding".to_string()
}
fn default_text_field() -> String {
    "content".to_string()
}
fn default_hybrid_pipeline() -> String {
    "hybrid-search-pipeline".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KuzuConfig {
    pub db_path: PathBuf,
}

// ============ Validation ============

pub fn load_config(path: &std::path::Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !config.backends.any_enabled() {
        anyhow::bail!("at least one of backends.vector, backends.graph, backends.search must not be 'none'");
    }
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if !(0.0..1.0).contains(&(config.retrieval.post_fusion_min_score)) {
        anyhow::bail!("retrieval.post_fusion_min_score must be in [0.0, 1.0)");
    }

    match config.source.kind {
        DataSourceKind::Filesystem => {
            if config.source.filesystem.is_none() {
                anyhow::bail!("source.filesystem must be configured when source.kind = 'filesystem'");
            }
        }
        DataSourceKind::Cmis => {
            if config.source.cmis.is_none() {
                anyhow::bail!("source.cmis must be configured when source.kind = 'cmis'");
            }
        }
        DataSourceKind::Alfresco => {
            if config.source.alfresco.is_none() {
                anyhow::bail!("source.alfresco must be configured when source.kind = 'alfresco'");
            }
        }
        DataSourceKind::Upload => {}
    }

    match config.backends.vector {
        VectorBackend::Neo4j if config.connections.neo4j.is_none() => {
            anyhow::bail!("connections.neo4j must be configured when backends.vector = 'neo4j'")
        }
        VectorBackend::Qdrant if config.connections.qdrant.is_none() => {
            anyhow::bail!("connections.qdrant must be configured when backends.vector = 'qdrant'")
        }
        VectorBackend::Elasticsearch if config.connections.elasticsearch.is_none() => {
            anyhow::bail!("connections.elasticsearch must be configured when backends.vector = 'elasticsearch'")
        }
        VectorBackend::Opensearch if config.connections.opensearch.is_none() => {
            anyhow::bail!("connections.opensearch must be configured when backends.vector = 'opensearch'")
        }
        _ => {}
    }
    match config.backends.graph {
        GraphBackend::Neo4j if config.connections.neo4j.is_none() => {
            anyhow::bail!("connections.neo4j must be configured when backends.graph = 'neo4j'")
        }
        GraphBackend::Kuzu if config.connections.kuzu.is_none() => {
            anyhow::bail!("connections.kuzu must be configured when backends.graph = 'kuzu'")
        }
        _ => {}
    }
    match config.backends.search {
        SearchBackend::Elasticsearch if config.connections.elasticsearch.is_none() => {
            anyhow::bail!("connections.elasticsearch must be configured when backends.search = 'elasticsearch'")
        }
        SearchBackend::Opensearch if config.connections.opensearch.is_none() => {
            anyhow::bail!("connections.opensearch must be configured when backends.search = 'opensearch'")
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [db]
        path = "./data/hre.sqlite"

        [server]
        bind = "127.0.0.1:8089"

        [source]
        kind = "filesystem"

        [source.filesystem]
        paths = ["./docs"]

        [backends]
        vector = "none"
        graph = "none"
        search = "bm25"
        "#
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.chunk_size, 1024);
        assert_eq!(config.retrieval.bm25_similarity_top_k, 10);
    }

    #[test]
    fn rejects_all_backends_disabled() {
        let toml_str = minimal_toml().replace(r#"search = "bm25""#, r#"search = "none""#);
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_missing_vector_backend_connection() {
        let toml_str = minimal_toml().replace(r#"vector = "none""#, r#"vector = "qdrant""#);
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }
}
