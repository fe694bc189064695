use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Supported vector database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pinecone,
    Qdrant,
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Pinecone => f.write_str("pinecone"),
            BackendKind::Qdrant => f.write_str("qdrant"),
            BackendKind::Memory => f.write_str("memory"),
        }
    }
}

/// Deployment mode for self-hostable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Cloud,
    SelfHosted,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

/// Connection and collection settings for the configured backend.
///
/// Read once at adapter construction; the core does not watch for live
/// config changes. The API key is taken from the `VECTOR_DB_API_KEY`
/// environment variable, never from this file.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub collection: String,
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_deployment")]
    pub deployment: DeploymentMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Recover document membership from `_original_id` prefixes when a
    /// record predates the `source_id` field. Best-effort reconciliation,
    /// never the primary lookup.
    #[serde(default = "default_true")]
    pub enable_prefix_fallback: bool,
    /// Upper bound on records pulled per enumeration pass (scroll pages or
    /// similarity-probe top_k).
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

/// Thresholds that turn a deletion preview into a warning.
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_warn_chunks")]
    pub warn_chunk_threshold: usize,
    #[serde(default = "default_warn_documents")]
    pub warn_document_threshold: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            warn_chunk_threshold: default_warn_chunks(),
            warn_document_threshold: default_warn_documents(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6333
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_deployment() -> DeploymentMode {
    DeploymentMode::Cloud
}
fn default_batch_size() -> usize {
    100
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_scan_limit() -> usize {
    10_000
}
fn default_warn_chunks() -> usize {
    1000
}
fn default_warn_documents() -> usize {
    50
}

impl BackendConfig {
    /// API key from the environment, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("VECTOR_DB_API_KEY").ok()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.backend.collection.is_empty() {
        anyhow::bail!("backend.collection must not be empty");
    }

    if config.backend.dimension == 0 {
        anyhow::bail!("backend.dimension must be > 0");
    }

    if config.backend.batch_size == 0 {
        anyhow::bail!("backend.batch_size must be > 0");
    }

    match config.backend.metric.as_str() {
        "cosine" | "euclidean" | "dot" => {}
        other => anyhow::bail!(
            "Unknown distance metric: '{}'. Must be cosine, euclidean, or dot.",
            other
        ),
    }

    if config.backend.scan_limit == 0 {
        anyhow::bail!("backend.scan_limit must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config() {
        let file = write_config(
            r#"
[backend]
kind = "qdrant"
collection = "chunks"
dimension = 768
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Qdrant);
        assert_eq!(config.backend.batch_size, 100);
        assert_eq!(config.backend.metric, "cosine");
        assert!(config.backend.enable_prefix_fallback);
        assert_eq!(config.safety.warn_chunk_threshold, 1000);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let file = write_config(
            r#"
[backend]
kind = "weaviate"
collection = "chunks"
dimension = 768
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let file = write_config(
            r#"
[backend]
kind = "memory"
collection = "chunks"
dimension = 0
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let file = write_config(
            r#"
[backend]
kind = "memory"
collection = "chunks"
dimension = 8
metric = "manhattan"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
