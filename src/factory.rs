//! Backend construction and the process-wide shared handle.
//!
//! Most of the CLI and any embedding application want exactly one live
//! backend connection; [`shared_backend`] lazily builds it under a lock
//! so concurrent first calls construct it once. [`reset_backend`] drops
//! the handle, forcing the next call to reconnect — used after config
//! changes and between tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::backend::memory::MemoryBackend;
use crate::backend::pinecone::PineconeBackend;
use crate::backend::qdrant::QdrantBackend;
use crate::backend::VectorBackend;
use crate::config::{BackendKind, Config};

static SHARED: Mutex<Option<Arc<dyn VectorBackend>>> = Mutex::const_new(None);

/// Build a fresh backend for the configured kind. Construction includes
/// the connectivity check, so a returned backend is known reachable.
pub async fn create_backend(config: &Config) -> Result<Arc<dyn VectorBackend>> {
    let backend = &config.backend;
    let built: Arc<dyn VectorBackend> = match backend.kind {
        BackendKind::Pinecone => Arc::new(
            PineconeBackend::connect(backend)
                .await
                .context("Failed to initialize Pinecone backend")?,
        ),
        BackendKind::Qdrant => Arc::new(
            QdrantBackend::connect(backend)
                .await
                .context("Failed to initialize Qdrant backend")?,
        ),
        BackendKind::Memory => Arc::new(MemoryBackend::with_prefix_fallback(
            backend.dimension,
            backend.enable_prefix_fallback,
        )),
    };
    Ok(built)
}

/// The process-wide backend, constructed on first use.
///
/// The config only matters on the first call (or the first call after a
/// [`reset_backend`]); later calls return the existing handle.
pub async fn shared_backend(config: &Config) -> Result<Arc<dyn VectorBackend>> {
    let mut guard = SHARED.lock().await;
    if let Some(backend) = guard.as_ref() {
        return Ok(Arc::clone(backend));
    }
    let backend = create_backend(config).await?;
    *guard = Some(Arc::clone(&backend));
    Ok(backend)
}

/// Drop the shared handle. In-flight clones stay valid; the next
/// [`shared_backend`] call reconnects.
pub async fn reset_backend() {
    *SHARED.lock().await = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, DeploymentMode, SafetyConfig};

    fn memory_config() -> Config {
        Config {
            backend: BackendConfig {
                kind: BackendKind::Memory,
                host: "localhost".to_string(),
                port: 6333,
                collection: "test".to_string(),
                dimension: 4,
                metric: "cosine".to_string(),
                deployment: DeploymentMode::SelfHosted,
                batch_size: 10,
                batch_delay_ms: 0,
                timeout_secs: 5,
                enable_prefix_fallback: true,
                scan_limit: 10_000,
            },
            safety: SafetyConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_shared_backend_is_reused_until_reset() {
        reset_backend().await;
        let config = memory_config();

        let first = shared_backend(&config).await.unwrap();
        let second = shared_backend(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        reset_backend().await;
        let third = shared_backend(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
