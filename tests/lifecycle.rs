//! End-to-end lifecycle tests against the in-memory backend: load,
//! discover, preview, delete, verify.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use vector_warden::backend::memory::MemoryBackend;
use vector_warden::backend::VectorBackend;
use vector_warden::config::{
    BackendConfig, BackendKind, Config, DeploymentMode, SafetyConfig,
};
use vector_warden::deletion::DeletionScope;
use vector_warden::manager::{CleanupStrategy, VectorManager};
use vector_warden::models::{
    ChunkSummary, DocumentSummary, FetchedRecord, IndexStats, LogicalRecord, Metadata,
    MetadataFilter, QueryMatch, KEY_CATEGORY, KEY_SOURCE_FILENAME, KEY_SOURCE_ID,
    KEY_UPLOAD_DATE,
};
use vector_warden::progress::SilentProgress;
use vector_warden::results::ConfidenceLevel;

const DIM: usize = 4;

fn test_config(batch_size: usize) -> Config {
    Config {
        backend: BackendConfig {
            kind: BackendKind::Memory,
            host: "localhost".to_string(),
            port: 6333,
            collection: "test".to_string(),
            dimension: DIM,
            metric: "cosine".to_string(),
            deployment: DeploymentMode::SelfHosted,
            batch_size,
            batch_delay_ms: 0,
            timeout_secs: 5,
            enable_prefix_fallback: true,
            scan_limit: 10_000,
        },
        safety: SafetyConfig {
            warn_chunk_threshold: 1000,
            warn_document_threshold: 50,
        },
    }
}

fn record(logical_id: &str, source_id: &str, filename: &str, vector: [f32; DIM]) -> LogicalRecord {
    let mut metadata = Metadata::new();
    metadata.set(KEY_SOURCE_ID, json!(source_id));
    metadata.set(KEY_SOURCE_FILENAME, json!(filename));
    LogicalRecord {
        logical_id: logical_id.to_string(),
        vector: vector.to_vec(),
        text: format!("text of {}", logical_id),
        metadata,
    }
}

fn document(source_id: &str, filename: &str, chunks: usize) -> Vec<LogicalRecord> {
    (0..chunks)
        .map(|i| {
            record(
                &format!("{}_chunk{:04}_x", source_id, i),
                source_id,
                filename,
                [0.1, 0.2, 0.3, 0.4],
            )
        })
        .collect()
}

async fn manager_with(records: Vec<LogicalRecord>, config: &Config) -> VectorManager {
    let backend = Arc::new(MemoryBackend::new(DIM));
    let manager = VectorManager::new(backend, config);
    if !records.is_empty() {
        manager.upsert(&records).await.unwrap();
    }
    manager
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let config = test_config(100);
    let manager = manager_with(document("src_a", "a.pdf", 5), &config).await;

    assert_eq!(manager.stats().await.unwrap().total_vectors, 5);

    manager.upsert(&document("src_a", "a.pdf", 5)).await.unwrap();
    assert_eq!(manager.stats().await.unwrap().total_vectors, 5);
}

#[tokio::test]
async fn test_batch_upsert_and_verification() {
    let config = test_config(10);
    let manager = manager_with(Vec::new(), &config).await;

    let records = document("src_a", "a.pdf", 25);
    let ids: Vec<String> = records.iter().map(|r| r.logical_id.clone()).collect();

    let receipt = manager.upsert_batched(&records, &SilentProgress).await;
    assert_eq!(receipt.total_requested, 25);
    assert_eq!(receipt.total_uploaded, 25);
    assert!(receipt.success());

    let verification = manager.verify_upload(&ids, 5).await.unwrap();
    assert!(verification.success);
    assert_eq!(verification.found, verification.sample_size);

    let mut with_ghost = ids.clone();
    with_ghost.push("src_a_chunk9999_x".to_string());
    let verification = manager
        .verify_upload(&with_ghost, with_ghost.len())
        .await
        .unwrap();
    assert!(!verification.success);
    assert_eq!(verification.missing, 1);
}

#[tokio::test]
async fn test_batch_deletion_accounting() {
    let config = test_config(10);
    let manager = manager_with(document("src_a", "a.pdf", 25), &config).await;

    let ids: Vec<String> = (0..25)
        .map(|i| format!("src_a_chunk{:04}_x", i))
        .collect();
    let batch = manager
        .deletion
        .delete_chunks_batch(&ids, &SilentProgress)
        .await;

    assert_eq!(batch.total_requested, 25);
    assert_eq!(
        batch.total_deleted + batch.total_failed,
        batch.total_requested
    );
    assert_eq!(batch.individual_results.len(), 25);
    assert!(batch.success());
    assert!(batch.finished_at.is_some());
    assert_eq!(manager.stats().await.unwrap().total_vectors, 0);
}

#[tokio::test]
async fn test_preview_does_not_mutate() {
    let config = test_config(100);
    let manager = manager_with(
        [document("src_a", "a.pdf", 3), document("src_b", "b.pdf", 2)].concat(),
        &config,
    )
    .await;

    let preview = manager
        .deletion
        .preview(&DeletionScope::Documents(vec![
            "src_a".to_string(),
            "src_missing".to_string(),
        ]))
        .await
        .unwrap();

    assert_eq!(preview.total_chunks, 3);
    assert_eq!(preview.total_documents, 1);
    assert!(preview
        .warnings
        .iter()
        .any(|w| w.contains("src_missing")));
    assert_eq!(manager.stats().await.unwrap().total_vectors, 5);
}

#[tokio::test]
async fn test_preview_warns_on_large_deletions() {
    let mut config = test_config(100);
    config.safety.warn_chunk_threshold = 2;
    let manager = manager_with(document("src_a", "a.pdf", 5), &config).await;

    let preview = manager
        .deletion
        .preview(&DeletionScope::Documents(vec!["src_a".to_string()]))
        .await
        .unwrap();
    assert_eq!(preview.total_chunks, 5);
    assert!(preview.warnings.iter().any(|w| w.contains("Large deletion")));
}

#[tokio::test]
async fn test_delete_document_verified() {
    let config = test_config(100);
    let manager = manager_with(
        [document("src_a", "a.pdf", 3), document("src_b", "b.pdf", 2)].concat(),
        &config,
    )
    .await;

    let result = manager.deletion.delete_document("src_a", true).await;
    assert!(result.success);
    assert_eq!(result.deleted_count, 3);

    let (exists, _) = manager.check_source_exists("src_a").await;
    assert!(!exists);
    let (exists, count) = manager.check_source_exists("src_b").await;
    assert!(exists);
    assert_eq!(count, 2);

    let missing = manager.deletion.delete_document("src_missing", true).await;
    assert!(!missing.success);
    assert!(missing.message.contains("No chunks found"));
}

#[tokio::test]
async fn test_filter_deletion_dry_run() {
    let config = test_config(100);
    let mut records = document("src_a", "a.pdf", 3);
    for r in &mut records {
        r.metadata.set(KEY_CATEGORY, json!("HR"));
    }
    let manager = manager_with(records, &config).await;

    let filter = MetadataFilter::new().with(KEY_CATEGORY, json!("HR"));
    let dry = manager.deletion.delete_by_filter(&filter, true).await;
    assert!(dry.success);
    assert!(dry.message.contains("DRY RUN"));
    assert_eq!(dry.deleted_count, 0);
    assert_eq!(manager.stats().await.unwrap().total_vectors, 3);

    let real = manager.deletion.delete_by_filter(&filter, false).await;
    assert!(real.success);
    assert_eq!(real.deleted_count, 3);
    assert_eq!(manager.stats().await.unwrap().total_vectors, 0);
}

#[tokio::test]
async fn test_duplicate_grouping_and_cleanup_keeps_latest() {
    let config = test_config(100);
    let mut old = document("src_old", "report.pdf", 2);
    for r in &mut old {
        r.metadata.set(KEY_UPLOAD_DATE, json!("2024-01-01"));
    }
    let mut new = document("src_new", "report.pdf", 2);
    for r in &mut new {
        r.metadata.set(KEY_UPLOAD_DATE, json!("2025-06-01"));
    }
    let other = document("src_other", "unique.pdf", 1);
    let manager = manager_with([old, new, other].concat(), &config).await;

    let groups = manager.discovery.find_duplicate_documents().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].filename, "report.pdf");
    assert_eq!(groups[0].count, 2);

    // Manual strategy never deletes, even when asked to execute.
    let plan = manager
        .cleanup_duplicates(CleanupStrategy::Manual, true, &SilentProgress)
        .await
        .unwrap();
    assert!(plan.to_delete.is_empty());
    assert!(plan.result.is_none());

    let plan = manager
        .cleanup_duplicates(CleanupStrategy::KeepLatest, true, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(plan.to_delete, vec!["src_old".to_string()]);
    let result = plan.result.unwrap();
    assert_eq!(result.total_deleted, 1);

    let (exists, _) = manager.check_source_exists("src_old").await;
    assert!(!exists);
    let (exists, _) = manager.check_source_exists("src_new").await;
    assert!(exists);
}

#[tokio::test]
async fn test_prefix_fallback_grouping_and_deletion() {
    let config = test_config(100);
    // A record written without source_id, recoverable only through its
    // logical ID prefix.
    let mut legacy = record("src_legacy_chunk0001_x", "ignored", "legacy.pdf", [0.1; DIM]);
    legacy.metadata.0.remove(KEY_SOURCE_ID);
    let manager = manager_with(vec![legacy], &config).await;

    let docs = manager.discovery.list_all_documents(None).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source_id, "src_legacy");

    let (exists, count) = manager.check_source_exists("src_legacy").await;
    assert!(exists);
    assert_eq!(count, 1);

    let result = manager.deletion.delete_document("src_legacy", true).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(manager.stats().await.unwrap().total_vectors, 0);
}

#[tokio::test]
async fn test_pagination_math_over_live_listing() {
    let config = test_config(100);
    let records: Vec<LogicalRecord> = (0..45)
        .flat_map(|i| document(&format!("src_{:03}", i), &format!("doc_{:03}.pdf", i), 1))
        .collect();
    let manager = manager_with(records, &config).await;

    let page = manager.discovery.browse_documents(2, 20).await.unwrap();
    assert_eq!(page.items.len(), 20);
    assert_eq!(page.total_items, 45);
    assert_eq!(page.total_pages, 3);
    assert!(page.has_next());
    assert!(page.has_previous());

    let last = manager.discovery.browse_documents(3, 20).await.unwrap();
    assert_eq!(last.items.len(), 5);
    assert!(!last.has_next());

    let beyond = manager.discovery.browse_documents(9, 20).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_items, 45);
}

#[tokio::test]
async fn test_find_and_delete_by_filename() {
    let config = test_config(100);
    let manager = manager_with(
        [
            document("src_a", "quarterly-report.pdf", 2),
            document("src_b", "summary.pdf", 1),
        ]
        .concat(),
        &config,
    )
    .await;

    // Dry run matches but touches nothing.
    let sweep = manager
        .find_and_delete_by_filename("quarterly", false, false, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(sweep.matched.len(), 1);
    assert!(sweep.result.is_none());
    assert_eq!(manager.stats().await.unwrap().total_vectors, 3);

    let sweep = manager
        .find_and_delete_by_filename("quarterly-report.pdf", true, true, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(sweep.matched.len(), 1);
    assert_eq!(sweep.result.unwrap().total_deleted, 1);
    assert_eq!(manager.stats().await.unwrap().total_vectors, 1);
}

#[tokio::test]
async fn test_content_sweep_respects_confidence_bar() {
    let config = test_config(100);
    // cos(query, exact) = 1.0 (high), cos(query, near) = 0.9 (medium),
    // cos(query, far) = 0.0 (low).
    let exact = record("src_a_chunk0001_x", "src_a", "a.pdf", [1.0, 0.0, 0.0, 0.0]);
    let near = record(
        "src_b_chunk0001_x",
        "src_b",
        "b.pdf",
        [0.9, 0.43589, 0.0, 0.0],
    );
    let far = record("src_c_chunk0001_x", "src_c", "c.pdf", [0.0, 1.0, 0.0, 0.0]);
    let manager = manager_with(vec![exact, near, far], &config).await;

    let query = [1.0, 0.0, 0.0, 0.0];
    let sweep = manager
        .find_and_delete_by_content(
            "payroll",
            &query,
            10,
            ConfidenceLevel::High,
            false,
            &SilentProgress,
        )
        .await
        .unwrap();
    assert_eq!(sweep.search.total_matches, 3);
    assert_eq!(sweep.selected, vec!["src_a_chunk0001_x".to_string()]);
    assert!(sweep.result.is_none());

    let sweep = manager
        .find_and_delete_by_content(
            "payroll",
            &query,
            10,
            ConfidenceLevel::Medium,
            true,
            &SilentProgress,
        )
        .await
        .unwrap();
    assert_eq!(sweep.selected.len(), 2);
    assert_eq!(sweep.result.unwrap().total_deleted, 2);
    assert_eq!(manager.stats().await.unwrap().total_vectors, 1);
}

#[tokio::test]
async fn test_delete_older_than_excludes_undated() {
    let config = test_config(100);
    let mut old = document("src_old", "old.pdf", 1);
    old[0].metadata.set(KEY_UPLOAD_DATE, json!("2023-05-01"));
    let mut new = document("src_new", "new.pdf", 1);
    new[0].metadata.set(KEY_UPLOAD_DATE, json!("2025-05-01"));
    let undated = document("src_undated", "undated.pdf", 1);
    let manager = manager_with([old, new, undated].concat(), &config).await;

    let sweep = manager
        .delete_older_than("2024-01-01", None, true, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(sweep.matched.len(), 1);
    assert_eq!(sweep.matched[0].source_id, "src_old");
    assert_eq!(sweep.result.unwrap().total_deleted, 1);

    let (exists, _) = manager.check_source_exists("src_undated").await;
    assert!(exists);
}

/// A backend that acknowledges deletions without performing them, to
/// exercise the verification downgrade.
struct AmnesiacBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl VectorBackend for AmnesiacBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn batch_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize> {
        self.inner.upsert(records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        self.inner.query(vector, top_k, filter, include_metadata).await
    }

    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>> {
        self.inner.fetch(logical_ids).await
    }

    async fn delete_by_ids(&self, _logical_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn delete_by_filter(&self, _filter: &MetadataFilter) -> Result<()> {
        Ok(())
    }

    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>> {
        self.inner.search_by_metadata(filter, limit).await
    }

    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        self.inner.list_documents(filter, limit).await
    }

    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>> {
        self.inner.list_chunks(source_id, limit).await
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.inner.stats().await
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_claimed_deletion_is_downgraded_when_data_survives() {
    let config = test_config(100);
    let backend = AmnesiacBackend {
        inner: MemoryBackend::new(DIM),
    };
    backend
        .upsert(&document("src_a", "a.pdf", 2))
        .await
        .unwrap();
    let manager = VectorManager::new(Arc::new(backend), &config);

    let result = manager.deletion.delete_chunk("src_a_chunk0000_x", true).await;
    assert!(!result.success);
    assert!(result.message.contains("still present"));

    let result = manager.deletion.delete_document("src_a", true).await;
    assert!(!result.success);
    assert!(result.message.contains("incomplete"));
}

#[tokio::test]
async fn test_unverified_deletion_trusts_the_backend() {
    let config = test_config(100);
    let backend = AmnesiacBackend {
        inner: MemoryBackend::new(DIM),
    };
    backend
        .upsert(&document("src_a", "a.pdf", 2))
        .await
        .unwrap();
    let manager = VectorManager::new(Arc::new(backend), &config);

    let result = manager.deletion.delete_chunk("src_a_chunk0000_x", false).await;
    assert!(result.success);

    let result = manager.deletion.delete_document("src_a", false).await;
    assert!(result.success);
}

/// A backend that refuses to delete any batch containing a designated ID,
/// to exercise partial-failure accounting.
struct UnreliableBackend {
    inner: MemoryBackend,
    refuse_id: String,
}

#[async_trait]
impl VectorBackend for UnreliableBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn batch_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize> {
        self.inner.upsert(records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        self.inner.query(vector, top_k, filter, include_metadata).await
    }

    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>> {
        self.inner.fetch(logical_ids).await
    }

    async fn delete_by_ids(&self, logical_ids: &[String]) -> Result<()> {
        if logical_ids.iter().any(|id| *id == self.refuse_id) {
            anyhow::bail!("connection reset by peer");
        }
        self.inner.delete_by_ids(logical_ids).await
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()> {
        self.inner.delete_by_filter(filter).await
    }

    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>> {
        self.inner.search_by_metadata(filter, limit).await
    }

    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        self.inner.list_documents(filter, limit).await
    }

    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>> {
        self.inner.list_chunks(source_id, limit).await
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.inner.stats().await
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_batch_deletion_accounts_for_failed_batches() {
    let config = test_config(5);
    let backend = UnreliableBackend {
        inner: MemoryBackend::new(DIM),
        refuse_id: "src_a_chunk0020_x".to_string(),
    };
    backend
        .upsert(&document("src_a", "a.pdf", 21))
        .await
        .unwrap();
    let manager = VectorManager::new(Arc::new(backend), &config);

    let ids: Vec<String> = (0..21)
        .map(|i| format!("src_a_chunk{:04}_x", i))
        .collect();
    let batch = manager
        .deletion
        .delete_chunks_batch(&ids, &SilentProgress)
        .await;

    assert_eq!(batch.total_requested, 21);
    assert_eq!(batch.total_deleted, 20);
    assert_eq!(batch.total_failed, 1);
    assert_eq!(
        batch.total_deleted + batch.total_failed,
        batch.total_requested
    );
    assert!(!batch.success());
    assert_eq!(batch.errors.len(), 1);
    assert!(batch.errors[0].starts_with("Batch 5/5:"));

    let failed: Vec<_> = batch
        .individual_results
        .iter()
        .filter(|r| !r.success)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target_id.as_deref(), Some("src_a_chunk0020_x"));

    // The surviving chunk is still readable; the rest are gone.
    assert_eq!(manager.stats().await.unwrap().total_vectors, 1);
}
