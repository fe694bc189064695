//! The high-level facade composing the backend with the deletion and
//! discovery managers, plus the multi-step maintenance workflows.
//!
//! Workflows that delete are two-phase: a read-only planning pass that
//! can be returned as-is (dry run), then an execution pass that reuses
//! the deletion manager's verified paths. Nothing here talks to the wire
//! directly.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::backend::VectorBackend;
use crate::config::Config;
use crate::deletion::{DeletionManager, DeletionScope};
use crate::discovery::DiscoveryManager;
use crate::models::{DocumentSummary, IndexStats, LogicalRecord, MetadataFilter};
use crate::progress::ProgressReporter;
use crate::results::{
    BatchDeletionResult, BatchUpsertReceipt, ConfidenceLevel, ContentSearchResult,
    DuplicateGroup, UploadVerification,
};

/// How [`VectorManager::cleanup_duplicates`] picks the survivor of each
/// duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStrategy {
    /// Keep the most recent upload, delete the rest.
    KeepLatest,
    /// Keep the earliest upload, delete the rest.
    KeepEarliest,
    /// Plan only; never deletes regardless of the execute flag.
    Manual,
}

/// Plan (and optionally outcome) of a duplicate cleanup run.
#[derive(Debug, Serialize)]
pub struct CleanupPlan {
    pub groups: Vec<DuplicateGroup>,
    /// Source IDs selected for deletion.
    pub to_delete: Vec<String>,
    pub result: Option<BatchDeletionResult>,
}

/// Plan (and optionally outcome) of a find-then-delete workflow over
/// documents.
#[derive(Debug, Serialize)]
pub struct DocumentSweep {
    pub matched: Vec<DocumentSummary>,
    pub result: Option<BatchDeletionResult>,
}

/// Plan (and optionally outcome) of a content-search-then-delete
/// workflow over chunks.
#[derive(Debug, Serialize)]
pub struct ContentSweep {
    pub search: ContentSearchResult,
    /// Chunk IDs that met the confidence bar.
    pub selected: Vec<String>,
    pub result: Option<BatchDeletionResult>,
}

pub struct VectorManager {
    backend: Arc<dyn VectorBackend>,
    pub deletion: DeletionManager,
    pub discovery: DiscoveryManager,
    batch_size: usize,
}

impl VectorManager {
    pub fn new(backend: Arc<dyn VectorBackend>, config: &Config) -> Self {
        let deletion = DeletionManager::new(
            Arc::clone(&backend),
            &config.backend,
            config.safety.clone(),
        );
        let discovery = DiscoveryManager::new(Arc::clone(&backend), &config.backend);
        Self {
            backend,
            deletion,
            discovery,
            batch_size: config.backend.batch_size.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    pub async fn test_connection(&self) -> bool {
        self.backend.test_connection().await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.backend.stats().await
    }

    pub async fn check_source_exists(&self, source_id: &str) -> (bool, usize) {
        self.backend.check_source_exists(source_id).await
    }

    pub async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize> {
        self.backend.upsert(records).await
    }

    /// Batched upsert with per-batch progress. Failed batches are
    /// reported and skipped, not retried.
    pub async fn upsert_batched(
        &self,
        records: &[LogicalRecord],
        progress: &dyn ProgressReporter,
    ) -> BatchUpsertReceipt {
        let mut receipt = BatchUpsertReceipt {
            total_requested: records.len(),
            total_uploaded: 0,
            errors: Vec::new(),
        };
        if records.is_empty() {
            receipt.errors.push("No records to upload".to_string());
            return receipt;
        }

        let batch_count = records.len().div_ceil(self.batch_size);
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            match self.backend.upsert(batch).await {
                Ok(count) => receipt.total_uploaded += count,
                Err(e) => {
                    let message = format!("Batch {}/{}: {}", index + 1, batch_count, e);
                    progress.note(&message);
                    receipt.errors.push(message);
                }
            }
            progress.batch("upsert", index + 1, batch_count);
            if index + 1 < batch_count {
                tokio::time::sleep(self.backend.batch_delay()).await;
            }
        }
        receipt
    }

    /// Sampled post-upload verification: re-read every k-th uploaded ID
    /// and confirm it exists.
    pub async fn verify_upload(
        &self,
        logical_ids: &[String],
        sample_size: usize,
    ) -> Result<UploadVerification> {
        let sample_size = sample_size.max(1).min(logical_ids.len());
        if logical_ids.is_empty() {
            return Ok(UploadVerification {
                total_uploaded: 0,
                sample_size: 0,
                found: 0,
                missing: 0,
                success: false,
            });
        }

        let step = logical_ids.len().div_ceil(sample_size);
        let sample: Vec<String> = logical_ids
            .iter()
            .step_by(step)
            .take(sample_size)
            .cloned()
            .collect();

        let fetched = self.backend.fetch(&sample).await?;
        let found = sample.iter().filter(|id| fetched.contains_key(*id)).count();
        Ok(UploadVerification {
            total_uploaded: logical_ids.len(),
            sample_size: sample.len(),
            found,
            missing: sample.len() - found,
            success: found == sample.len(),
        })
    }

    /// Search chunks by content, select the hits at or above the
    /// confidence bar, and optionally delete them.
    pub async fn find_and_delete_by_content(
        &self,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
        min_confidence: ConfidenceLevel,
        execute: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<ContentSweep> {
        let search = self
            .discovery
            .search_chunks_by_content(query, query_vector, top_k, None)
            .await?;

        let selected: Vec<String> = search
            .hits
            .iter()
            .filter(|hit| confidence_rank(hit.confidence) >= confidence_rank(min_confidence))
            .map(|hit| hit.chunk_id.clone())
            .collect();

        let result = if execute && !selected.is_empty() {
            Some(self.deletion.delete_chunks_batch(&selected, progress).await)
        } else {
            None
        };

        Ok(ContentSweep {
            search,
            selected,
            result,
        })
    }

    /// Find documents by filename and optionally delete them.
    pub async fn find_and_delete_by_filename(
        &self,
        filename: &str,
        exact: bool,
        execute: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<DocumentSweep> {
        let matched = self.discovery.search_by_filename(filename, exact).await?;

        let result = if execute && !matched.is_empty() {
            let source_ids: Vec<String> =
                matched.iter().map(|d| d.source_id.clone()).collect();
            Some(
                self.deletion
                    .delete_documents_batch(&source_ids, progress)
                    .await,
            )
        } else {
            None
        };

        Ok(DocumentSweep { matched, result })
    }

    /// Resolve duplicate filenames: keep one document per group according
    /// to the strategy, delete the rest.
    ///
    /// Documents without an upload date sort before dated ones, so they
    /// are never the implicit "latest".
    pub async fn cleanup_duplicates(
        &self,
        strategy: CleanupStrategy,
        execute: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<CleanupPlan> {
        let groups = self.discovery.find_duplicate_documents().await?;

        let mut to_delete = Vec::new();
        if strategy != CleanupStrategy::Manual {
            for group in &groups {
                let mut docs: Vec<&DocumentSummary> = group.documents.iter().collect();
                docs.sort_by(|a, b| a.upload_date.cmp(&b.upload_date));
                let keep = match strategy {
                    CleanupStrategy::KeepLatest => docs.last().map(|d| d.source_id.clone()),
                    CleanupStrategy::KeepEarliest => docs.first().map(|d| d.source_id.clone()),
                    CleanupStrategy::Manual => unreachable!(),
                };
                for doc in docs {
                    if Some(&doc.source_id) != keep.as_ref() {
                        to_delete.push(doc.source_id.clone());
                    }
                }
            }
        }

        let result = if execute && strategy != CleanupStrategy::Manual && !to_delete.is_empty() {
            Some(
                self.deletion
                    .delete_documents_batch(&to_delete, progress)
                    .await,
            )
        } else {
            None
        };

        Ok(CleanupPlan {
            groups,
            to_delete,
            result,
        })
    }

    /// Find documents uploaded before `cutoff` (ISO-8601 date or
    /// datetime; lexicographic compare) and optionally delete them.
    /// Documents without an upload date are never selected.
    pub async fn delete_older_than(
        &self,
        cutoff: &str,
        extra_filter: Option<&MetadataFilter>,
        execute: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<DocumentSweep> {
        let documents = self
            .backend
            .list_documents(extra_filter, usize::MAX)
            .await?;

        let matched: Vec<DocumentSummary> = documents
            .into_iter()
            .filter(|doc| {
                doc.upload_date
                    .as_deref()
                    .map(|date| date < cutoff)
                    .unwrap_or(false)
            })
            .collect();

        let result = if execute && !matched.is_empty() {
            let source_ids: Vec<String> =
                matched.iter().map(|d| d.source_id.clone()).collect();
            Some(
                self.deletion
                    .delete_documents_batch(&source_ids, progress)
                    .await,
            )
        } else {
            None
        };

        Ok(DocumentSweep { matched, result })
    }

    /// Preview what a filter deletion would remove, without mutating.
    pub async fn preview_filter_deletion(
        &self,
        filter: &MetadataFilter,
    ) -> Result<crate::results::DeletionPreview> {
        self.deletion
            .preview(&DeletionScope::Filter(filter.clone()))
            .await
    }
}

fn confidence_rank(level: ConfidenceLevel) -> u8 {
    match level {
        ConfidenceLevel::High => 2,
        ConfidenceLevel::Medium => 1,
        ConfidenceLevel::Low => 0,
    }
}
