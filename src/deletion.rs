//! Deletion workflows: single, batch, filter-based, with verification and
//! impact previews.
//!
//! Every destructive call verifies its own outcome with a follow-up read
//! and reports through a [`DeletionResult`] rather than a bare `Result`.
//! A backend that claims success while the data survives is downgraded to
//! failure here.

use std::sync::Arc;

use anyhow::Result;

use crate::backend::VectorBackend;
use crate::config::{BackendConfig, SafetyConfig};
use crate::models::{source_prefix, MetadataFilter};
use crate::progress::ProgressReporter;
use crate::results::{BatchDeletionResult, DeletionPreview, DeletionResult, DeletionTarget};

/// What a deletion (or its preview) is aimed at.
#[derive(Debug, Clone)]
pub enum DeletionScope {
    Documents(Vec<String>),
    Chunks(Vec<String>),
    Filter(MetadataFilter),
}

pub struct DeletionManager {
    backend: Arc<dyn VectorBackend>,
    batch_size: usize,
    scan_limit: usize,
    safety: SafetyConfig,
}

impl DeletionManager {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        config: &BackendConfig,
        safety: SafetyConfig,
    ) -> Self {
        Self {
            backend,
            batch_size: config.batch_size.max(1),
            scan_limit: config.scan_limit,
            safety,
        }
    }

    /// Delete one chunk by logical ID, confirming it is gone when
    /// `verify` is set.
    ///
    /// Skipping verification is for eventually-consistent backends where
    /// an immediate re-read can still see the record.
    pub async fn delete_chunk(&self, logical_id: &str, verify: bool) -> DeletionResult {
        let target = DeletionTarget::Chunk;
        let id = Some(logical_id.to_string());

        if let Err(e) = self.backend.delete_chunk(logical_id).await {
            return DeletionResult::failed(target, id, format!("Deletion failed: {}", e));
        }
        if !verify {
            return DeletionResult::ok(target, id, 1);
        }

        // Trust nothing: re-read the chunk. A verification read that
        // itself fails leaves the outcome unknown, which is not success.
        match self.backend.fetch(&[logical_id.to_string()]).await {
            Ok(found) if found.contains_key(logical_id) => DeletionResult::failed(
                target,
                id,
                format!(
                    "Deletion reported success but chunk '{}' is still present",
                    logical_id
                ),
            ),
            Ok(_) => DeletionResult::ok(target, id, 1),
            Err(e) => DeletionResult::failed(
                target,
                id,
                format!("Deletion unverified: follow-up read failed: {}", e),
            ),
        }
    }

    /// Delete chunks in batches, continuing past failures.
    pub async fn delete_chunks_batch(
        &self,
        logical_ids: &[String],
        progress: &dyn ProgressReporter,
    ) -> BatchDeletionResult {
        let mut batch = BatchDeletionResult::begin(logical_ids.len());
        if logical_ids.is_empty() {
            batch.errors.push("No chunk IDs provided".to_string());
            batch.complete();
            return batch;
        }

        let batch_count = logical_ids.len().div_ceil(self.batch_size);
        for (index, ids) in logical_ids.chunks(self.batch_size).enumerate() {
            match self.backend.delete_by_ids(ids).await {
                Ok(()) => {
                    batch.total_deleted += ids.len();
                    for id in ids {
                        batch.individual_results.push(DeletionResult::ok(
                            DeletionTarget::Chunk,
                            Some(id.clone()),
                            1,
                        ));
                    }
                }
                Err(e) => {
                    let message = format!("Batch {}/{}: {}", index + 1, batch_count, e);
                    progress.note(&message);
                    batch.errors.push(message);
                    for id in ids {
                        batch.individual_results.push(DeletionResult::failed(
                            DeletionTarget::Chunk,
                            Some(id.clone()),
                            format!("Batch deletion failed: {}", e),
                        ));
                    }
                }
            }
            progress.batch("delete-chunks", index + 1, batch_count);
            if index + 1 < batch_count {
                tokio::time::sleep(self.backend.batch_delay()).await;
            }
        }

        batch.complete();
        batch
    }

    /// Delete all chunks of one document, confirming none remain when
    /// `verify` is set.
    pub async fn delete_document(&self, source_id: &str, verify: bool) -> DeletionResult {
        let target = DeletionTarget::Document;
        let id = Some(source_id.to_string());

        let (exists, count) = self.backend.check_source_exists(source_id).await;
        if !exists {
            return DeletionResult::failed(
                target,
                id,
                format!("No chunks found for source_id '{}'", source_id),
            );
        }

        if let Err(e) = self
            .backend
            .delete_by_filter(&MetadataFilter::source_id(source_id))
            .await
        {
            return DeletionResult::failed(target, id, format!("Deletion failed: {}", e));
        }
        if !verify {
            return DeletionResult::ok(target, id, count);
        }

        match self.backend.list_chunks(source_id, 1).await {
            Ok(remaining) if !remaining.is_empty() => DeletionResult::failed(
                target,
                id,
                format!(
                    "Deletion incomplete: chunks remain for source_id '{}'",
                    source_id
                ),
            ),
            Ok(_) => DeletionResult::ok(target, id, count),
            Err(e) => DeletionResult::failed(
                target,
                id,
                format!("Deletion unverified: follow-up read failed: {}", e),
            ),
        }
    }

    /// Delete several documents, one verified deletion each.
    ///
    /// Counts in the returned batch are in document units; per-document
    /// chunk counts live in the individual results.
    pub async fn delete_documents_batch(
        &self,
        source_ids: &[String],
        progress: &dyn ProgressReporter,
    ) -> BatchDeletionResult {
        let mut batch = BatchDeletionResult::begin(source_ids.len());
        if source_ids.is_empty() {
            batch.errors.push("No source IDs provided".to_string());
            batch.complete();
            return batch;
        }

        for (index, source_id) in source_ids.iter().enumerate() {
            let result = self.delete_document(source_id, true).await;
            if result.success {
                batch.total_deleted += 1;
            } else {
                batch.errors.push(result.message.clone());
            }
            batch.individual_results.push(result);
            progress.batch("delete-documents", index + 1, source_ids.len());
            if (index + 1) % self.batch_size == 0 && index + 1 < source_ids.len() {
                tokio::time::sleep(self.backend.batch_delay()).await;
            }
        }

        batch.complete();
        batch
    }

    /// Delete everything matching a metadata filter.
    ///
    /// With `dry_run` the backend is only read, never mutated, and the
    /// result reports what *would* be deleted.
    pub async fn delete_by_filter(&self, filter: &MetadataFilter, dry_run: bool) -> DeletionResult {
        let target = DeletionTarget::Filter;
        if filter.is_empty() {
            return DeletionResult::failed(target, None, "Refusing to delete with an empty filter");
        }

        let matched = match self.backend.search_by_metadata(filter, self.scan_limit).await {
            Ok(matches) => matches.len(),
            Err(e) => {
                return DeletionResult::failed(target, None, format!("Filter search failed: {}", e))
            }
        };

        if dry_run {
            let mut result = DeletionResult::ok(target, None, 0);
            result.message = format!("DRY RUN: would delete {} chunks", matched);
            return result;
        }

        if matched == 0 {
            return DeletionResult::failed(target, None, "No chunks match the filter");
        }

        if let Err(e) = self.backend.delete_by_filter(filter).await {
            return DeletionResult::failed(target, None, format!("Deletion failed: {}", e));
        }

        match self.backend.search_by_metadata(filter, 1).await {
            Ok(remaining) if !remaining.is_empty() => DeletionResult::failed(
                target,
                None,
                "Deletion incomplete: chunks still match the filter",
            ),
            Ok(_) => {
                let mut result = DeletionResult::ok(target, None, matched);
                result.message = format!("Deleted {} chunks", matched);
                result
            }
            Err(e) => DeletionResult::failed(
                target,
                None,
                format!("Deletion unverified: follow-up read failed: {}", e),
            ),
        }
    }

    /// Impact analysis for a pending deletion. Read-only.
    pub async fn preview(&self, scope: &DeletionScope) -> Result<DeletionPreview> {
        let mut preview = DeletionPreview::empty();

        match scope {
            DeletionScope::Documents(source_ids) => {
                for source_id in source_ids {
                    match self.backend.document_info(source_id).await? {
                        Some(doc) => {
                            preview.total_chunks += doc.chunk_count;
                            preview.affected_documents.push(doc);
                        }
                        None => preview
                            .add_warning(format!("source_id '{}' not found", source_id)),
                    }
                }
            }
            DeletionScope::Chunks(chunk_ids) => {
                preview.total_chunks = chunk_ids.len();
                let found = self.backend.fetch(chunk_ids).await?;
                let mut seen_sources = Vec::new();
                for chunk_id in chunk_ids {
                    let Some(record) = found.get(chunk_id) else {
                        preview.add_warning(format!("chunk '{}' not found", chunk_id));
                        continue;
                    };
                    let source = record
                        .metadata
                        .source_id()
                        .or_else(|| source_prefix(chunk_id));
                    if let Some(source) = source {
                        if !seen_sources.iter().any(|s| s == source) {
                            seen_sources.push(source.to_string());
                            if let Some(doc) = self.backend.document_info(source).await? {
                                preview.affected_documents.push(doc);
                            }
                        }
                    }
                }
            }
            DeletionScope::Filter(filter) => {
                preview.filter_criteria = Some(filter.clone());
                let matches = self
                    .backend
                    .search_by_metadata(filter, self.scan_limit)
                    .await?;
                preview.total_chunks = matches.len();
                preview.affected_documents = crate::backend::group_documents(
                    matches.into_iter().map(|m| m.metadata),
                    true,
                    usize::MAX,
                );
            }
        }

        preview.total_documents = preview.affected_documents.len();
        if preview.total_chunks > self.safety.warn_chunk_threshold {
            preview.add_warning(format!(
                "Large deletion: {} chunks exceeds the warning threshold of {}",
                preview.total_chunks, self.safety.warn_chunk_threshold
            ));
        }
        if preview.total_documents > self.safety.warn_document_threshold {
            preview.add_warning(format!(
                "Large deletion: {} documents exceeds the warning threshold of {}",
                preview.total_documents, self.safety.warn_document_threshold
            ));
        }

        Ok(preview)
    }
}
