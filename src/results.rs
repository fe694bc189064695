//! Structured result types returned across the public boundary.
//!
//! Every destructive operation reports through these instead of bare
//! `Result`s, so callers (and the out-of-scope API layer) always get a
//! success flag, a human-readable message, and the structured payload in
//! one serializable value.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ChunkSummary, DocumentSummary, Metadata, MetadataFilter};

/// Overall status of a deletion, derived from its counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    Success,
    Partial,
    Failed,
}

/// What a deletion targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionTarget {
    Chunk,
    Document,
    Filter,
}

/// Result of a single deletion operation.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionResult {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
    pub target_id: Option<String>,
    pub target_type: DeletionTarget,
    pub timestamp: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl DeletionResult {
    pub fn ok(target_type: DeletionTarget, target_id: Option<String>, deleted: usize) -> Self {
        Self {
            success: true,
            message: "Deletion successful".to_string(),
            deleted_count: deleted,
            target_id,
            target_type,
            timestamp: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn failed(
        target_type: DeletionTarget,
        target_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: vec![message.clone()],
            message,
            deleted_count: 0,
            target_id,
            target_type,
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self) -> DeletionStatus {
        if self.success {
            DeletionStatus::Success
        } else if self.deleted_count > 0 {
            DeletionStatus::Partial
        } else {
            DeletionStatus::Failed
        }
    }
}

/// Aggregated result of a batch deletion.
///
/// Invariant: `total_deleted + total_failed == total_requested`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDeletionResult {
    pub total_requested: usize,
    pub total_deleted: usize,
    pub total_failed: usize,
    pub individual_results: Vec<DeletionResult>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchDeletionResult {
    pub fn begin(total_requested: usize) -> Self {
        Self {
            total_requested,
            total_deleted: 0,
            total_failed: 0,
            individual_results: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark the batch complete, reconciling the failed count so the
    /// accounting invariant holds even when a backend under-reports.
    pub fn complete(&mut self) {
        self.total_failed = self.total_requested.saturating_sub(self.total_deleted);
        self.finished_at = Some(Utc::now());
    }

    pub fn success(&self) -> bool {
        self.total_failed == 0 && self.total_deleted > 0
    }

    pub fn status(&self) -> DeletionStatus {
        if self.total_deleted == self.total_requested && self.total_requested > 0 {
            DeletionStatus::Success
        } else if self.total_deleted > 0 {
            DeletionStatus::Partial
        } else {
            DeletionStatus::Failed
        }
    }
}

/// Impact analysis for a pending deletion, produced without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionPreview {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub affected_documents: Vec<DocumentSummary>,
    pub filter_criteria: Option<MetadataFilter>,
    pub warnings: Vec<String>,
}

impl DeletionPreview {
    pub fn empty() -> Self {
        Self {
            total_chunks: 0,
            total_documents: 0,
            affected_documents: Vec::new(),
            filter_criteria: None,
            warnings: Vec::new(),
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Three-tier classification of a similarity score, used to gate
/// auto-selection for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// `None` means the match came from an exact lookup, not a similarity
    /// score, and counts as high confidence.
    pub fn from_score(score: Option<f32>) -> Self {
        match score {
            None => ConfidenceLevel::High,
            Some(s) if s >= 0.95 => ConfidenceLevel::High,
            Some(s) if s >= 0.85 => ConfidenceLevel::Medium,
            Some(_) => ConfidenceLevel::Low,
        }
    }
}

/// A chunk matched by content search.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub source_id: String,
    pub text_preview: String,
    pub similarity_score: Option<f32>,
    pub confidence: ConfidenceLevel,
    pub metadata: Metadata,
}

/// Ranked result of a content (similarity) search.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSearchResult {
    pub query: String,
    pub total_matches: usize,
    pub hits: Vec<ChunkHit>,
    pub elapsed_ms: u64,
}

/// Documents sharing one filename.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub filename: String,
    pub count: usize,
    pub documents: Vec<DocumentSummary>,
}

/// One page of documents.
///
/// Totals are recomputed from the current backend snapshot on every call;
/// no cursor is persisted across pages, so page contents are not stable
/// under concurrent writes.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedDocuments {
    pub items: Vec<DocumentSummary>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl PaginatedDocuments {
    pub fn new(
        items: Vec<DocumentSummary>,
        page: usize,
        page_size: usize,
        total_items: usize,
    ) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(page_size)
        };
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Aggregated outcome of a batched upsert.
#[derive(Debug, Clone, Serialize)]
pub struct BatchUpsertReceipt {
    pub total_requested: usize,
    pub total_uploaded: usize,
    pub errors: Vec<String>,
}

impl BatchUpsertReceipt {
    pub fn success(&self) -> bool {
        self.total_uploaded > 0 && self.errors.is_empty()
    }
}

/// Report from a sampled post-upload verification.
#[derive(Debug, Clone, Serialize)]
pub struct UploadVerification {
    pub total_uploaded: usize,
    pub sample_size: usize,
    pub found: usize,
    pub missing: usize,
    pub success: bool,
}

/// Full detail view of one document, with its chunk list.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentTree {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub chunks: Vec<ChunkSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceLevel::from_score(None), ConfidenceLevel::High);
        assert_eq!(
            ConfidenceLevel::from_score(Some(0.95)),
            ConfidenceLevel::High
        );
        assert_eq!(
            ConfidenceLevel::from_score(Some(0.90)),
            ConfidenceLevel::Medium
        );
        assert_eq!(
            ConfidenceLevel::from_score(Some(0.85)),
            ConfidenceLevel::Medium
        );
        assert_eq!(
            ConfidenceLevel::from_score(Some(0.84)),
            ConfidenceLevel::Low
        );
    }

    #[test]
    fn test_batch_accounting_reconciled_on_complete() {
        let mut batch = BatchDeletionResult::begin(10);
        batch.total_deleted = 7;
        batch.complete();
        assert_eq!(batch.total_failed, 3);
        assert_eq!(
            batch.total_deleted + batch.total_failed,
            batch.total_requested
        );
        assert_eq!(batch.status(), DeletionStatus::Partial);
        assert!(!batch.success());
    }

    #[test]
    fn test_deletion_status_derivation() {
        let ok = DeletionResult::ok(DeletionTarget::Chunk, Some("c1".into()), 1);
        assert_eq!(ok.status(), DeletionStatus::Success);

        let failed = DeletionResult::failed(DeletionTarget::Chunk, Some("c1".into()), "boom");
        assert_eq!(failed.status(), DeletionStatus::Failed);
        assert_eq!(failed.errors.len(), 1);
    }

    #[test]
    fn test_pagination_math() {
        let page = PaginatedDocuments::new(Vec::new(), 2, 20, 45);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
        assert!(page.has_previous());

        let last = PaginatedDocuments::new(Vec::new(), 3, 20, 45);
        assert!(!last.has_next());
    }
}
