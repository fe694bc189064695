//! Backend abstraction for vector databases.
//!
//! The [`VectorBackend`] trait defines the capability contract every
//! vector database adapter must implement: upsert, similarity query,
//! fetch, deletion (by ID and by filter), metadata search, stats, and the
//! two discovery primitives (list documents, list a document's chunks).
//! The deletion and discovery managers are written purely against this
//! trait; no code outside this module branches on a concrete backend.
//!
//! Not every backend supports enumeration natively. Adapters document
//! which of two strategies they use:
//!
//! - **Cursor scan** — page through a scroll/cursor primitive until
//!   exhausted, bounded by the configured `scan_limit`. Preferred whenever
//!   the backend offers it ([`qdrant`]).
//! - **Similarity probe** — query with a zero vector and a high `top_k`,
//!   relying on metadata filters. Results are a bounded sample, not a
//!   complete listing; fallback only ([`pinecone`]).
//!
//! Expected failures (not-found, timeouts, rate limits) surface as `Err`
//! values carrying the backend's message; adapters never panic across this
//! boundary and never retry on their own.

pub mod memory;
pub mod pinecone;
pub mod qdrant;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::BackendKind;
use crate::models::{
    source_prefix, ChunkSummary, DocumentSummary, FetchedRecord, IndexStats, LogicalRecord,
    Metadata, MetadataFilter, QueryMatch,
};

/// Capability contract for a vector database backend.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Which backend product this adapter talks to.
    fn kind(&self) -> BackendKind;

    /// Inter-batch delay used by batched upserts and deletes, to stay
    /// under backend rate limits.
    fn batch_delay(&self) -> Duration;

    /// Insert or update records. Returns the number uploaded.
    ///
    /// Upserting is idempotent: the native ID is a deterministic function
    /// of the logical ID, so a re-upsert updates in place.
    async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize>;

    /// Similarity query.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>>;

    /// Fetch records by logical ID. Missing IDs are absent from the map,
    /// not errors.
    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>>;

    /// Delete records by logical ID.
    async fn delete_by_ids(&self, logical_ids: &[String]) -> Result<()>;

    /// Delete every record matching a metadata filter.
    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()>;

    /// Exact metadata search, no vector required.
    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>>;

    /// List unique documents by grouping records on `source_id`.
    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>>;

    /// List the chunks belonging to one document.
    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>>;

    /// Collection statistics.
    async fn stats(&self) -> Result<IndexStats>;

    /// Connectivity check. Never errors; an unreachable backend is `false`.
    async fn test_connection(&self) -> bool;

    /// Delete a single chunk, falling back to an `_original_id` filter
    /// delete when the direct ID path reports failure.
    async fn delete_chunk(&self, logical_id: &str) -> Result<()> {
        match self.delete_by_ids(&[logical_id.to_string()]).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.delete_by_filter(&MetadataFilter::original_id(logical_id))
                    .await
            }
        }
    }

    /// Summarize one document from its chunk listing, or `None` when the
    /// document has no chunks.
    async fn document_info(&self, source_id: &str) -> Result<Option<DocumentSummary>> {
        let chunks = self.list_chunks(source_id, 10_000).await?;
        if chunks.is_empty() {
            return Ok(None);
        }
        let first = &chunks[0].metadata;
        Ok(Some(DocumentSummary {
            source_id: source_id.to_string(),
            filename: first
                .filename()
                .map(str::to_string)
                .unwrap_or_else(|| format!("document_{}", source_id)),
            chunk_count: chunks.len(),
            upload_date: first.upload_date().map(str::to_string),
            category: first.category().map(str::to_string),
            metadata: first.clone(),
        }))
    }

    /// Pre-upload duplicate check: does this source already have chunks?
    /// Returns `(exists, count)`; lookup failures count as "does not
    /// exist" so ingestion is never blocked by a flaky check.
    async fn check_source_exists(&self, source_id: &str) -> (bool, usize) {
        match self.list_chunks(source_id, 10_000).await {
            Ok(chunks) => (!chunks.is_empty(), chunks.len()),
            Err(_) => (false, 0),
        }
    }
}

/// Group flat records into [`DocumentSummary`]s by `source_id`.
///
/// Records without a `source_id` are recovered from their `_original_id`
/// prefix when `prefix_fallback` is enabled, and skipped otherwise.
/// The first chunk encountered supplies the representative metadata;
/// insertion order is preserved.
pub(crate) fn group_documents<I>(
    metadatas: I,
    prefix_fallback: bool,
    limit: usize,
) -> Vec<DocumentSummary>
where
    I: IntoIterator<Item = Metadata>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_source: HashMap<String, DocumentSummary> = HashMap::new();

    for metadata in metadatas {
        let source_id = match metadata.source_id() {
            Some(id) => id.to_string(),
            None if prefix_fallback => {
                match metadata.original_id().and_then(source_prefix) {
                    Some(prefix) => prefix.to_string(),
                    None => continue,
                }
            }
            None => continue,
        };

        let entry = by_source.entry(source_id.clone()).or_insert_with(|| {
            order.push(source_id.clone());
            DocumentSummary {
                filename: metadata
                    .filename()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("document_{}", source_id)),
                upload_date: metadata.upload_date().map(str::to_string),
                category: metadata.category().map(str::to_string),
                metadata: metadata.clone(),
                source_id: source_id.clone(),
                chunk_count: 0,
            }
        });
        entry.chunk_count += 1;
    }

    order
        .into_iter()
        .take(limit)
        .filter_map(|id| by_source.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KEY_ORIGINAL_ID, KEY_SOURCE_ID};
    use serde_json::json;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        let mut m = Metadata::new();
        for (k, v) in pairs {
            m.set(k, json!(v));
        }
        m
    }

    #[test]
    fn test_group_documents_counts_chunks() {
        let metas = vec![
            meta(&[(KEY_SOURCE_ID, "src_a"), ("filename", "a.pdf")]),
            meta(&[(KEY_SOURCE_ID, "src_a"), ("filename", "a.pdf")]),
            meta(&[(KEY_SOURCE_ID, "src_b"), ("filename", "b.pdf")]),
        ];
        let docs = group_documents(metas, false, 100);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_id, "src_a");
        assert_eq!(docs[0].chunk_count, 2);
        assert_eq!(docs[1].chunk_count, 1);
    }

    #[test]
    fn test_group_documents_prefix_fallback() {
        let metas = vec![meta(&[(KEY_ORIGINAL_ID, "src_ab12_chunk0001_xyz")])];

        let with_fallback = group_documents(metas.clone(), true, 100);
        assert_eq!(with_fallback.len(), 1);
        assert_eq!(with_fallback[0].source_id, "src_ab12");
        assert_eq!(with_fallback[0].filename, "document_src_ab12");

        let without = group_documents(metas, false, 100);
        assert!(without.is_empty());
    }

    #[test]
    fn test_group_documents_respects_limit() {
        let metas: Vec<Metadata> = (0..10)
            .map(|i| {
                let mut m = Metadata::new();
                m.set(KEY_SOURCE_ID, json!(format!("src_{i}")));
                m
            })
            .collect();
        assert_eq!(group_documents(metas, false, 3).len(), 3);
    }
}
