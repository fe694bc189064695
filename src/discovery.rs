//! Read-only discovery: document listings, search, pagination, duplicate
//! detection.
//!
//! Documents are derived by grouping chunks on `source_id`, so every call
//! here reflects the backend snapshot at call time. Pagination carries no
//! cursor; a page is a slice of a freshly recomputed listing.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::backend::VectorBackend;
use crate::config::BackendConfig;
use crate::models::{
    source_prefix, text_preview, DocumentSummary, MetadataFilter, KEY_CATEGORY,
};
use crate::results::{
    ChunkHit, ConfidenceLevel, ContentSearchResult, DocumentTree, DuplicateGroup,
    PaginatedDocuments,
};

/// Extra records pulled past the requested page so totals stay honest for
/// a few pages ahead.
const PAGE_OVERSCAN: usize = 100;

/// Fields searched by [`DiscoveryManager::search_documents`] when the
/// caller names none.
const DEFAULT_SEARCH_FIELDS: &[&str] = &["filename", "category"];

pub struct DiscoveryManager {
    backend: Arc<dyn VectorBackend>,
    scan_limit: usize,
}

impl DiscoveryManager {
    pub fn new(backend: Arc<dyn VectorBackend>, config: &BackendConfig) -> Self {
        Self {
            backend,
            scan_limit: config.scan_limit,
        }
    }

    /// All documents, up to `limit` (the scan limit when unspecified).
    pub async fn list_all_documents(&self, limit: Option<usize>) -> Result<Vec<DocumentSummary>> {
        self.backend
            .list_documents(None, limit.unwrap_or(self.scan_limit))
            .await
    }

    /// One page of the document listing. Pages are 1-based.
    pub async fn browse_documents(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedDocuments> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let overscan = page
            .saturating_mul(page_size)
            .saturating_add(PAGE_OVERSCAN)
            .min(self.scan_limit);
        let documents = self.backend.list_documents(None, overscan).await?;

        let total_items = documents.len();
        let start = (page - 1).saturating_mul(page_size).min(total_items);
        let end = start.saturating_add(page_size).min(total_items);
        let items = documents[start..end].to_vec();

        Ok(PaginatedDocuments::new(items, page, page_size, total_items))
    }

    /// Case-insensitive substring search over document metadata fields.
    pub async fn search_documents(
        &self,
        query: &str,
        fields: Option<&[String]>,
    ) -> Result<Vec<DocumentSummary>> {
        let needle = query.to_lowercase();
        let documents = self.list_all_documents(None).await?;

        let default_fields: Vec<String> = DEFAULT_SEARCH_FIELDS
            .iter()
            .map(|f| f.to_string())
            .collect();
        let fields = fields.unwrap_or(&default_fields);

        Ok(documents
            .into_iter()
            .filter(|doc| {
                fields.iter().any(|field| {
                    Self::field_value(doc, field)
                        .map(|v| v.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            })
            .collect())
    }

    /// Look up documents by filename, exact or substring.
    pub async fn search_by_filename(
        &self,
        filename: &str,
        exact: bool,
    ) -> Result<Vec<DocumentSummary>> {
        let documents = self.list_all_documents(None).await?;
        let needle = filename.to_lowercase();
        Ok(documents
            .into_iter()
            .filter(|doc| {
                if exact {
                    doc.filename == filename
                } else {
                    doc.filename.to_lowercase().contains(&needle)
                }
            })
            .collect())
    }

    /// Documents in one category, filtered backend-side.
    pub async fn search_by_category(&self, category: &str) -> Result<Vec<DocumentSummary>> {
        let filter = MetadataFilter::new().with(KEY_CATEGORY, category.into());
        self.backend.list_documents(Some(&filter), self.scan_limit).await
    }

    /// Full detail of one document with its chunk list, or `None` when
    /// the source has no chunks.
    pub async fn document_tree(&self, source_id: &str) -> Result<Option<DocumentTree>> {
        let Some(summary) = self.backend.document_info(source_id).await? else {
            return Ok(None);
        };
        let chunks = self.backend.list_chunks(source_id, self.scan_limit).await?;
        Ok(Some(DocumentTree { summary, chunks }))
    }

    /// Groups of documents sharing an exact filename. Singleton filenames
    /// are not reported.
    pub async fn find_duplicate_documents(&self) -> Result<Vec<DuplicateGroup>> {
        let documents = self.list_all_documents(None).await?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for doc in documents {
            match groups.iter_mut().find(|g| g.filename == doc.filename) {
                Some(group) => {
                    group.count += 1;
                    group.documents.push(doc);
                }
                None => groups.push(DuplicateGroup {
                    filename: doc.filename.clone(),
                    count: 1,
                    documents: vec![doc],
                }),
            }
        }

        groups.retain(|g| g.count > 1);
        Ok(groups)
    }

    /// Similarity search over chunk content. The caller supplies the
    /// query embedding; `query` is carried as a label only.
    pub async fn search_chunks_by_content(
        &self,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<ContentSearchResult> {
        let started = Instant::now();
        let matches = self.backend.query(query_vector, top_k, filter, true).await?;

        let hits: Vec<ChunkHit> = matches
            .into_iter()
            .map(|m| {
                let source_id = m
                    .metadata
                    .source_id()
                    .map(str::to_string)
                    .or_else(|| source_prefix(&m.id).map(str::to_string))
                    .unwrap_or_default();
                ChunkHit {
                    source_id,
                    text_preview: text_preview(m.metadata.text().unwrap_or_default()),
                    similarity_score: Some(m.score),
                    confidence: ConfidenceLevel::from_score(Some(m.score)),
                    chunk_id: m.id,
                    metadata: m.metadata,
                }
            })
            .collect();

        Ok(ContentSearchResult {
            query: query.to_string(),
            total_matches: hits.len(),
            hits,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn field_value<'a>(doc: &'a DocumentSummary, field: &str) -> Option<&'a str> {
        match field {
            "filename" | "source_filename" => Some(doc.filename.as_str()),
            "category" => doc.category.as_deref(),
            "source_id" => Some(doc.source_id.as_str()),
            other => doc.metadata.get(other).and_then(|v| v.as_str()),
        }
    }
}
