//! In-process [`VectorBackend`] for tests and local development.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; similarity queries
//! are brute-force cosine over all stored vectors. Unlike the remote
//! adapters this backend has a real "list everything" primitive, so its
//! discovery methods are exact rather than sampled.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::BackendKind;
use crate::models::{
    source_prefix, text_preview, ChunkSummary, DocumentSummary, FetchedRecord, IndexStats,
    LogicalRecord, MetadataFilter, QueryMatch, KEY_SOURCE_ID, KEY_TEXT,
};

use super::{group_documents, VectorBackend};

struct StoredRecord {
    logical_id: String,
    vector: Vec<f32>,
    metadata: crate::models::Metadata,
}

pub struct MemoryBackend {
    records: RwLock<Vec<StoredRecord>>,
    dimension: usize,
    prefix_fallback: bool,
}

impl MemoryBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            dimension,
            prefix_fallback: true,
        }
    }

    pub fn with_prefix_fallback(dimension: usize, enabled: bool) -> Self {
        Self {
            prefix_fallback: enabled,
            ..Self::new(dimension)
        }
    }

    fn belongs_to_source(&self, record: &StoredRecord, source_id: &str) -> bool {
        match record.metadata.source_id() {
            Some(id) => id == source_id,
            None => {
                self.prefix_fallback
                    && record
                        .metadata
                        .original_id()
                        .and_then(source_prefix)
                        .map(|p| p == source_id)
                        .unwrap_or(false)
            }
        }
    }

    /// A filter of exactly `{source_id: X}` also matches fallback records
    /// grouped under X, mirroring the remote adapters.
    fn filter_hits(&self, record: &StoredRecord, filter: &MetadataFilter) -> bool {
        if filter.matches(&record.metadata) {
            return true;
        }
        if filter.0.len() == 1 {
            if let Some(wanted) = filter.0.get(KEY_SOURCE_ID).and_then(|v| v.as_str()) {
                return self.belongs_to_source(record, wanted);
            }
        }
        false
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn batch_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize> {
        if records.is_empty() {
            bail!("No records to upload");
        }
        for record in records {
            record.validate(self.dimension)?;
        }
        let mut stored = self.records.write().unwrap();
        for record in records {
            let mut metadata = record.metadata.with_original_id(&record.logical_id);
            if !record.text.is_empty() {
                metadata.set(KEY_TEXT, serde_json::Value::String(record.text.clone()));
            }
            let replacement = StoredRecord {
                logical_id: record.logical_id.clone(),
                vector: record.vector.clone(),
                metadata,
            };
            match stored.iter_mut().find(|r| r.logical_id == record.logical_id) {
                Some(existing) => *existing = replacement,
                None => stored.push(replacement),
            }
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        let stored = self.records.read().unwrap();
        let mut matches: Vec<QueryMatch> = stored
            .iter()
            .filter(|r| filter.map(|f| self.filter_hits(r, f)).unwrap_or(true))
            .map(|r| QueryMatch {
                id: r.logical_id.clone(),
                score: cosine_sim(vector, &r.vector),
                metadata: if include_metadata {
                    r.metadata.clone()
                } else {
                    Default::default()
                },
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>> {
        let stored = self.records.read().unwrap();
        let mut out = HashMap::new();
        for id in logical_ids {
            if let Some(r) = stored.iter().find(|r| &r.logical_id == id) {
                out.insert(
                    id.clone(),
                    FetchedRecord {
                        logical_id: r.logical_id.clone(),
                        vector: r.vector.clone(),
                        metadata: r.metadata.clone(),
                    },
                );
            }
        }
        Ok(out)
    }

    async fn delete_by_ids(&self, logical_ids: &[String]) -> Result<()> {
        if logical_ids.is_empty() {
            bail!("No IDs provided");
        }
        let mut stored = self.records.write().unwrap();
        stored.retain(|r| !logical_ids.contains(&r.logical_id));
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()> {
        if filter.is_empty() {
            bail!("Refusing to delete with an empty filter");
        }
        let mut stored = self.records.write().unwrap();
        stored.retain(|r| !self.filter_hits(r, filter));
        Ok(())
    }

    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>> {
        let stored = self.records.read().unwrap();
        Ok(stored
            .iter()
            .filter(|r| self.filter_hits(r, filter))
            .take(limit)
            .map(|r| QueryMatch {
                id: r.logical_id.clone(),
                score: 1.0,
                metadata: r.metadata.clone(),
            })
            .collect())
    }

    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let stored = self.records.read().unwrap();
        let metas = stored
            .iter()
            .filter(|r| filter.map(|f| self.filter_hits(r, f)).unwrap_or(true))
            .map(|r| r.metadata.clone())
            .collect::<Vec<_>>();
        Ok(group_documents(metas, self.prefix_fallback, limit))
    }

    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>> {
        let stored = self.records.read().unwrap();
        Ok(stored
            .iter()
            .filter(|r| self.belongs_to_source(r, source_id))
            .take(limit)
            .map(|r| ChunkSummary {
                logical_id: r.logical_id.clone(),
                text_preview: text_preview(r.metadata.text().unwrap_or_default()),
                metadata: r.metadata.clone(),
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let stored = self.records.read().unwrap();
        Ok(IndexStats {
            total_vectors: stored.len() as u64,
            dimension: self.dimension,
            fullness: 0.0,
        })
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
