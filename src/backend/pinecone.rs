//! Pinecone adapter: a cloud-hosted similarity index over its REST API.
//!
//! Pinecone has no native "list all records" or "group by field"
//! operation, so enumeration uses the **similarity-probe strategy**: a
//! zero-vector query with a high `top_k` and a metadata filter. Pinecone
//! returns arbitrary matching records for a neutral vector, but the result
//! is inherently bounded by `top_k` — callers must treat listings as a
//! sample once the collection outgrows the configured `scan_limit`.
//!
//! Native IDs are the logical ID strings themselves (identity
//! translation), and `_original_id` is still stamped into metadata so the
//! recovery path is uniform across backends.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{BackendConfig, BackendKind};
use crate::models::{
    source_prefix, text_preview, ChunkSummary, DocumentSummary, FetchedRecord, IndexStats,
    LogicalRecord, Metadata, MetadataFilter, QueryMatch, KEY_SOURCE_ID, KEY_TEXT,
};

use super::{group_documents, VectorBackend};

pub struct PineconeBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    dimension: usize,
    scan_limit: usize,
    prefix_fallback: bool,
    batch_delay: Duration,
}

impl PineconeBackend {
    /// Connect to the configured index and verify it is reachable.
    ///
    /// Missing credentials or an unreachable endpoint are fatal here;
    /// nothing is retried.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .context("VECTOR_DB_API_KEY not set (required for Pinecone)")?;

        let base_url = if config.host.starts_with("http") {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.host)
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let backend = Self {
            http,
            base_url,
            api_key,
            dimension: config.dimension,
            scan_limit: config.scan_limit,
            prefix_fallback: config.enable_prefix_fallback,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        };

        let stats = backend
            .stats()
            .await
            .context("Failed to reach Pinecone index")?;
        if stats.dimension != 0 && stats.dimension != config.dimension {
            bail!(
                "Pinecone index dimension {} does not match configured {}",
                stats.dimension,
                config.dimension
            );
        }

        Ok(backend)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on {}: {}", status, path, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from Pinecone: {}", path))
    }

    fn parse_metadata(value: Option<&Value>) -> Metadata {
        match value {
            Some(Value::Object(map)) => Metadata(map.clone()),
            _ => Metadata::new(),
        }
    }

    fn parse_matches(response: &Value) -> Vec<QueryMatch> {
        response
            .get("matches")
            .and_then(Value::as_array)
            .map(|matches| {
                matches
                    .iter()
                    .filter_map(|m| {
                        let native_id = m.get("id")?.as_str()?.to_string();
                        let metadata = Self::parse_metadata(m.get("metadata"));
                        Some(QueryMatch {
                            id: metadata
                                .original_id()
                                .map(str::to_string)
                                .unwrap_or(native_id),
                            score: m.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                            metadata,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Zero-vector query: the enumeration workhorse for a backend without
    /// a list primitive.
    async fn probe(
        &self,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let zero = vec![0.0f32; self.dimension];
        self.query(&zero, top_k.min(self.scan_limit), filter, true)
            .await
    }
}

#[async_trait]
impl VectorBackend for PineconeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pinecone
    }

    fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    async fn upsert(&self, records: &[LogicalRecord]) -> Result<usize> {
        if records.is_empty() {
            bail!("No records to upload");
        }
        for record in records {
            record.validate(self.dimension)?;
        }

        let vectors: Vec<Value> = records
            .iter()
            .map(|r| {
                let mut metadata = r.metadata.with_original_id(&r.logical_id);
                if !r.text.is_empty() {
                    metadata.set(KEY_TEXT, Value::String(r.text.clone()));
                }
                json!({
                    "id": r.logical_id,
                    "values": r.vector,
                    "metadata": metadata,
                })
            })
            .collect();

        let response = self
            .post_json("/vectors/upsert", &json!({ "vectors": vectors }))
            .await?;

        Ok(response
            .get("upsertedCount")
            .and_then(Value::as_u64)
            .unwrap_or(records.len() as u64) as usize)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": include_metadata,
        });
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = f.to_pinecone();
        }

        let response = self.post_json("/query", &body).await?;
        Ok(Self::parse_matches(&response))
    }

    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>> {
        if logical_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query: Vec<(&str, &str)> = logical_ids.iter().map(|id| ("ids", id.as_str())).collect();
        let response = self
            .http
            .get(format!("{}/vectors/fetch", self.base_url))
            .header("Api-Key", &self.api_key)
            .query(&query)
            .send()
            .await
            .context("Pinecone fetch failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on /vectors/fetch: {}", status, text);
        }

        let body: Value = response.json().await.context("Invalid JSON from Pinecone")?;
        let mut out = HashMap::new();
        if let Some(vectors) = body.get("vectors").and_then(Value::as_object) {
            for (id, entry) in vectors {
                let vector = entry
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|vs| {
                        vs.iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default();
                out.insert(
                    id.clone(),
                    FetchedRecord {
                        logical_id: id.clone(),
                        vector,
                        metadata: Self::parse_metadata(entry.get("metadata")),
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
        self.post_json("/vectors/delete", &json!({ "ids": logical_ids }))
            .await?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()> {
        if filter.is_empty() {
            bail!("Refusing to delete with an empty filter");
        }

        // Records ingested before the source_id field exists are invisible
        // to a plain filter delete. For a pure source_id filter, resolve
        // the chunk IDs (field match plus prefix fallback) and delete by
        // ID instead.
        if self.prefix_fallback && filter.0.len() == 1 {
            if let Some(source_id) = filter.0.get(KEY_SOURCE_ID).and_then(Value::as_str) {
                let chunks = self.list_chunks(source_id, self.scan_limit).await?;
                if chunks.is_empty() {
                    bail!("No records found matching source_id: {}", source_id);
                }
                let ids: Vec<String> = chunks.into_iter().map(|c| c.logical_id).collect();
                return self.delete_by_ids(&ids).await;
            }
        }

        self.post_json("/vectors/delete", &json!({ "filter": filter.to_pinecone() }))
            .await?;
        Ok(())
    }

    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>> {
        let mut matches = self.probe(limit, Some(filter)).await?;
        // Metadata search carries no meaningful similarity ranking.
        for m in &mut matches {
            m.score = 1.0;
        }
        Ok(matches)
    }

    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let probe_k = limit.saturating_mul(10).min(self.scan_limit).max(limit);
        let matches = self.probe(probe_k, filter).await?;
        Ok(group_documents(
            matches.into_iter().map(|m| m.metadata),
            self.prefix_fallback,
            limit,
        ))
    }

    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>> {
        let filter = MetadataFilter::source_id(source_id);
        let mut matches = self.probe(limit, Some(&filter)).await?;

        if matches.is_empty() && self.prefix_fallback {
            // Older records lack source_id entirely; probe everything and
            // match on the _original_id prefix.
            matches = self
                .probe(self.scan_limit, None)
                .await?
                .into_iter()
                .filter(|m| {
                    m.metadata
                        .original_id()
                        .and_then(source_prefix)
                        .map(|p| p == source_id)
                        .unwrap_or(false)
                })
                .take(limit)
                .collect();
        }

        Ok(matches
            .into_iter()
            .map(|m| ChunkSummary {
                text_preview: text_preview(m.metadata.text().unwrap_or_default()),
                logical_id: m.id,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response = self.post_json("/describe_index_stats", &json!({})).await?;
        Ok(IndexStats {
            total_vectors: response
                .get("totalVectorCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            dimension: response
                .get("dimension")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            fullness: response
                .get("indexFullness")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        })
    }

    async fn test_connection(&self) -> bool {
        self.stats().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matches_recovers_original_id() {
        let response = json!({
            "matches": [
                {
                    "id": "src_a_chunk0001_x",
                    "score": 0.97,
                    "metadata": { "_original_id": "src_a_chunk0001_x", "source_id": "src_a" }
                },
                { "id": "bare-native-id", "score": 0.5 }
            ]
        });
        let matches = PineconeBackend::parse_matches(&response);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "src_a_chunk0001_x");
        assert_eq!(matches[0].metadata.source_id(), Some("src_a"));
        assert_eq!(matches[1].id, "bare-native-id");
        assert!(matches[1].metadata.0.is_empty());
    }

    #[test]
    fn test_parse_matches_tolerates_missing_fields() {
        assert!(PineconeBackend::parse_matches(&json!({})).is_empty());
        assert!(PineconeBackend::parse_matches(&json!({ "matches": [{}] })).is_empty());
    }
}
