//! Qdrant adapter: a self-hostable collection store over its REST API.
//!
//! Qdrant rejects arbitrary string point IDs, so logical IDs are
//! translated to deterministic 63-bit integers (see [`crate::ident`]) and
//! the original string is stamped into the payload as `_original_id`.
//! Enumeration uses the **cursor-scan strategy**: the scroll endpoint
//! pages through the collection with a server-issued offset, bounded by
//! the configured `scan_limit`.
//!
//! On first connect the adapter bootstraps the collection and the keyword
//! payload indexes the filter fields rely on. Both operations are
//! idempotent.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::config::{BackendConfig, BackendKind, DeploymentMode};
use crate::ident::stable_int;
use crate::models::{
    source_prefix, text_preview, ChunkSummary, DocumentSummary, FetchedRecord, IndexStats,
    LogicalRecord, Metadata, MetadataFilter, QueryMatch, KEY_CATEGORY, KEY_ORIGINAL_ID,
    KEY_SOURCE_FILENAME, KEY_SOURCE_ID, KEY_TEXT,
};

use super::{group_documents, VectorBackend};

/// Page size for a single scroll request.
const SCROLL_PAGE: usize = 256;

/// Payload fields that get a keyword index at bootstrap.
const INDEXED_FIELDS: &[&str] = &[
    KEY_SOURCE_ID,
    KEY_ORIGINAL_ID,
    KEY_SOURCE_FILENAME,
    KEY_CATEGORY,
];

pub struct QdrantBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    scan_limit: usize,
    prefix_fallback: bool,
    batch_delay: Duration,
}

impl QdrantBackend {
    /// Connect, creating the collection and payload indexes if needed.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let base_url = if config.host.starts_with("http") {
            config.host.trim_end_matches('/').to_string()
        } else {
            match config.deployment {
                DeploymentMode::Cloud => format!("https://{}", config.host),
                DeploymentMode::SelfHosted => format!("http://{}:{}", config.host, config.port),
            }
        };

        let api_key = config.api_key();
        if api_key.is_none() && config.deployment == DeploymentMode::Cloud {
            bail!("VECTOR_DB_API_KEY not set (required for Qdrant cloud)");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let backend = Self {
            http,
            base_url,
            api_key,
            collection: config.collection.clone(),
            dimension: config.dimension,
            scan_limit: config.scan_limit,
            prefix_fallback: config.enable_prefix_fallback,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        };

        backend.ensure_collection(&config.metric).await?;
        backend.ensure_payload_indexes().await?;
        Ok(backend)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .with_context(|| format!("Qdrant request failed: {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Qdrant API error {} on {}: {}", status, path, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from Qdrant: {}", path))
    }

    async fn ensure_collection(&self, metric: &str) -> Result<()> {
        let path = format!("/collections/{}", self.collection);
        let response = self.request(Method::GET, &path).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Qdrant API error {} on {}: {}", status, path, text);
        }

        let distance = match metric {
            "euclidean" => "Euclid",
            "dot" => "Dot",
            _ => "Cosine",
        };
        self.send_json(
            Method::PUT,
            &path,
            Some(&json!({
                "vectors": { "size": self.dimension, "distance": distance }
            })),
        )
        .await
        .context("Failed to create Qdrant collection")?;
        Ok(())
    }

    async fn ensure_payload_indexes(&self) -> Result<()> {
        let path = format!("/collections/{}/index", self.collection);
        for field in INDEXED_FIELDS {
            let body = json!({ "field_name": field, "field_schema": "keyword" });
            // Index creation is not idempotent on all versions; an
            // already-exists rejection is fine.
            let response = self.request(Method::PUT, &path).json(&body).send().await?;
            if !response.status().is_success()
                && response.status() != StatusCode::BAD_REQUEST
                && response.status() != StatusCode::CONFLICT
            {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                bail!("Failed to create payload index '{}': {} {}", field, status, text);
            }
        }
        Ok(())
    }

    fn parse_payload(value: Option<&Value>) -> Metadata {
        match value {
            Some(Value::Object(map)) => Metadata(map.clone()),
            _ => Metadata::new(),
        }
    }

    /// Logical ID from a point: the stamped `_original_id`, or the native
    /// integer rendered as a string for points written out-of-band.
    fn logical_id_of(point: &Value, payload: &Metadata) -> String {
        payload
            .original_id()
            .map(str::to_string)
            .unwrap_or_else(|| {
                point
                    .get("id")
                    .map(|id| id.to_string())
                    .unwrap_or_default()
            })
    }

    /// Page through the collection until `limit` points are collected or
    /// the cursor ends.
    async fn scroll(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<(Value, Metadata)>> {
        let path = format!("/collections/{}/points/scroll", self.collection);
        let limit = limit.min(self.scan_limit);
        let mut points = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE.min(limit - points.len()),
                "with_payload": true,
            });
            if let Some(f) = filter.filter(|f| !f.is_empty()) {
                body["filter"] = f.to_qdrant();
            }
            if let Some(cursor) = &offset {
                body["offset"] = cursor.clone();
            }

            let response = self.send_json(Method::POST, &path, Some(&body)).await?;
            let result = response.get("result").cloned().unwrap_or_default();
            if let Some(page) = result.get("points").and_then(Value::as_array) {
                for point in page {
                    let payload = Self::parse_payload(point.get("payload"));
                    points.push((point.clone(), payload));
                }
            }

            offset = result.get("next_page_offset").filter(|v| !v.is_null()).cloned();
            if offset.is_none() || points.len() >= limit {
                break;
            }
        }

        points.truncate(limit);
        Ok(points)
    }

    /// Native IDs of points whose `_original_id` prefix maps to the given
    /// source. Full scan; only used when the field-match came up empty.
    async fn fallback_points(&self, source_id: &str) -> Result<Vec<(Value, Metadata)>> {
        let all = self.scroll(None, self.scan_limit).await?;
        Ok(all
            .into_iter()
            .filter(|(_, payload)| {
                payload
                    .original_id()
                    .and_then(source_prefix)
                    .map(|p| p == source_id)
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Qdrant
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

        let points: Vec<Value> = records
            .iter()
            .map(|r| {
                let mut payload = r.metadata.with_original_id(&r.logical_id);
                if !r.text.is_empty() {
                    payload.set(KEY_TEXT, Value::String(r.text.clone()));
                }
                json!({
                    "id": stable_int(&r.logical_id),
                    "vector": r.vector,
                    "payload": payload,
                })
            })
            .collect();

        self.send_json(
            Method::PUT,
            &format!("/collections/{}/points?wait=true", self.collection),
            Some(&json!({ "points": points })),
        )
        .await?;
        Ok(records.len())
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
            "limit": top_k,
            "with_payload": include_metadata,
        });
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = f.to_qdrant();
        }

        let response = self
            .send_json(
                Method::POST,
                &format!("/collections/{}/points/search", self.collection),
                Some(&body),
            )
            .await?;

        Ok(response
            .get("result")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .map(|hit| {
                        let metadata = Self::parse_payload(hit.get("payload"));
                        QueryMatch {
                            id: Self::logical_id_of(hit, &metadata),
                            score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                            metadata,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch(&self, logical_ids: &[String]) -> Result<HashMap<String, FetchedRecord>> {
        if logical_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let native: Vec<u64> = logical_ids.iter().map(|id| stable_int(id)).collect();
        let by_native: HashMap<u64, &String> =
            native.iter().copied().zip(logical_ids.iter()).collect();

        let response = self
            .send_json(
                Method::POST,
                &format!("/collections/{}/points", self.collection),
                Some(&json!({ "ids": native, "with_payload": true, "with_vector": true })),
            )
            .await?;

        let mut out = HashMap::new();
        if let Some(points) = response.get("result").and_then(Value::as_array) {
            for point in points {
                let payload = Self::parse_payload(point.get("payload"));
                let native_id = point.get("id").and_then(Value::as_u64);
                let logical_id = payload
                    .original_id()
                    .map(str::to_string)
                    .or_else(|| {
                        native_id
                            .and_then(|n| by_native.get(&n))
                            .map(|s| s.to_string())
                    })
                    .unwrap_or_default();
                let vector = point
                    .get("vector")
                    .and_then(Value::as_array)
                    .map(|vs| {
                        vs.iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default();
                out.insert(
                    logical_id.clone(),
                    FetchedRecord {
                        logical_id,
                        vector,
                        metadata: payload,
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
        let native: Vec<u64> = logical_ids.iter().map(|id| stable_int(id)).collect();
        self.send_json(
            Method::POST,
            &format!("/collections/{}/points/delete?wait=true", self.collection),
            Some(&json!({ "points": native })),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()> {
        if filter.is_empty() {
            bail!("Refusing to delete with an empty filter");
        }

        self.send_json(
            Method::POST,
            &format!("/collections/{}/points/delete?wait=true", self.collection),
            Some(&json!({ "filter": filter.to_qdrant() })),
        )
        .await?;

        // A pure source_id filter misses records that predate the field;
        // sweep those up by _original_id prefix.
        if self.prefix_fallback && filter.0.len() == 1 {
            if let Some(source_id) = filter.0.get(KEY_SOURCE_ID).and_then(Value::as_str) {
                let leftovers = self.fallback_points(source_id).await?;
                if !leftovers.is_empty() {
                    let native: Vec<Value> = leftovers
                        .iter()
                        .filter_map(|(point, _)| point.get("id").cloned())
                        .collect();
                    self.send_json(
                        Method::POST,
                        &format!("/collections/{}/points/delete?wait=true", self.collection),
                        Some(&json!({ "points": native })),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<QueryMatch>> {
        let points = self.scroll(Some(filter), limit).await?;
        Ok(points
            .into_iter()
            .map(|(point, payload)| QueryMatch {
                id: Self::logical_id_of(&point, &payload),
                score: 1.0,
                metadata: payload,
            })
            .collect())
    }

    async fn list_documents(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let points = self.scroll(filter, self.scan_limit).await?;
        Ok(group_documents(
            points.into_iter().map(|(_, payload)| payload),
            self.prefix_fallback,
            limit,
        ))
    }

    async fn list_chunks(&self, source_id: &str, limit: usize) -> Result<Vec<ChunkSummary>> {
        let filter = MetadataFilter::source_id(source_id);
        let mut points = self.scroll(Some(&filter), limit).await?;

        if points.is_empty() && self.prefix_fallback {
            points = self.fallback_points(source_id).await?;
            points.truncate(limit);
        }

        Ok(points
            .into_iter()
            .map(|(point, payload)| ChunkSummary {
                logical_id: Self::logical_id_of(&point, &payload),
                text_preview: text_preview(payload.text().unwrap_or_default()),
                metadata: payload,
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response = self
            .send_json(
                Method::GET,
                &format!("/collections/{}", self.collection),
                None,
            )
            .await?;
        let result = response.get("result").cloned().unwrap_or_default();
        Ok(IndexStats {
            total_vectors: result
                .get("points_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            dimension: result
                .pointer("/config/params/vectors/size")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            fullness: 0.0,
        })
    }

    async fn test_connection(&self) -> bool {
        self.stats().await.is_ok()
    }
}
