//! Core data models shared by the backend adapters and managers.
//!
//! The unit of storage is the [`LogicalRecord`]: a caller-assigned string
//! ID, an embedding vector, the chunk text, and a metadata bag. Documents
//! are *derived* — a grouping of records sharing a `source_id` — and are
//! recomputed on demand, never persisted.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved metadata key: logical source (document) identifier.
pub const KEY_SOURCE_ID: &str = "source_id";
/// Reserved metadata key: the logical ID as originally assigned. Written on
/// every upsert so the logical ID survives native-ID translation.
pub const KEY_ORIGINAL_ID: &str = "_original_id";
/// Reserved metadata key: display filename.
pub const KEY_FILENAME: &str = "filename";
/// Reserved metadata key: filename as written by upstream enrichers.
/// Checked before [`KEY_FILENAME`].
pub const KEY_SOURCE_FILENAME: &str = "source_filename";
/// Reserved metadata key: document category label.
pub const KEY_CATEGORY: &str = "category";
/// Reserved metadata key: upload date, ISO-8601 string.
pub const KEY_UPLOAD_DATE: &str = "upload_date";
/// Reserved metadata key: chunk text (stored for previews).
pub const KEY_TEXT: &str = "text";

/// Metadata attached to a record: a handful of well-known reserved keys
/// plus an open bag of extension fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub serde_json::Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn source_id(&self) -> Option<&str> {
        self.get_str(KEY_SOURCE_ID)
    }

    pub fn original_id(&self) -> Option<&str> {
        self.get_str(KEY_ORIGINAL_ID)
    }

    /// Display filename, preferring the enricher-written field.
    pub fn filename(&self) -> Option<&str> {
        self.get_str(KEY_SOURCE_FILENAME)
            .or_else(|| self.get_str(KEY_FILENAME))
    }

    pub fn category(&self) -> Option<&str> {
        self.get_str(KEY_CATEGORY)
    }

    pub fn upload_date(&self) -> Option<&str> {
        self.get_str(KEY_UPLOAD_DATE)
    }

    pub fn text(&self) -> Option<&str> {
        self.get_str(KEY_TEXT)
    }

    /// Copy with the original logical ID stamped in, as written by every
    /// adapter on upsert.
    pub fn with_original_id(&self, logical_id: &str) -> Metadata {
        let mut out = self.clone();
        out.set(KEY_ORIGINAL_ID, Value::String(logical_id.to_string()));
        out
    }

    /// Boundary validation: reserved keys that are present must be strings.
    pub fn validate(&self) -> Result<()> {
        for key in [
            KEY_SOURCE_ID,
            KEY_ORIGINAL_ID,
            KEY_FILENAME,
            KEY_SOURCE_FILENAME,
            KEY_CATEGORY,
            KEY_UPLOAD_DATE,
        ] {
            if let Some(v) = self.0.get(key) {
                if !v.is_string() {
                    bail!("metadata field '{}' must be a string, got: {}", key, v);
                }
            }
        }
        Ok(())
    }
}

/// The unit of storage handed to the core by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalRecord {
    pub logical_id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LogicalRecord {
    /// Reject malformed records before any network call.
    pub fn validate(&self, expected_dimension: usize) -> Result<()> {
        if self.logical_id.is_empty() {
            bail!("record has an empty logical_id");
        }
        if self.vector.is_empty() {
            bail!("record '{}' has an empty vector", self.logical_id);
        }
        if self.vector.len() != expected_dimension {
            bail!(
                "record '{}' has dimension {} but the collection expects {}",
                self.logical_id,
                self.vector.len(),
                expected_dimension
            );
        }
        self.metadata.validate()
    }
}

/// Equality filter over metadata fields. All entries must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub BTreeMap<String, Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn source_id(id: &str) -> Self {
        Self::new().with(KEY_SOURCE_ID, Value::String(id.to_string()))
    }

    pub fn original_id(id: &str) -> Self {
        Self::new().with(KEY_ORIGINAL_ID, Value::String(id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Local evaluation, used by the memory backend and for post-filtering.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }

    /// Pinecone wire form: `{"field": {"$eq": value}}`.
    pub fn to_pinecone(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (key, value) in &self.0 {
            obj.insert(key.clone(), serde_json::json!({ "$eq": value }));
        }
        Value::Object(obj)
    }

    /// Qdrant wire form: `{"must": [{"key": f, "match": {"value": v}}]}`.
    pub fn to_qdrant(&self) -> Value {
        let must: Vec<Value> = self
            .0
            .iter()
            .map(|(key, value)| serde_json::json!({ "key": key, "match": { "value": value } }))
            .collect();
        serde_json::json!({ "must": must })
    }
}

/// A single match from a similarity query or metadata search.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMatch {
    /// Logical ID where recoverable, otherwise the native ID rendered as a
    /// string.
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// A record returned from a fetch-by-id call.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedRecord {
    pub logical_id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// A derived document: the group of chunks sharing one `source_id`.
///
/// Computed per call by scanning the backend; must be recomputed after any
/// mutation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub source_id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub upload_date: Option<String>,
    pub category: Option<String>,
    /// Metadata of the first chunk encountered.
    pub metadata: Metadata,
}

/// One chunk of a document, as listed by `list_chunks`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub logical_id: String,
    /// First 200 characters of the chunk text.
    pub text_preview: String,
    pub metadata: Metadata,
}

/// Collection-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub fullness: f64,
}

/// Maximum preview length carried in a [`ChunkSummary`].
pub const TEXT_PREVIEW_LEN: usize = 200;

/// Truncate chunk text for previews, respecting char boundaries.
pub fn text_preview(text: &str) -> String {
    if text.len() <= TEXT_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = TEXT_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Recover a document prefix from a logical ID that predates the
/// `source_id` metadata field.
///
/// Takes the logical ID up to the last `_chunk` delimiter, so
/// `"src_ab12_chunk0001_xyz"` groups under `"src_ab12"`. Returns `None`
/// when the ID has no chunk-index segment.
pub fn source_prefix(logical_id: &str) -> Option<&str> {
    logical_id
        .rfind("_chunk")
        .filter(|&idx| idx > 0)
        .map(|idx| &logical_id[..idx])
}
