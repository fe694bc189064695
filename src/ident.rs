//! Deterministic identity translation between logical chunk IDs and
//! backend-native ID formats.
//!
//! Every record in the pipeline is addressed by a caller-assigned *logical
//! ID* (an opaque string such as `"src_ab12_chunk0001_xyz"`). Backends
//! disagree about what an ID may look like: some accept arbitrary strings,
//! some require positive integers, some prefer UUIDs. The translation here
//! is a pure function — the same logical ID always maps to the same native
//! ID for a given format, across machines, restarts, and upgrades. That
//! stability is what makes re-upserting a chunk an update instead of a
//! duplicate.
//!
//! The integer mapping uses a SHA-256 prefix rather than any runtime hash
//! (`std::hash` is seeded per-process and must never be used here). The
//! UUID mapping is a name-based UUIDv5 over the DNS namespace.
//!
//! The translation is not reversible; the original string is always stored
//! in record metadata under [`KEY_ORIGINAL_ID`](crate::models::KEY_ORIGINAL_ID)
//! so it can be recovered from any fetched record.

use anyhow::{bail, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::BackendKind;

/// Native ID format required by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFormat {
    /// Backend accepts arbitrary strings; translation is the identity.
    Str,
    /// Backend requires a positive integer (63-bit to stay positive in
    /// signed representations).
    Int,
    /// Backend prefers UUIDs; translation is name-based (UUIDv5).
    Uuid,
}

/// A backend-native record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum NativeId {
    Str(String),
    Int(u64),
    Uuid(Uuid),
}

impl std::fmt::Display for NativeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeId::Str(s) => f.write_str(s),
            NativeId::Int(n) => write!(f, "{}", n),
            NativeId::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// Convert a logical ID to the stable 63-bit positive integer form.
///
/// First 8 bytes of `SHA-256(logical_id)`, big-endian, masked to 63 bits.
pub fn stable_int(logical_id: &str) -> u64 {
    let digest = Sha256::digest(logical_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) & ((1u64 << 63) - 1)
}

/// Convert a logical ID to its name-based UUID (UUIDv5, DNS namespace).
pub fn stable_uuid(logical_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, logical_id.as_bytes())
}

/// Translate a logical ID into the requested native format.
///
/// # Errors
///
/// Empty logical IDs are a caller contract violation and are rejected
/// before any translation. Non-empty inputs never fail.
pub fn to_native(logical_id: &str, format: IdFormat) -> Result<NativeId> {
    if logical_id.is_empty() {
        bail!("logical ID must not be empty");
    }
    Ok(match format {
        IdFormat::Str => NativeId::Str(logical_id.to_string()),
        IdFormat::Int => NativeId::Int(stable_int(logical_id)),
        IdFormat::Uuid => NativeId::Uuid(stable_uuid(logical_id)),
    })
}

/// The native ID format each backend prefers.
///
/// | Backend | Format |
/// |---------|--------|
/// | Pinecone | string |
/// | Qdrant | integer |
/// | Memory | string |
pub fn preferred_format(kind: BackendKind) -> IdFormat {
    match kind {
        BackendKind::Pinecone => IdFormat::Str,
        BackendKind::Qdrant => IdFormat::Int,
        BackendKind::Memory => IdFormat::Str,
    }
}

/// Translate a logical ID using the format the given backend prefers.
pub fn to_native_auto(logical_id: &str, kind: BackendKind) -> Result<NativeId> {
    to_native(logical_id, preferred_format(kind))
}
