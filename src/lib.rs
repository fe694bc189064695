//! vector-warden: lifecycle management for vector database collections.
//!
//! One typed API over heterogeneous vector stores. Chunked document
//! embeddings go in with caller-assigned string IDs; the crate handles
//! native ID translation per backend, document-level grouping, verified
//! deletion, and discovery, so swapping the store never touches callers.
//!
//! Modules:
//! - [`config`]: TOML configuration and validation
//! - [`ident`]: deterministic logical-to-native ID translation
//! - [`models`]: records, metadata, filters, derived document views
//! - [`results`]: structured operation results
//! - [`backend`]: the [`backend::VectorBackend`] trait and its adapters
//! - [`deletion`]: verified deletion workflows and previews
//! - [`discovery`]: listings, search, pagination, duplicate detection
//! - [`manager`]: the [`manager::VectorManager`] facade
//! - [`factory`]: backend construction and the shared handle
//! - [`progress`]: progress reporting for batch operations

pub mod backend;
pub mod config;
pub mod deletion;
pub mod discovery;
pub mod factory;
pub mod ident;
pub mod manager;
pub mod models;
pub mod progress;
pub mod results;
