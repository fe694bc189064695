//! # Vector Warden CLI (`vwd`)
//!
//! The `vwd` binary is the operator interface for Vector Warden. It
//! provides commands for inspecting a vector collection, loading
//! records, and running verified deletion and cleanup workflows against
//! the configured backend (Pinecone, Qdrant, or in-memory).
//!
//! ## Usage
//!
//! ```bash
//! vwd --config ./config/vwd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vwd check` | Verify backend connectivity and print collection stats |
//! | `vwd stats` | Print collection statistics |
//! | `vwd docs` | List documents derived from the collection |
//! | `vwd browse` | Page through the document listing |
//! | `vwd find "<query>"` | Substring search over document metadata |
//! | `vwd doc <source_id>` | Show one document with its chunks |
//! | `vwd chunks <source_id>` | List the chunks of one document |
//! | `vwd duplicates` | Find documents sharing a filename |
//! | `vwd cleanup` | Resolve duplicate filenames (dry run by default) |
//! | `vwd load <file>` | Batch-load records from a JSON file and verify |
//! | `vwd delete doc <source_id>` | Delete a document's chunks, verified |
//! | `vwd delete chunk <id>` | Delete one chunk, verified |
//! | `vwd delete filter -f k=v` | Delete everything matching a filter |
//! | `vwd prune <cutoff>` | Delete documents uploaded before a date |
//!
//! All destructive commands are dry runs unless `--execute` is passed.
//! The backend API key is read from the `VECTOR_DB_API_KEY` environment
//! variable, never from the config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use vector_warden::config::{self, Config};
use vector_warden::deletion::DeletionScope;
use vector_warden::factory;
use vector_warden::manager::{CleanupStrategy, VectorManager};
use vector_warden::models::{LogicalRecord, MetadataFilter};
use vector_warden::progress::{JsonProgress, ProgressReporter, StderrProgress};
use vector_warden::results::{BatchDeletionResult, DeletionResult};

/// Vector Warden — lifecycle management for vector database collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vwd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vwd",
    about = "Vector Warden — lifecycle management for vector database collections",
    version,
    long_about = "Vector Warden provides one operator surface over heterogeneous vector \
    databases (Pinecone, Qdrant). It derives document-level views from chunk metadata, \
    verifies every deletion with a follow-up read, and previews destructive operations \
    before running them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vwd.toml")]
    config: PathBuf,

    /// Emit results as pretty-printed JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Verify backend connectivity and print collection statistics.
    Check,

    /// Print collection statistics.
    Stats,

    /// List documents derived from the collection.
    Docs {
        /// Maximum number of documents to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Page through the document listing.
    ///
    /// Pages are 1-based and recomputed from the live collection on each
    /// call, so contents can shift under concurrent writes.
    Browse {
        /// Page number.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Documents per page.
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },

    /// Substring search over document metadata (case-insensitive).
    Find {
        /// The search query string.
        query: String,

        /// Metadata field to search; repeatable. Defaults to filename
        /// and category.
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Show one document with its chunk list.
    Doc {
        /// The document's source_id.
        source_id: String,
    },

    /// List the chunks of one document.
    Chunks {
        /// The document's source_id.
        source_id: String,

        /// Maximum number of chunks to return.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Find documents sharing an exact filename.
    Duplicates,

    /// Resolve duplicate filenames by deleting all but one document per
    /// group.
    ///
    /// Dry run by default: prints the plan without deleting. The
    /// `manual` strategy never deletes, even with --execute.
    Cleanup {
        /// Survivor selection: `keep-latest`, `keep-earliest`, or `manual`.
        #[arg(long, default_value = "manual")]
        strategy: String,

        /// Actually delete. Without this flag only the plan is printed.
        #[arg(long)]
        execute: bool,
    },

    /// Batch-load records from a JSON file (an array of records with
    /// `logical_id`, `vector`, `text`, `metadata`), then verify a sample.
    Load {
        /// Path to the JSON records file.
        path: PathBuf,

        /// Skip the upload if the first record's source already has
        /// chunks in the collection.
        #[arg(long)]
        skip_existing: bool,

        /// Number of uploaded IDs to re-read for verification.
        #[arg(long, default_value_t = 10)]
        verify_sample: usize,
    },

    /// Delete chunks or documents.
    Delete {
        #[command(subcommand)]
        target: DeleteTarget,
    },

    /// Delete documents uploaded before a cutoff date.
    Prune {
        /// Cutoff, ISO-8601 (`YYYY-MM-DD` or full datetime). Documents
        /// with an upload_date strictly before this are selected;
        /// documents without one never are.
        cutoff: String,

        /// Additional metadata filter as `key=value`; repeatable.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Actually delete. Without this flag only the plan is printed.
        #[arg(long)]
        execute: bool,
    },
}

/// Deletion subcommands.
#[derive(Subcommand)]
enum DeleteTarget {
    /// Delete one chunk by logical ID, with follow-up verification.
    Chunk {
        /// The chunk's logical ID.
        id: String,

        /// Actually delete. Without this flag only a preview is printed.
        #[arg(long)]
        execute: bool,

        /// Skip the follow-up read that confirms the chunk is gone.
        /// Useful on eventually-consistent backends.
        #[arg(long)]
        no_verify: bool,
    },

    /// Delete all chunks of one document, with follow-up verification.
    Doc {
        /// The document's source_id.
        source_id: String,

        /// Actually delete. Without this flag only a preview is printed.
        #[arg(long)]
        execute: bool,

        /// Skip the follow-up read that confirms no chunks remain.
        #[arg(long)]
        no_verify: bool,
    },

    /// Delete everything matching a metadata filter.
    Filter {
        /// Filter as `key=value`; repeatable, all must match.
        #[arg(long = "filter", short = 'f', value_parser = parse_key_val, required = true)]
        filters: Vec<(String, String)>,

        /// Actually delete. Without this flag only a preview is printed.
        #[arg(long)]
        execute: bool,
    },
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn build_filter(pairs: &[(String, String)]) -> MetadataFilter {
    let mut filter = MetadataFilter::new();
    for (key, value) in pairs {
        filter = filter.with(key, serde_json::Value::String(value.clone()));
    }
    filter
}

fn parse_strategy(s: &str) -> Result<CleanupStrategy> {
    match s {
        "keep-latest" => Ok(CleanupStrategy::KeepLatest),
        "keep-earliest" => Ok(CleanupStrategy::KeepEarliest),
        "manual" => Ok(CleanupStrategy::Manual),
        other => anyhow::bail!(
            "Unknown cleanup strategy '{}'. Must be keep-latest, keep-earliest, or manual.",
            other
        ),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_deletion(result: &DeletionResult) {
    let status = if result.success { "ok" } else { "FAILED" };
    println!("[{}] {} (deleted: {})", status, result.message, result.deleted_count);
    for error in &result.errors {
        if error != &result.message {
            println!("  error: {}", error);
        }
    }
}

fn print_batch(result: &BatchDeletionResult) {
    println!(
        "Deleted {}/{} ({} failed)",
        result.total_deleted, result.total_requested, result.total_failed
    );
    for error in &result.errors {
        println!("  error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let backend = factory::shared_backend(&cfg).await?;
    let manager = VectorManager::new(backend, &cfg);

    let progress: Box<dyn ProgressReporter> = if cli.json {
        Box::new(JsonProgress)
    } else {
        Box::new(StderrProgress)
    };

    match cli.command {
        Commands::Check => run_check(&manager, &cfg, cli.json).await,
        Commands::Stats => {
            let stats = manager.stats().await?;
            if cli.json {
                return emit(&stats);
            }
            println!("vectors: {}", stats.total_vectors);
            println!("dimension: {}", stats.dimension);
            println!("fullness: {:.3}", stats.fullness);
            Ok(())
        }
        Commands::Docs { limit } => {
            let docs = manager.discovery.list_all_documents(limit).await?;
            if cli.json {
                return emit(&docs);
            }
            println!("{} documents", docs.len());
            for doc in docs {
                println!(
                    "  {}  {} ({} chunks{})",
                    doc.source_id,
                    doc.filename,
                    doc.chunk_count,
                    doc.upload_date
                        .map(|d| format!(", uploaded {}", d))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Browse { page, page_size } => {
            let result = manager.discovery.browse_documents(page, page_size).await?;
            if cli.json {
                return emit(&result);
            }
            println!(
                "Page {}/{} ({} documents total)",
                result.page, result.total_pages, result.total_items
            );
            for doc in &result.items {
                println!("  {}  {} ({} chunks)", doc.source_id, doc.filename, doc.chunk_count);
            }
            Ok(())
        }
        Commands::Find { query, fields } => {
            let fields = (!fields.is_empty()).then_some(fields);
            let docs = manager
                .discovery
                .search_documents(&query, fields.as_deref())
                .await?;
            if cli.json {
                return emit(&docs);
            }
            println!("{} matching documents", docs.len());
            for doc in docs {
                println!("  {}  {}", doc.source_id, doc.filename);
            }
            Ok(())
        }
        Commands::Doc { source_id } => {
            match manager.discovery.document_tree(&source_id).await? {
                Some(tree) => {
                    if cli.json {
                        return emit(&tree);
                    }
                    println!(
                        "{}  {} ({} chunks)",
                        tree.summary.source_id, tree.summary.filename, tree.summary.chunk_count
                    );
                    for chunk in &tree.chunks {
                        println!("  {}  {}", chunk.logical_id, chunk.text_preview);
                    }
                }
                None => println!("No document found for source_id '{}'", source_id),
            }
            Ok(())
        }
        Commands::Chunks { source_id, limit } => {
            let chunks = manager.backend().list_chunks(&source_id, limit).await?;
            if cli.json {
                return emit(&chunks);
            }
            println!("{} chunks for '{}'", chunks.len(), source_id);
            for chunk in chunks {
                println!("  {}  {}", chunk.logical_id, chunk.text_preview);
            }
            Ok(())
        }
        Commands::Duplicates => {
            let groups = manager.discovery.find_duplicate_documents().await?;
            if cli.json {
                return emit(&groups);
            }
            println!("{} duplicate filename groups", groups.len());
            for group in groups {
                println!("  {} ({} copies)", group.filename, group.count);
                for doc in group.documents {
                    println!(
                        "    {}{}",
                        doc.source_id,
                        doc.upload_date
                            .map(|d| format!("  uploaded {}", d))
                            .unwrap_or_default()
                    );
                }
            }
            Ok(())
        }
        Commands::Cleanup { strategy, execute } => {
            let strategy = parse_strategy(&strategy)?;
            let plan = manager
                .cleanup_duplicates(strategy, execute, progress.as_ref())
                .await?;
            if cli.json {
                return emit(&plan);
            }
            println!(
                "{} duplicate groups, {} documents selected for deletion",
                plan.groups.len(),
                plan.to_delete.len()
            );
            match &plan.result {
                Some(result) => print_batch(result),
                None if !plan.to_delete.is_empty() => {
                    println!("Dry run. Re-run with --execute to delete.")
                }
                None => {}
            }
            Ok(())
        }
        Commands::Load {
            path,
            skip_existing,
            verify_sample,
        } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read records file: {}", path.display()))?;
            let records: Vec<LogicalRecord> =
                serde_json::from_str(&content).context("Failed to parse records file")?;

            if skip_existing {
                if let Some(source_id) = records.first().and_then(|r| r.metadata.source_id()) {
                    let (exists, count) = manager.check_source_exists(source_id).await;
                    if exists {
                        println!(
                            "Skipping: source_id '{}' already has {} chunks",
                            source_id, count
                        );
                        return Ok(());
                    }
                }
            }

            let ids: Vec<String> = records.iter().map(|r| r.logical_id.clone()).collect();
            let receipt = manager.upsert_batched(&records, progress.as_ref()).await;
            let verification = manager.verify_upload(&ids, verify_sample).await?;

            if cli.json {
                return emit(&serde_json::json!({
                    "upload": receipt,
                    "verification": verification,
                }));
            }
            println!(
                "Uploaded {}/{} records",
                receipt.total_uploaded, receipt.total_requested
            );
            for error in &receipt.errors {
                println!("  error: {}", error);
            }
            println!(
                "Verification: {}/{} sampled records found{}",
                verification.found,
                verification.sample_size,
                if verification.success { "" } else { " — VERIFICATION FAILED" }
            );
            Ok(())
        }
        Commands::Delete { target } => run_delete(&manager, target, cli.json).await,
        Commands::Prune {
            cutoff,
            filters,
            execute,
        } => {
            let filter = build_filter(&filters);
            let filter = (!filter.is_empty()).then_some(filter);
            let sweep = manager
                .delete_older_than(&cutoff, filter.as_ref(), execute, progress.as_ref())
                .await?;
            if cli.json {
                return emit(&sweep);
            }
            println!("{} documents older than {}", sweep.matched.len(), cutoff);
            for doc in &sweep.matched {
                println!(
                    "  {}  {}  uploaded {}",
                    doc.source_id,
                    doc.filename,
                    doc.upload_date.as_deref().unwrap_or("-")
                );
            }
            match &sweep.result {
                Some(result) => print_batch(result),
                None if !sweep.matched.is_empty() => {
                    println!("Dry run. Re-run with --execute to delete.")
                }
                None => {}
            }
            Ok(())
        }
    }
}

async fn run_check(manager: &VectorManager, cfg: &Config, json: bool) -> Result<()> {
    let reachable = manager.test_connection().await;
    if !reachable {
        anyhow::bail!("Backend '{}' is not reachable", cfg.backend.kind);
    }
    let stats = manager.stats().await?;
    if json {
        return emit(&serde_json::json!({
            "backend": cfg.backend.kind.to_string(),
            "collection": cfg.backend.collection,
            "stats": stats,
        }));
    }
    println!("Backend '{}' reachable", cfg.backend.kind);
    println!("  collection: {}", cfg.backend.collection);
    println!("  vectors: {}", stats.total_vectors);
    println!("  dimension: {}", stats.dimension);
    Ok(())
}

async fn run_delete(manager: &VectorManager, target: DeleteTarget, json: bool) -> Result<()> {
    match target {
        DeleteTarget::Chunk {
            id,
            execute,
            no_verify,
        } => {
            if !execute {
                let preview = manager
                    .deletion
                    .preview(&DeletionScope::Chunks(vec![id.clone()]))
                    .await?;
                if json {
                    return emit(&preview);
                }
                println!(
                    "Would delete {} chunk(s) across {} document(s)",
                    preview.total_chunks, preview.total_documents
                );
                for warning in &preview.warnings {
                    println!("  warning: {}", warning);
                }
                println!("Dry run. Re-run with --execute to delete.");
                return Ok(());
            }
            let result = manager.deletion.delete_chunk(&id, !no_verify).await;
            if json {
                return emit(&result);
            }
            print_deletion(&result);
            Ok(())
        }
        DeleteTarget::Doc {
            source_id,
            execute,
            no_verify,
        } => {
            if !execute {
                let preview = manager
                    .deletion
                    .preview(&DeletionScope::Documents(vec![source_id.clone()]))
                    .await?;
                if json {
                    return emit(&preview);
                }
                println!(
                    "Would delete {} chunk(s) from document '{}'",
                    preview.total_chunks, source_id
                );
                for warning in &preview.warnings {
                    println!("  warning: {}", warning);
                }
                println!("Dry run. Re-run with --execute to delete.");
                return Ok(());
            }
            let result = manager
                .deletion
                .delete_document(&source_id, !no_verify)
                .await;
            if json {
                return emit(&result);
            }
            print_deletion(&result);
            Ok(())
        }
        DeleteTarget::Filter { filters, execute } => {
            let filter = build_filter(&filters);
            if !execute {
                let preview = manager.preview_filter_deletion(&filter).await?;
                if json {
                    return emit(&preview);
                }
                println!(
                    "Would delete {} chunk(s) across {} document(s)",
                    preview.total_chunks, preview.total_documents
                );
                for warning in &preview.warnings {
                    println!("  warning: {}", warning);
                }
                println!("Dry run. Re-run with --execute to delete.");
                return Ok(());
            }
            let result = manager.deletion.delete_by_filter(&filter, false).await;
            if json {
                return emit(&result);
            }
            print_deletion(&result);
            Ok(())
        }
    }
}
