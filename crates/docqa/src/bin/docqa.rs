//! docqa command line
//!
//! Run with: cargo run -p docqa -- --config docqa.toml query "What changed?"

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docqa::{Document, PipelineCoordinator, QueryOptions, RagConfig, SearchFilter};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Index documents and retrieve passages for question answering", long_about = None)]
struct Cli {
    #[arg(short, long, global = true, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Index plain-text files (unchanged files are skipped)")]
    Index {
        #[arg(required = true, help = "Files to index")]
        files: Vec<PathBuf>,

        #[arg(long, help = "Document ID (single file only; defaults to the file name)")]
        id: Option<String>,

        #[arg(long = "tag", value_parser = parse_tag, help = "Tag as key=value, repeatable")]
        tags: Vec<(String, String)>,
    },

    #[command(about = "Re-embed and replace a document even if unchanged")]
    Reindex {
        #[arg(help = "File to index")]
        file: PathBuf,

        #[arg(long, help = "Document ID (defaults to the file name)")]
        id: Option<String>,

        #[arg(long = "tag", value_parser = parse_tag, help = "Tag as key=value, repeatable")]
        tags: Vec<(String, String)>,
    },

    #[command(about = "Remove a document from the index")]
    Delete {
        #[arg(help = "Document ID")]
        id: String,
    },

    #[command(about = "Retrieve passages for a question")]
    Query {
        #[arg(help = "The question")]
        text: String,

        #[arg(short = 'k', long, help = "Number of passages (overrides config)")]
        top_k: Option<usize>,

        #[arg(short, long = "document", help = "Restrict to these document IDs")]
        documents: Vec<String>,

        #[arg(long, help = "Passages per document, 0 for unlimited")]
        max_per_document: Option<usize>,

        #[arg(long, help = "Print the assembled context instead of a passage list")]
        context: bool,
    },

    #[command(about = "Report whether documents are indexed")]
    Status {
        #[arg(required = true, help = "Document IDs")]
        ids: Vec<String>,
    },

    #[command(about = "Check the embedding service and vector store")]
    Health,
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn load_document(path: &Path, id: Option<String>, tags: &[(String, String)]) -> anyhow::Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let mut doc = Document::new(id.unwrap_or_else(|| filename.clone()), text).with_filename(filename);
    for (key, value) in tags {
        doc = doc.with_tag(key, value);
    }
    Ok(doc)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = RagConfig::load(cli.config.as_deref())?;
    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {} ({:?})", config.embeddings.model, config.embeddings.backend);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - Vector store: {} ({:?})", config.vector_db.url, config.vector_db.backend);
    tracing::info!("  - Collection: {}", config.vector_db.collection);

    let context_max_chars = config.retrieval.context_max_chars;
    let coordinator = PipelineCoordinator::from_config(config).await?;

    match cli.command {
        Commands::Index { files, id, tags } => {
            if id.is_some() && files.len() > 1 {
                bail!("--id can only be used with a single file");
            }

            let mut docs = Vec::with_capacity(files.len());
            let mut id = id;
            for file in &files {
                docs.push(load_document(file, id.take(), &tags)?);
            }

            let mut failures = 0;
            for (file, result) in files.iter().zip(coordinator.index_documents(docs).await) {
                match result {
                    Ok(report) => println!(
                        "{}: {} -> {:?}, {} chunks",
                        file.display(),
                        report.document_id,
                        report.outcome,
                        report.chunk_count
                    ),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", file.display(), e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} files failed", failures, files.len());
            }
        }

        Commands::Reindex { file, id, tags } => {
            let doc = load_document(&file, id, &tags)?;
            let report = coordinator.reindex_document(&doc).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Delete { id } => {
            let report = coordinator.delete_document(&id).await?;
            println!("Removed {} entries of '{}'", report.removed, report.document_id);
        }

        Commands::Query {
            text,
            top_k,
            documents,
            max_per_document,
            context,
        } => {
            let mut options = QueryOptions {
                top_k,
                max_passages_per_document: max_per_document,
                ..QueryOptions::default()
            };
            if !documents.is_empty() {
                options = options.with_filter(SearchFilter::documents(documents));
            }

            let result = coordinator.query(&text, options).await?;
            if context {
                print!("{}", result.build_context(context_max_chars));
            } else if result.is_empty() {
                println!("No passages found");
            } else {
                for (i, passage) in result.passages.iter().enumerate() {
                    println!("[{}] {:.4} {}", i + 1, passage.score, passage.source_ref());
                    println!("    {}", passage.text.trim().replace('\n', "\n    "));
                }
            }
        }

        Commands::Status { ids } => {
            for (id, indexed) in coordinator.are_indexed(&ids).await? {
                println!("{}: {}", id, if indexed { "indexed" } else { "not indexed" });
            }
        }

        Commands::Health => {
            let health = coordinator.health_check().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_healthy() {
                bail!("one or more services are unavailable");
            }
        }
    }

    Ok(())
}
