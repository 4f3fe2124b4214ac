//! Command-line entry point for the ingestion and retrieval service: one
//! process that can run a single operation and exit, or serve the HTTP
//! surface long-running via `serve`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memcore::Tags;
use memcore::config::Config;
use search::AskOptions;

#[derive(Parser)]
#[command(name = "ccmemory")]
#[command(about = "Ingest documents into a local memory index and ask grounded questions over them")]
struct Cli {
  /// Project directory to load ccmemory.toml from (defaults to the current directory)
  #[arg(long, global = true)]
  project: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Upload one or more files into an index and run them through the pipeline
  Import {
    /// Target index name
    index: String,
    /// Files to ingest
    files: Vec<PathBuf>,
    /// Document id (defaults to a generated uuid)
    #[arg(long)]
    document_id: Option<String>,
    /// Tag as key=value, may be repeated
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,
  },
  /// Ask a grounded question over an index
  Ask {
    index: String,
    question: String,
    /// Filter as key=value, may be repeated
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,
  },
  /// Search an index for matching partitions
  Search {
    index: String,
    query: String,
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,
    #[arg(long, default_value_t = 10)]
    limit: usize,
  },
  /// List known indexes
  ListIndexes,
  /// Delete a document from an index
  DeleteDocument { index: String, document_id: String },
  /// Delete an entire index
  DeleteIndex { index: String },
  /// Run the HTTP server
  Serve,
}

fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
  raw
    .iter()
    .map(|pair| {
      pair
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{pair}'"))
    })
    .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

  match run().await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      tracing::error!(%err, "ccmemory failed");
      eprintln!("error: {err:#}");
      ExitCode::from(255) // -1 as an unsigned exit code
    }
  }
}

async fn run() -> Result<()> {
  let cli = Cli::parse();
  let project_root = cli.project.clone().unwrap_or(std::env::current_dir()?);
  let config = Config::load_for_project(&project_root).context("loading configuration")?;

  match cli.command {
    Command::Serve => {
      let (orchestrator, search_client) = daemon::build(&config).await?;
      let state = daemon::AppState::new(orchestrator, search_client, config.http.clone());
      tracing::info!(bind = %config.http.bind, "starting ccmemory daemon");
      daemon::serve(state, &config.http.bind).await?;
    }
    Command::Import { index, files, document_id, tags } => {
      let (orchestrator, _search) = daemon::build(&config).await?;
      let document_id = document_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
      let tag_pairs = parse_pairs(&tags)?;
      let tags = Tags::from_pairs(tag_pairs)?;

      let mut payload = Vec::new();
      for path in &files {
        let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload").to_string();
        let mime_type = extract::mime_for_name(&name);
        payload.push((memcore::FileDescriptor::new(name, &content, mime_type), content));
      }

      let steps = pipeline::handlers::DEFAULT_STEPS.iter().map(|s| s.to_string()).collect();
      let pipeline = orchestrator.import_document(&index, &document_id, tags, steps, payload).await?;
      println!("{}", serde_json::to_string_pretty(&pipeline)?);
    }
    Command::Ask { index, question, filters } => {
      let (_orchestrator, search_client) = daemon::build(&config).await?;
      let filters = parse_pairs(&filters)?;
      let answer = search_client.ask(&index, &question, &filters, &AskOptions::default()).await?;
      println!("{}", serde_json::to_string_pretty(&answer)?);
    }
    Command::Search { index, query, filters, limit } => {
      let (_orchestrator, search_client) = daemon::build(&config).await?;
      let filters = parse_pairs(&filters)?;
      let result = search_client.search(&index, &query, &filters, config.pipeline.min_relevance, limit).await?;
      println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Command::ListIndexes => {
      let (_orchestrator, search_client) = daemon::build(&config).await?;
      let indexes = search_client.list_indexes().await?;
      println!("{}", serde_json::to_string_pretty(&indexes)?);
    }
    Command::DeleteDocument { index, document_id } => {
      let (orchestrator, _search) = daemon::build(&config).await?;
      orchestrator.start_document_deletion(&index, &document_id).await?;
      println!("deleted document '{document_id}' from index '{index}'");
    }
    Command::DeleteIndex { index } => {
      let (orchestrator, _search) = daemon::build(&config).await?;
      orchestrator.start_index_deletion(&index).await?;
      println!("deleted index '{index}'");
    }
  }

  Ok(())
}
