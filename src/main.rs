//! # autodoc CLI
//!
//! ## Usage
//!
//! ```bash
//! autodoc --config ./config/autodoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `autodoc generate` | Document the head of a Bitbucket repository |
//! | `autodoc local <dir>` | Document a local source tree |
//! | `autodoc chunks <dir>` | Show how a tree would be loaded and partitioned |
//! | `autodoc serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `autodoc=info`); documents go to stdout unless `--out` is given.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use autodoc::config::{self, Config};
use autodoc::models::DocRequest;
use autodoc::pipeline::{DocOutcome, Pipeline};
use autodoc::{chunk, loader, server};

/// Generate HTML architecture documentation for a source repository with an LLM.
#[derive(Parser)]
#[command(name = "autodoc", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/autodoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Document the head of the configured branch of a hosted repository.
    ///
    /// Returns the cached document when this commit was documented before.
    Generate {
        #[arg(long)]
        workspace: String,

        #[arg(long)]
        repo: String,

        /// Account used for basic auth against the source host.
        #[arg(long)]
        username: String,

        /// App password or access token.
        #[arg(long, env = "BITBUCKET_TOKEN", hide_env_values = true)]
        token: String,

        /// Existing document to update instead of starting from scratch.
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Write the document here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Document a local source tree.
    Local {
        dir: PathBuf,

        /// Cache key. Defaults to a hash of the loaded files.
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Dry run: load and partition a tree without calling the model.
    Chunks { dir: PathBuf },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autodoc=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Generate {
            workspace,
            repo,
            username,
            token,
            previous,
            out,
        } => {
            let previous_html_content = match previous {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let req = DocRequest {
                repo_name: repo,
                workspace_name: workspace,
                org_admin_email: username,
                access_token: token,
                diff: None,
                previous_html_content,
            };
            let pipeline = Pipeline::from_config(cfg)?;
            let outcome = pipeline.run(&req).await?;
            emit(&outcome, out.as_deref())?;
        }
        Commands::Local { dir, key, out } => {
            let pipeline = Pipeline::from_config(cfg)?;
            let outcome = pipeline.run_local(&dir, key.as_deref()).await?;
            emit(&outcome, out.as_deref())?;
        }
        Commands::Chunks { dir } => {
            print_chunks(&cfg, &dir)?;
        }
        Commands::Serve => {
            let pipeline = Arc::new(Pipeline::from_config(cfg)?);
            server::run_server(pipeline).await?;
        }
    }

    Ok(())
}

fn emit(outcome: &DocOutcome, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, &outcome.html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} → {} (commit {}, cached: {})",
                outcome.title,
                path.display(),
                outcome.commit,
                outcome.cached
            );
        }
        None => println!("{}", outcome.html),
    }
    Ok(())
}

fn print_chunks(cfg: &Config, dir: &Path) -> anyhow::Result<()> {
    let records = loader::load_snapshot(dir, &cfg.loader)?;
    let files = records.len();
    let chars: usize = records.iter().map(|r| r.char_len()).sum();
    let chunks = chunk::partition(records, cfg.pipeline.chunk_char_budget);

    println!(
        "{} files, {} chars, {} chunks (budget {})",
        files,
        chars,
        chunks.len(),
        cfg.pipeline.chunk_char_budget
    );
    for c in &chunks {
        let over = if c.char_size > cfg.pipeline.chunk_char_budget {
            "  [oversized]"
        } else {
            ""
        };
        println!("  {:<10} {:>4} files {:>9} chars{}", c.unit_id(), c.files.len(), c.char_size, over);
        for f in &c.files {
            println!("      {}", f.path);
        }
    }
    Ok(())
}
