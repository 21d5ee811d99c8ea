use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use urlake::config::Config;
use urlake::index::builder::IndexBuilder;
use urlake::index::manifest::Manifest;
use urlake::ingest::Ingestor;
use urlake::query::{IndexLoader, QueryService};

// --- CLI CONFIGURATION ---

#[derive(Parser)]
#[command(name = "urlake")]
#[command(about = "Partitioned URL lake with a versioned domain index", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the lake root directory
    #[arg(short, long, global = true)]
    base_path: Option<PathBuf>,

    /// Verbose logging (info level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a line-delimited URL file into a dataset
    Ingest {
        /// Dataset name (assigned a stable id on first use)
        name: String,
        /// Path to a file with one URL per line
        source: PathBuf,
    },

    /// Build the index (full by default)
    Build {
        /// Reuse the current version and index only new files
        #[arg(long)]
        incremental: bool,
    },

    /// Serve the query API over HTTP
    Serve {
        /// Listen address
        #[arg(short, long, default_value = "0.0.0.0:8000")]
        addr: String,
    },

    /// Print index versions and statistics
    Inspect {
        /// Also resolve a domain against the current version
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Remove index versions beyond the retention count
    Gc,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::from_env().context("failed to load config from environment")?,
    };
    if let Some(base_path) = &cli.base_path {
        config.base_path = base_path.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    urlake::logging::init_logger(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ingest { name, source } => {
            let mut ingestor = Ingestor::new(&config)?;
            let stats = ingestor.ingest_file(&name, &source)?;
            println!(
                "dataset '{}' (id {}): {} rows accepted, {} rejected, {} files written",
                name, stats.dataset_id, stats.rows_accepted, stats.rows_rejected, stats.files_written
            );
        }

        Commands::Build { incremental } => {
            let builder = IndexBuilder::new(&config);
            let stats = if incremental {
                builder.build_incremental()?
            } else {
                builder.build_full()?
            };
            println!(
                "version {}: {} domains, {} files, {} posting entries",
                stats.version, stats.num_domains, stats.num_files, stats.num_postings
            );
        }

        Commands::Serve { addr } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(urlake::api::serve(&config, &addr))?;
        }

        Commands::Inspect { domain } => {
            let manifest = Manifest::load(&config.base_path)?;
            match manifest.current_version() {
                Some(current) => println!("current version: {}", current.version),
                None => println!("current version: (none)"),
            }
            for version in manifest.list_versions() {
                println!("  version: {}", version);
            }

            if manifest.current_version().is_some() {
                let loader = Arc::new(IndexLoader::open(&config)?);
                println!(
                    "domains: {}, part files: {}",
                    loader.domain_count(),
                    loader.file_count()
                );

                if let Some(domain) = domain {
                    let service = QueryService::new(loader, config.max_limit);
                    let info = service.datasets_of(&domain)?;
                    match info.domain_id {
                        Some(id) => {
                            let ids: Vec<u32> =
                                info.datasets.iter().map(|d| d.dataset_id).collect();
                            println!("domain '{}' (id {}): datasets {:?}", domain, id, ids);
                        }
                        None => println!("domain '{}' not in index", domain),
                    }
                }
            } else if domain.is_some() {
                println!("no published version to query");
            }
        }

        Commands::Gc => {
            let builder = IndexBuilder::new(&config);
            let removed = builder.gc()?;
            if removed.is_empty() {
                println!("nothing to remove");
            } else {
                println!("removed versions: {}", removed.join(", "));
            }
        }
    }

    Ok(())
}
