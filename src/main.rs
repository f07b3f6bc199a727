//! Pagemirror CLI - serve, ingest and inspect the page mirror

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use pagemirror::config::{self, AppConfig};
use pagemirror::reconstruct::RangeReader;
use pagemirror::storage::SqliteStore;
use pagemirror::ui;
use pagemirror::{HttpPageSource, IngestPipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pagemirror")]
#[command(version)]
#[command(about = "Mirror a paginated upstream resource into SQLite and serve it back")]
#[command(long_about = r#"
Pagemirror walks a paginated upstream resource, stores each page as one
envelope row plus its item rows, and serves ranges or single pages back in
the original nested JSON shape.

Example usage:
  pagemirror ingest --pages 5
  pagemirror range --left 1 --right 3
  pagemirror serve
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to .env file
    #[arg(long, env = "DOTENV_PATH", default_value = ".env", global = true)]
    dotenv: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one full ingestion from the upstream source
    Ingest {
        /// Number of pages to fetch (overrides config)
        #[arg(short, long)]
        pages: Option<u32>,

        /// Upstream URL (overrides config)
        #[arg(short, long)]
        upstream: Option<String>,
    },

    /// Print the reconstructed pages for an inclusive id range
    Range {
        #[arg(short, long)]
        left: i64,

        #[arg(short, long)]
        right: i64,
    },

    /// Print one reconstructed page
    Get {
        #[arg(short, long)]
        index: i64,
    },

    /// Delete one page and its items
    Delete {
        #[arg(short, long)]
        index: i64,
    },

    /// Show row counts
    Stats,

    /// Check that every item row has an envelope
    Check,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dotenv.exists() {
        dotenvy::from_path(&cli.dotenv)?;
    }

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            println!("{} Server running at http://{}", ui::Icons::GLOBE, config.bind);
            pagemirror::server::start_server(&config).await?;
        }

        Commands::Ingest { pages, upstream } => {
            if let Some(pages) = pages {
                config.pages = pages;
            }
            if let Some(upstream) = upstream {
                config.upstream_url = upstream;
            }
            run_ingest(&config, cli.json).await?;
        }

        Commands::Range { left, right } => {
            let store = open_store(&config)?;
            let records = RangeReader::new(&store).fetch_range(left, right)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Commands::Get { index } => {
            let store = open_store(&config)?;
            match RangeReader::new(&store).fetch_one(index)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("no page with index {}", index),
            }
        }

        Commands::Delete { index } => {
            let store = open_store(&config)?;
            let summary = RangeReader::new(&store).delete_page(index)?;
            if cli.json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                ui::success(&format!(
                    "Deleted page {} ({} envelope, {} items)",
                    index, summary.envelopes, summary.items
                ));
            }
        }

        Commands::Stats => {
            let store = open_store(&config)?;
            let stats = store.stats()?;
            if cli.json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                ui::header(&format!("Pagemirror Statistics ({})", config.database.display()));
                println!("{}", ui::stats_table(&stats));
            }
        }

        Commands::Check => {
            let store = open_store(&config)?;
            let report = RangeReader::new(&store).consistency()?;
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else if report.consistent {
                ui::success("Both tables agree");
            } else {
                ui::error(&format!(
                    "Items without an envelope for ids {:?}",
                    report.orphaned_envelope_ids
                ));
            }
            if !report.consistent {
                anyhow::bail!("store is inconsistent");
            }
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &AppConfig::default(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> anyhow::Result<SqliteStore> {
    config::ensure_db_dir(&config.database)?;
    Ok(SqliteStore::open(&config.database)?)
}

async fn run_ingest(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config)?);
    let source = HttpPageSource::new(config.upstream_url.clone(), config.source_options())?;

    if !json {
        ui::header(&format!("Ingesting {} pages", config.pages));
        ui::info("Upstream", &config.upstream_url);
        ui::info("Database", &config.database.display().to_string());
    }

    let started = Instant::now();
    let report = if json {
        IngestPipeline::new(store.clone(), source, config.pages).run().await?
    } else {
        let (progress, tx) = ui::IngestProgress::new();
        let pipeline = IngestPipeline::new(store.clone(), source, config.pages).with_progress(tx);
        let result = pipeline.run().await;
        // Closes the channel so the renderer thread can exit
        drop(pipeline);
        let report = result?;
        progress.finish_with_summary(started, report.stored(), report.items());
        report
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let failures = ui::report_table(&report);
    if !failures.is_empty() {
        ui::warn(&format!("{} of {} pages skipped", report.failed_pages().len(), config.pages));
        ui::section("Skipped pages");
        println!("{}", failures);
    }
    ui::section("Database");
    println!("{}", ui::stats_table(&store.stats()?));
    Ok(())
}
