use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use harvest_client::ReqwestFetcher;
use harvest_core::models::{CollectionTarget, RunSummary};
use harvest_core::sources::SITE_ORIGIN;
use harvest_core::traits::RecordSink;
use harvest_core::{
    HarvestConfig, Harvester, HeadingListSource, MemorySink, PaginatedTableSource, Pipeline,
};
use harvest_db::{Database, DatabaseConfig, RecordRepository};

const FILMS_URL: &str = "https://www.scrapethissite.com/pages/ajax-javascript/#2015";
const FILMS_STORE: &str = "Oscar_Winning_Films";

const TEAMS_URL: &str = "https://www.scrapethissite.com/pages/forms/";
const TEAMS_STORE: &str = "Hockey_Teams_Data";
const TEAMS_COLLECTION: &str = "teams";

const TOPICS_URL: &str = "https://www.scrapethissite.com/pages/advanced/";
const TOPICS_STORE: &str = "Advanced_topics";
const TOPICS_COLLECTION: &str = "Topics";

#[derive(Parser)]
#[command(name = "harvest", version, about = "Concurrent record harvester")]
struct Cli {
    /// Maximum concurrent page fetches (overrides HARVEST_WORKERS)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Rows requested per listing page (overrides HARVEST_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// Per-request timeout in seconds (overrides HARVEST_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the configured sources and store the records
    Run {
        /// Run a single source instead of all three
        #[arg(long, value_enum)]
        only: Option<SourceKind>,

        /// Keep records in memory and print a summary instead of persisting
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Print the number of documents stored in a collection
    Count {
        #[arg(short, long)]
        store: String,

        #[arg(short, long)]
        collection: String,
    },

    /// Print the most recent documents of a collection as JSON
    Show {
        #[arg(short, long)]
        store: String,

        #[arg(short, long)]
        collection: String,

        /// Number of documents to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// List every non-empty collection with its size
    Collections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Films,
    Teams,
    Topics,
}

impl SourceKind {
    fn selected(only: Option<SourceKind>) -> Vec<SourceKind> {
        match only {
            Some(kind) => vec![kind],
            None => vec![SourceKind::Films, SourceKind::Teams, SourceKind::Topics],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run { only, dry_run } => {
            let config = harvest_config(cli.workers, cli.page_size, cli.timeout)?;
            cmd_run(config, only, dry_run).await?;
        }
        Commands::Count { store, collection } => {
            let repo = connect_db().await?;
            let target = CollectionTarget::new(store, collection);
            let count = repo.count(&target).await.map_err(|e| anyhow::anyhow!(e))?;
            println!("{target}: {count} documents");
        }
        Commands::Show {
            store,
            collection,
            limit,
        } => {
            let repo = connect_db().await?;
            cmd_show(&repo, &CollectionTarget::new(store, collection), limit).await?;
        }
        Commands::Collections => {
            let repo = connect_db().await?;
            let collections = repo.collections().await.map_err(|e| anyhow::anyhow!(e))?;
            if collections.is_empty() {
                println!("No collections stored yet");
            }
            for (target, count) in collections {
                println!("  {target}: {count}");
            }
        }
    }

    Ok(())
}

/// Install the fmt subscriber, writing to stderr or to `log_file`.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("harvest=info".parse()?);

    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Environment configuration with command-line overrides applied on top.
fn harvest_config(
    workers: Option<usize>,
    page_size: Option<u32>,
    timeout: Option<u64>,
) -> Result<HarvestConfig> {
    let config = HarvestConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    apply_overrides(config, workers, page_size, timeout)
}

fn apply_overrides(
    mut config: HarvestConfig,
    workers: Option<usize>,
    page_size: Option<u32>,
    timeout: Option<u64>,
) -> Result<HarvestConfig> {
    if let Some(workers) = workers {
        anyhow::ensure!(workers > 0, "--workers must be at least 1");
        config = config.with_worker_cap(workers);
    }
    if let Some(page_size) = page_size {
        anyhow::ensure!(page_size > 0, "--page-size must be at least 1");
        config = config.with_page_size(page_size);
    }
    if let Some(secs) = timeout {
        anyhow::ensure!(secs > 0, "--timeout must be at least 1 second");
        config = config.with_fetch_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<RecordRepository> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db.record_repo())
}

async fn cmd_run(config: HarvestConfig, only: Option<SourceKind>, dry_run: bool) -> Result<()> {
    let started = Instant::now();
    let fetcher = ReqwestFetcher::from_config(&config).context("Failed to create HTTP client")?;
    let kinds = SourceKind::selected(only);

    tracing::info!(
        workers = config.worker_cap,
        page_size = config.page_size,
        timeout_secs = config.fetch_timeout.as_secs(),
        dry_run,
        "Starting harvest"
    );

    let summaries = if dry_run {
        let sink = MemorySink::new();
        let summaries = run_sources(&Pipeline::new(sink.clone()), &fetcher, &config, &kinds).await?;
        for (target, count) in sink.summary() {
            println!("  {target}: {count} documents (not persisted)");
        }
        summaries
    } else {
        // A lazy pool never fails the run on connectivity; inserts report it.
        let db_config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
        let db = Database::connect_lazy(&db_config).map_err(|e| anyhow::anyhow!(e))?;
        if let Err(e) = db.migrate().await {
            tracing::error!(error = %e, "Could not prepare the records table");
        }
        run_sources(&Pipeline::new(db.record_repo()), &fetcher, &config, &kinds).await?
    };

    for summary in &summaries {
        print_summary(summary);
    }
    println!(
        "Finished {} runs in {:.2} seconds",
        summaries.len(),
        started.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Run each selected source in order through `pipeline`.
async fn run_sources<S: RecordSink>(
    pipeline: &Pipeline<S>,
    fetcher: &ReqwestFetcher,
    config: &HarvestConfig,
    kinds: &[SourceKind],
) -> Result<Vec<RunSummary>> {
    let mut summaries = Vec::new();

    for kind in kinds {
        match kind {
            SourceKind::Films => {
                summaries.extend(pipeline.run_yearly(fetcher, FILMS_URL, FILMS_STORE).await);
            }
            SourceKind::Teams => {
                let harvester = Harvester::new(fetcher.clone(), config.clone());
                let source = PaginatedTableSource::teams(harvester, TEAMS_URL)
                    .map_err(|e| anyhow::anyhow!(e))?;
                let target = CollectionTarget::new(TEAMS_STORE, TEAMS_COLLECTION);
                summaries.push(pipeline.run(&source, &target).await);
            }
            SourceKind::Topics => {
                let source = HeadingListSource::new(fetcher.clone(), TOPICS_URL, SITE_ORIGIN)
                    .map_err(|e| anyhow::anyhow!(e))?;
                let target = CollectionTarget::new(TOPICS_STORE, TOPICS_COLLECTION);
                summaries.push(pipeline.run(&source, &target).await);
            }
        }
    }

    Ok(summaries)
}

fn print_summary(summary: &RunSummary) {
    let status = match summary.inserted {
        Some(count) => format!("{count} saved"),
        None => "NOT saved".to_string(),
    };
    println!(
        "  [{}] {} documents, {} ({:.2}s)",
        summary.target,
        summary.documents,
        status,
        summary.elapsed.as_secs_f64()
    );
}

async fn cmd_show(repo: &RecordRepository, target: &CollectionTarget, limit: usize) -> Result<()> {
    let documents = repo
        .list_recent(target, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if documents.is_empty() {
        println!("No documents found in {target}");
        return Ok(());
    }

    println!("Latest documents in {target}:\n");
    for stored in &documents {
        println!(
            "  {} (id {})",
            stored.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            stored.id
        );
        println!("{}", serde_json::to_string_pretty(&stored.document)?);
    }
    println!("\nShowing {} documents", documents.len());

    Ok(())
}
