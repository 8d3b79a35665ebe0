use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use tenderwatch::crawling::{CrawlEndReason, CrawlEngine, MergeMode, StopPolicy};
use tenderwatch::infrastructure::config::{AppConfig, defaults};
use tenderwatch::infrastructure::http_client::HttpClient;
use tenderwatch::infrastructure::logging::init_logging;
use tenderwatch::infrastructure::store::TenderStore;

#[derive(Parser)]
#[command(name = "tenderwatch", version, about = "Crawl UK Find a Tender notices into a reconciling JSON store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the search results and merge new tenders into the store
    Crawl(CrawlArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Bounded full crawl, newest first
    Full,
    /// Only tenders published on a specific date
    TargetDate,
    /// Only tenders from the last N days
    LastDays,
    /// Only tenders not yet in the store (daily run)
    Incremental,
}

#[derive(Args)]
struct CrawlArgs {
    #[arg(long, value_enum, default_value = "incremental")]
    mode: Mode,

    /// Target publication date for target-date mode (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Day window for last-days mode
    #[arg(long)]
    days: Option<i64>,

    /// Hard cap on listing pages fetched
    #[arg(long)]
    max_pages: Option<u32>,

    /// Store file path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip detail-page CPV enrichment
    #[arg(long)]
    no_cpv: bool,

    /// Politeness delay between listing pages, in milliseconds. Precedence:
    /// this flag, then the config file, then the mode default (1000 for
    /// incremental, 2000 otherwise)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// JSON config file overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Crawl(args) => crawl(args).await,
    }
}

async fn crawl(args: CrawlArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };

    if let Some(output) = args.output {
        config.output_file = output;
    }
    if let Some(delay) = args.delay_ms {
        config.page_delay_ms = delay;
    } else if args.mode == Mode::Incremental && args.config.is_none() {
        // Incremental runs touch far fewer pages; a shorter pause suffices.
        config.page_delay_ms = defaults::PAGE_DELAY_INCREMENTAL_MS;
    }
    if args.no_cpv {
        config.enrich_cpv = false;
    }

    let store = TenderStore::open(&config.output_file, &config.start_url)
        .await
        .context("failed to open tender store")?;

    let today = Utc::now().date_naive();
    let (policy, merge_mode, max_pages) = match args.mode {
        Mode::Full => (
            StopPolicy::None,
            MergeMode::ProgressivePerPage,
            args.max_pages.or(Some(defaults::MAX_PAGES_FULL)),
        ),
        Mode::TargetDate => (
            StopPolicy::TargetDate(args.date.unwrap_or(today)),
            MergeMode::ProgressivePerPage,
            args.max_pages,
        ),
        Mode::LastDays => {
            let Some(days) = args.days else {
                bail!("--days is required in last-days mode");
            };
            if days < 1 {
                bail!("--days must be at least 1");
            }
            (
                StopPolicy::OlderThan(today - Duration::days(days)),
                MergeMode::ProgressivePerPage,
                args.max_pages,
            )
        }
        Mode::Incremental => (
            StopPolicy::KnownIds {
                ids: store.known_ids(),
                last_scraped_at: store.last_scraped_at(),
            },
            MergeMode::PrependOnComplete,
            args.max_pages,
        ),
    };

    info!(
        "Mode: {:?} | store: {} ({} tenders)",
        args.mode,
        config.output_file.display(),
        store.total()
    );

    let fetcher = Arc::new(HttpClient::new(config.http.clone())?);
    let mut engine = CrawlEngine::new(fetcher, store, policy, merge_mode, max_pages, &config)?;

    // Fetch failures mid-crawl already ended the run with a logged summary;
    // persisted progress up to that point is kept, so this is not an error.
    // A store write failure is: the run could not persist what it crawled.
    let summary = engine.run().await?;
    if let CrawlEndReason::StoreFailed(e) = summary.end_reason {
        bail!("store write failed: {e}");
    }
    Ok(())
}
