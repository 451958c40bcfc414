//! photo-dl CLI: fetch every missing dataset photo into the output directory

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use photo_dl::{
    BatchEngine, Config, DispatchMode, HttpFetcher, JsonDatasetSource, OutputStore, Report,
    RetryPolicy, WorkItemSource, cancel_on_signal, missing_items,
};
use tracing_subscriber::EnvFilter;

/// Bulk-download dataset photos, skipping those already on disk
#[derive(Parser, Debug)]
#[command(name = "photo-dl", version, about)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset JSON file
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Output directory for stored photos
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Dispatch mode: "unthrottled" (one pool) or "paced" (chunks with a pause)
    #[arg(short, long)]
    mode: Option<DispatchMode>,

    /// Maximum downloads in flight (chunk size in paced mode)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Seconds to pause between chunks in paced mode (0 disables)
    #[arg(long)]
    batch_delay_secs: Option<u64>,

    /// Attempts per photo, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Backoff after the first rate-limited attempt, in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Requested image width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Retry only rate-limited requests, not transient network errors
    #[arg(long)]
    rate_limit_only: bool,

    /// Randomize backoff waits
    #[arg(long)]
    jitter: bool,

    /// Exit with status 1 if any download failed
    #[arg(long)]
    strict: bool,
}

impl Cli {
    /// Starting point before the config file: the paced preset if requested
    fn base_config(&self) -> Config {
        match self.mode {
            Some(DispatchMode::Paced) => Config::paced(),
            _ => Config::default(),
        }
    }

    /// Defaults or preset, then the config file
    fn load_config(&self) -> photo_dl::Result<Config> {
        match &self.config {
            Some(path) => Config::from_file_over(path, self.base_config()),
            None => Ok(self.base_config()),
        }
    }

    /// Apply flag overrides on top of file and environment settings
    fn apply(&self, config: &mut Config) {
        if let Some(dataset) = &self.dataset {
            config.paths.dataset = dataset.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.paths.output_dir = output_dir.clone();
        }
        if let Some(mode) = self.mode {
            config.batch.mode = mode;
        }
        if let Some(concurrency) = self.concurrency {
            config.batch.concurrency_limit = concurrency;
        }
        if let Some(secs) = self.batch_delay_secs {
            config.batch.inter_batch_delay = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(max_attempts) = self.max_attempts {
            config.batch.retry.max_attempts = max_attempts;
        }
        if let Some(ms) = self.backoff_ms {
            config.batch.retry.backoff_base = Duration::from_millis(ms);
        }
        if let Some(width) = self.width {
            config.api.max_width_px = width;
        }
        if self.rate_limit_only {
            config.batch.retry.policy = RetryPolicy::RateLimitOnly;
        }
        if self.jitter {
            config.batch.retry.jitter = true;
        }
    }
}

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("photo_dl=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real environment variables win
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(report) if cli.strict && !report.all_succeeded() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> photo_dl::Result<Report> {
    let mut config = cli.load_config()?;
    config.apply_env();
    cli.apply(&mut config);
    config.validate()?;

    let store = OutputStore::new(&config.paths.output_dir, &config.paths.extension);
    let source = JsonDatasetSource::new(&config.paths.dataset, store.clone());

    tracing::info!(dataset = %source.dataset().display(), "Loading dataset");
    let items = source.list_all_items().await?;
    let existing = source.existing_ids().await?;
    let with_photos = items.iter().filter(|i| i.has_photo).count();
    let total_records = items.len();
    let missing = missing_items(items, &existing);

    tracing::info!(
        total = total_records,
        with_photos,
        existing = existing.len(),
        missing = missing.len(),
        "Dataset scanned"
    );

    if missing.is_empty() {
        println!("All photos already downloaded!");
        return Ok(Report::default());
    }

    let api_key = config.require_api_key()?.clone();
    store.ensure_dir().await?;

    let fetcher = HttpFetcher::new(&config.api, api_key, store)?;
    let engine = BatchEngine::new(Arc::new(fetcher), config.batch.clone());

    let signal_watcher = tokio::spawn(cancel_on_signal(engine.cancel_token()));

    println!(
        "Downloading {} photos ({} concurrent, {} mode)...",
        missing.len(),
        config.batch.concurrency_limit,
        config.batch.mode
    );
    let outcomes = engine.run_batch(missing).await;
    signal_watcher.abort();

    let report = Report::from_outcomes(&outcomes);
    print!("\n{}", report.render(config.report.failure_display_limit));
    Ok(report)
}
