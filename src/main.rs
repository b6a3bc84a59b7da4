//! # crawl_engine
//!
//! Runs one scrape job described by a YAML file and writes the extracted
//! records as JSON.
//!
//! ## Usage
//!
//! ```sh
//! crawl_engine -j jobs/weather.yaml -o ./out
//! ```
//!
//! ## Steps
//!
//! 1. **Load**: read the job file; CLI flags and env vars override its tuning
//! 2. **Scrape**: fetch, crawl and extract with [`ScrapeJob`]
//! 3. **Output**: write `{output_dir}/{date}/{job}.json`

use clap::Parser;
use crawl_engine::outputs::json::{JobOutput, write_job_output};
use crawl_engine::utils::ensure_writable_dir;
use crawl_engine::{Fetcher, Job, ScrapeJob};
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::Cli;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("crawl_engine starting up");

    let args = Cli::parse();
    debug!(?args.job, ?args.output_dir, "Parsed CLI arguments");

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Load job ----
    let mut job = Job::load(&args.job)?;
    if let Some(max_concurrency) = args.max_concurrency {
        job.scrape_rules.max_concurrency = max_concurrency;
    }
    if let Some(max_retry) = args.max_retry {
        job.scrape_rules.max_retry = max_retry;
    }
    info!(
        job = %job.name,
        max_concurrency = job.scrape_rules.max_concurrency,
        max_retry = job.scrape_rules.max_retry,
        max_depth = ?job.scrape_rules.max_depth,
        "Job ready"
    );

    // ---- Scrape ----
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .user_agent(args.user_agent.as_str())
        .build()?;
    let fetcher = Fetcher::new(client, job.scrape_rules.max_retry);
    let records = ScrapeJob::new(fetcher).run(&job.urls, &job.scrape_rules).await?;

    // ---- Output ----
    let output = JobOutput::new(job.name.as_str(), records);
    let path = write_job_output(&output, &args.output_dir).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        records = output.record_count,
        path = %path.display(),
        "Execution complete"
    );

    Ok(())
}
