//! Command-line interface definitions for the crawl engine binary.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Tuning options can also come from environment variables and override what
//! the job file says.

use clap::Parser;

/// Command-line arguments for `crawl_engine`.
///
/// # Examples
///
/// ```sh
/// # Run a job and write its records under ./out
/// crawl_engine -j jobs/weather.yaml -o ./out
///
/// # Same job, gentler on the target site
/// crawl_engine -j jobs/weather.yaml -o ./out --max-concurrency 4 --max-retry 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML job file
    #[arg(short, long)]
    pub job: String,

    /// Output directory for the JSON records
    #[arg(short, long)]
    pub output_dir: String,

    /// Maximum concurrent requests (overrides the job file)
    #[arg(long, env = "CRAWL_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Attempts per URL (overrides the job file)
    #[arg(long, env = "CRAWL_MAX_RETRY")]
    pub max_retry: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, env = "CRAWL_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "CRAWL_USER_AGENT", default_value = concat!("crawl_engine/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&["crawl_engine", "--job", "./job.yaml", "--output-dir", "./out"]);

        assert_eq!(cli.job, "./job.yaml");
        assert_eq!(cli.output_dir, "./out");
        assert_eq!(cli.timeout_secs, 30);
        assert!(cli.user_agent.starts_with("crawl_engine/"));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(&[
            "crawl_engine",
            "-j",
            "/tmp/job.yaml",
            "-o",
            "/tmp/out",
            "--max-concurrency",
            "4",
            "--max-retry",
            "3",
        ]);

        assert_eq!(cli.job, "/tmp/job.yaml");
        assert_eq!(cli.output_dir, "/tmp/out");
        assert_eq!(cli.max_concurrency, Some(4));
        assert_eq!(cli.max_retry, Some(3));
    }

    #[test]
    fn test_cli_requires_job() {
        assert!(Cli::try_parse_from(&["crawl_engine", "-o", "./out"]).is_err());
    }
}
