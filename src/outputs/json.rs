//! JSON output for finished scrape jobs.
//!
//! # Output Structure
//!
//! Files are organized by run date, one file per job:
//! ```text
//! output_dir/
//! └── 2021-06-18/
//!     ├── weather.json
//!     └── wuhan-news.json
//! ```
//!
//! Running the same job twice on one day replaces that day's file.

use crate::pipeline::ScrapedRecord;
use chrono::Local;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// What one job run produced, as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutput {
    pub job: String,
    pub local_date: String,
    pub local_time: String,
    pub record_count: usize,
    pub records: Vec<ScrapedRecord>,
}

impl JobOutput {
    /// Stamp `records` with the current local date and time.
    pub fn new(job: impl Into<String>, records: Vec<ScrapedRecord>) -> Self {
        let now = Local::now();
        Self {
            job: job.into(),
            local_date: now.date_naive().to_string(),
            local_time: now.time().format("%H:%M:%S").to_string(),
            record_count: records.len(),
            records,
        }
    }
}

/// Write a [`JobOutput`] under a date directory.
///
/// # Arguments
///
/// * `output` - The records to serialize
/// * `output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The path written: `{output_dir}/{local_date}/{job}.json`.
///
/// # Errors
///
/// Returns an error if serialization, directory creation or the write fails.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir, job = %output.job))]
pub async fn write_job_output(output: &JobOutput, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(output)?;

    let full_json_dir = PathBuf::from(output_dir).join(&output.local_date);
    info!(dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = full_json_dir.join(format!("{}.json", output.job));
    fs::write(&path, json).await?;
    info!(path = %path.display(), records = output.record_count, "Wrote JSON file");

    Ok(path)
}
