//! YAML job files.
//!
//! A job names itself, lists its start URLs and carries the [`ScrapeRules`]
//! handed to [`crate::pipeline::ScrapeJob`]:
//!
//! ```yaml
//! name: weather
//! urls:
//!   - http://www.weather.com.cn/weather/101200101.shtml
//! scrape_rules:
//!   max_retry: 3
//!   parsing_pipeline:
//!     - parser: list_item_parser
//!       rules:
//!         - field_name: high
//!           rule_type: xpath
//!           rule: //ul[@class="t clearfix"]/li/p[@class="tem"]/span/text()
//! ```

use crate::error::{EngineError, Result};
use crate::models::ScrapeRules;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub scrape_rules: ScrapeRules,
}

impl Job {
    /// Parse and validate a job from YAML text.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for malformed YAML, a job without start URLs,
    /// or a job without parsing stages.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let job: Job = serde_yaml::from_str(text)?;
        job.validate()?;
        Ok(job)
    }

    /// Read a job file.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] when the file cannot be read, otherwise as
    /// [`Job::from_yaml_str`].
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let job = Self::from_yaml_str(&text)?;
        info!(
            job = %job.name,
            urls = job.urls.len(),
            stages = job.scrape_rules.parsing_pipeline.len(),
            "Loaded job file"
        );
        Ok(job)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Config("job name must not be empty".into()));
        }
        if self.urls.is_empty() {
            return Err(EngineError::Config(format!("job {:?} has no urls", self.name)));
        }
        if self.scrape_rules.parsing_pipeline.is_empty() {
            return Err(EngineError::Config(format!("job {:?} has an empty parsing_pipeline", self.name)));
        }
        Ok(())
    }
}
