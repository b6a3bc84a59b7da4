//! Output generation for finished jobs.
//!
//! # Submodules
//!
//! - [`json`]: Writes a job's records to a dated JSON file
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 2021-06-17/
//! │   └── weather.json
//! └── 2021-06-18/
//!     ├── weather.json
//!     └── wuhan-news.json
//! ```

pub mod json;
