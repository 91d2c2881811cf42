//! Run output written outside the database.
//!
//! - [`json`]: the run summary, including curated stories, as a JSON file

pub mod json;
