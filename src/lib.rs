//! # news_snapshot
//!
//! A batch job that snapshots a news landing page section by section,
//! scrapes every linked article, records the run in SQLite and asks a
//! chat-completions API to pick the top stories.
//!
//! ## Architecture
//!
//! 1. **Landing page**: [`scrapers::main_page`] runs every
//!    [`scrapers::section::SectionSpec`] over one fetched document and merges
//!    the headlines by target URI
//! 2. **Articles**: [`scrapers::article_page`] stubs each article row, then
//!    fetches and extracts the page (bounded concurrency)
//! 3. **Curation**: [`curation::CurationClient`] sends the newest successful
//!    headlines and parses the selected stories
//! 4. **Bookkeeping**: [`pipeline::PipelineOrchestrator`] owns the job run and
//!    its success flag; [`store::JobStore`] persists everything
//!
//! Per-item failures are data ([`error::JobFailure`]); they mark the run
//! unsuccessful without stopping it.

pub mod api;
pub mod cli;
pub mod config;
pub mod curation;
pub mod error;
pub mod fetch;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod scrapers;
pub mod store;
pub mod utils;
