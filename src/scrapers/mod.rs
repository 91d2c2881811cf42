//! Scrapers for the landing page and article pages.
//!
//! | Module | Role |
//! |--------|------|
//! | [`section`] | shared extraction engine, one [`section::SectionSpec`] per page region |
//! | [`catalog`] | the AP News section catalog |
//! | [`main_page`] | runs every section over one document and stores the headlines |
//! | [`article_page`] | scrapes one article with stub-then-update persistence |
//!
//! Failures are per item: a broken section or article is recorded on its
//! own result and the run carries on.

pub mod article_page;
pub mod catalog;
pub mod main_page;
pub mod section;
