//! JSON run summaries.
//!
//! ```text
//! json_output_dir/
//! └── 2025-06-01/
//!     ├── run-41.json
//!     └── run-42.json
//! ```
//!
//! The date directory is the UTC date the run started.

use std::error::Error;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info, instrument};

use crate::pipeline::RunSummary;

/// Write `summary` to `{json_output_dir}/{date}/run-{job_id}.json` and return
/// the path written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display(), job_id = summary.job_id))]
pub async fn write_run_summary(
    summary: &RunSummary,
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(summary)?;

    let date_dir = json_output_dir.join(summary.started_on.date_naive().to_string());
    if let Err(e) = fs::create_dir_all(&date_dir).await {
        error!(dir = %date_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = date_dir.join(format!("run-{}.json", summary.job_id));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(path)
}
