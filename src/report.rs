//! JSON score and parameter reports
//!
//! Written next to the tracking run so pipeline tools that diff metrics
//! between commits can read them without a tracking server.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::config::ReportPaths;
use crate::metrics::EvaluationResult;
use crate::model::Hyperparameters;
use crate::Result;

/// Write whichever reports `paths` configures.
///
/// # Errors
///
/// [`crate::Error::Io`] if a directory or file cannot be written.
pub fn write_reports(
    paths: &ReportPaths,
    hyperparameters: &Hyperparameters,
    scores: &EvaluationResult,
) -> Result<()> {
    if let Some(path) = &paths.scores {
        write_json(path, scores)?;
        info!(path = %path.display(), "wrote scores report");
    }
    if let Some(path) = &paths.params {
        write_json(path, hyperparameters)?;
        info!(path = %path.display(), "wrote params report");
    }
    Ok(())
}

/// Pretty-print `value` as JSON to `path`, creating parent directories.
///
/// # Errors
///
/// [`crate::Error::Io`] or [`crate::Error::Json`].
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}
