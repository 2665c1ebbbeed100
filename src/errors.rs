//! Error taxonomy for the pipeline stages.
//!
//! Fatal errors abort the run and are surfaced to the orchestrator,
//! which owns all retry policy. Per-row and per-lookup failures degrade
//! the affected field instead and the batch continues.

use thiserror::Error;

/// Failures that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network failure, timeout, or non-success status from the source.
    #[error("failed to fetch {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    /// The document no longer matches the structural assumptions
    /// (table count/position).
    #[error("page structure mismatch: {0}")]
    Parse(String),
}

/// A table row with fewer cells than the record layout needs. The row
/// is dropped and the batch continues.
#[derive(Debug, Error)]
#[error("row {row} has {found} cells, expected at least {expected}")]
pub struct MalformedRow {
    pub row: usize,
    pub found: usize,
    pub expected: usize,
}

/// A failed geocoding lookup. The record keeps a null location and the
/// batch continues.
#[derive(Debug, Error)]
#[error("geocoding lookup failed: {0}")]
pub struct GeocodeError(#[from] reqwest::Error);
