//! Batch record types exchanged between the pipeline stages.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Sentinel stored by the record builder when a row carries no image.
/// It crosses the extract/transform payload boundary as-is and is only
/// replaced by the configured placeholder URL during transform.
pub const NO_IMAGE_SENTINEL: &str = "NO_IMAGE";

/// A resolved coordinate pair. A record either has both components
/// (wrapped in `Some`) or no location at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Inline form for the CSV sink.
    pub fn to_inline(self) -> String {
        format!("{},{}", self.lat, self.lng)
    }

    /// JSON array text for the relational sink's location column.
    pub fn to_array_text(self) -> String {
        format!("[{},{}]", self.lat, self.lng)
    }
}

/// One table row as extracted: cells cleaned, capacity still text
/// (thousands separators already stripped), image either an absolute
/// URL or [`NO_IMAGE_SENTINEL`].
///
/// `rank` is the 1-based position of the row in the source table and is
/// never reassigned, so a batch that dropped malformed rows keeps gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedStadium {
    pub rank: u32,
    pub stadium: String,
    pub capacity: String,
    pub region: String,
    pub country: String,
    pub city: String,
    pub images: String,
    pub home_team: String,
}

/// A fully transformed record: capacity coerced to an integer (or null
/// when the source text was unparseable), image placeholder substituted,
/// location filled in where geocoding succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StadiumRecord {
    pub rank: u32,
    pub stadium: String,
    pub capacity: Option<u32>,
    pub region: String,
    pub country: String,
    pub city: String,
    pub images: String,
    pub home_team: String,
    pub location: Option<GeoPoint>,
}

/// Write a batch payload for the next pipeline task to pick up.
pub fn write_payload<T: Serialize>(path: &Path, batch: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(batch)?;
    fs::write(path, json).with_context(|| format!("failed to write payload: {}", path.display()))
}

/// Read a batch payload written by an earlier pipeline task.
pub fn read_payload<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read payload: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse payload: {}", path.display()))
}
