//! Geocoding client for the enrichment stage.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::GeocodeError;
use crate::types::GeoPoint;

const OPENCAGE_API_URL: &str = "https://api.opencagedata.com/geocode/v1/json";
const TIMEOUT_SECS: u64 = 10;

/// Resolves a free-text place within a country to a coordinate pair.
///
/// `Ok(None)` means the service answered with no results, which is not
/// an error; the caller leaves the record's location null either way.
pub trait Geocoder {
    fn resolve(&self, place: &str, country: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

/// OpenCage-backed [`Geocoder`]. The API key comes from the
/// environment, never from source.
pub struct OpenCage {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl OpenCage {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENCAGE_API_KEY")
            .context("OPENCAGE_API_KEY environment variable must be set")?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("failed to build geocoding HTTP client")?;
        Ok(Self { client, api_key })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    lat: f64,
    lng: f64,
}

/// Best match: the first result in the service's own ranking.
fn first_point(response: GeocodeResponse) -> Option<GeoPoint> {
    response.results.into_iter().next().map(|result| GeoPoint {
        lat: result.geometry.lat,
        lng: result.geometry.lng,
    })
}

impl Geocoder for OpenCage {
    fn resolve(&self, place: &str, country: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let response: GeocodeResponse = self
            .client
            .get(OPENCAGE_API_URL)
            .query(&[
                ("q", format!("{place},{country}")),
                ("key", self.api_key.clone()),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(first_point(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_point_from_response() {
        let body = r#"{
            "results": [
                {"geometry": {"lat": 51.556, "lng": -0.2795}},
                {"geometry": {"lat": 0.0, "lng": 0.0}}
            ]
        }"#;
        let response: GeocodeResponse = serde_json::from_str(body).unwrap();
        let point = first_point(response).unwrap();
        assert_eq!(point, GeoPoint { lat: 51.556, lng: -0.2795 });
    }

    #[test]
    fn test_no_results_is_none() {
        let response: GeocodeResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(first_point(response), None);
    }
}
