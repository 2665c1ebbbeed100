//! Transform stage: capacity coercion, image placeholder substitution,
//! and the two-pass location enrichment.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use crate::clean::coerce_capacity;
use crate::geocode::{Geocoder, OpenCage};
use crate::types::{read_payload, write_payload, ScrapedStadium, StadiumRecord, NO_IMAGE_SENTINEL};

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub requeried: usize,
    pub unresolved: usize,
}

/// Coerce capacities and substitute the image placeholder; locations
/// start out empty.
pub fn prepare_records(scraped: Vec<ScrapedStadium>, no_image_url: &str) -> Vec<StadiumRecord> {
    scraped
        .into_iter()
        .map(|s| {
            let images = if s.images.is_empty() || s.images == NO_IMAGE_SENTINEL {
                no_image_url.to_string()
            } else {
                s.images
            };
            StadiumRecord {
                rank: s.rank,
                stadium: s.stadium,
                capacity: coerce_capacity(&s.capacity),
                region: s.region,
                country: s.country,
                city: s.city,
                images,
                home_team: s.home_team,
                location: None,
            }
        })
        .collect()
}

/// Resolve a location for every record.
///
/// Pass one queries by stadium name. Where the geocoder matched too
/// coarsely, several stadiums in one city come back with the exact same
/// coordinates; pass two re-resolves those records by city instead,
/// which at least separates stadiums the service knows by their city
/// centroid match. The first record of a colliding group keeps its pass
/// one answer, as do records whose city query comes back empty.
/// Records that pass one could not resolve at all get the city query
/// too. Lookups run one at a time in record order, so collisions are
/// detected on a deterministic batch.
pub fn enrich_locations(records: &mut [StadiumRecord], geocoder: &dyn Geocoder) -> EnrichStats {
    for record in records.iter_mut() {
        record.location = match geocoder.resolve(&record.stadium, &record.country) {
            Ok(location) => location,
            Err(err) => {
                eprintln!("  {}: {err}", record.stadium);
                None
            }
        };
    }

    // f64 bit keys: identical coordinates only ever come from identical
    // response payloads, so bitwise equality is the right test.
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut retry = Vec::new();
    for (i, record) in records.iter().enumerate() {
        match record.location {
            Some(point) => {
                if !seen.insert((point.lat.to_bits(), point.lng.to_bits())) {
                    retry.push(i);
                }
            }
            None => retry.push(i),
        }
    }

    for &i in &retry {
        let record = &mut records[i];
        match geocoder.resolve(&record.city, &record.country) {
            Ok(Some(point)) => record.location = Some(point),
            Ok(None) => {}
            Err(err) => eprintln!("  {}: {err}", record.city),
        }
    }

    EnrichStats {
        requeried: retry.len(),
        unresolved: records.iter().filter(|r| r.location.is_none()).count(),
    }
}

/// Full transform over an extracted batch. `None` for the geocoder
/// leaves every location empty (offline runs).
pub fn transform_batch(
    scraped: Vec<ScrapedStadium>,
    geocoder: Option<&dyn Geocoder>,
    no_image_url: &str,
) -> Vec<StadiumRecord> {
    let mut records = prepare_records(scraped, no_image_url);
    match geocoder {
        Some(geocoder) => {
            let stats = enrich_locations(&mut records, geocoder);
            println!(
                "  geocoding: {} re-queried, {} left unresolved",
                stats.requeried, stats.unresolved
            );
        }
        None => println!("  geocoding skipped, locations left empty"),
    }
    records
}

pub fn run_transform(payload: &str, out: &str, skip_geo: bool, no_image_url: &str) -> Result<()> {
    let scraped: Vec<ScrapedStadium> = read_payload(Path::new(payload))?;
    println!("Transforming {} records from {payload}", scraped.len());

    let geocoder = if skip_geo {
        None
    } else {
        Some(OpenCage::from_env()?)
    };
    let records = transform_batch(
        scraped,
        geocoder.as_ref().map(|g| g as &dyn Geocoder),
        no_image_url,
    );

    write_payload(Path::new(out), &records)?;
    println!("Wrote {} enriched records to {out}", records.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GeocodeError;
    use crate::extract::extract_stadiums;
    use crate::types::GeoPoint;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const PLACEHOLDER: &str = "https://img.example/no-image.png";

    /// Scripted geocoder: answers by (place, country), records calls.
    struct Stub {
        answers: HashMap<(String, String), GeoPoint>,
        calls: RefCell<Vec<String>>,
    }

    impl Stub {
        fn new(answers: &[(&str, &str, f64, f64)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(place, country, lat, lng)| {
                        ((place.to_string(), country.to_string()), GeoPoint { lat: *lat, lng: *lng })
                    })
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Geocoder for Stub {
        fn resolve(&self, place: &str, country: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.calls.borrow_mut().push(place.to_string());
            Ok(self
                .answers
                .get(&(place.to_string(), country.to_string()))
                .copied())
        }
    }

    fn record(rank: u32, stadium: &str, city: &str, country: &str) -> StadiumRecord {
        StadiumRecord {
            rank,
            stadium: stadium.to_string(),
            capacity: Some(10_000),
            region: "Europe".to_string(),
            country: country.to_string(),
            city: city.to_string(),
            images: PLACEHOLDER.to_string(),
            home_team: String::new(),
            location: None,
        }
    }

    #[test]
    fn test_collision_broken_by_city_query() {
        // Both stadium queries collapse to the same point; the city
        // queries do not.
        let stub = Stub::new(&[
            ("Anfield", "England", 53.4, -2.9),
            ("Goodison Park", "England", 53.4, -2.9),
            ("Liverpool", "England", 53.41, -2.98),
        ]);
        let mut records = vec![
            record(1, "Anfield", "Liverpool", "England"),
            record(2, "Goodison Park", "Liverpool", "England"),
        ];

        let stats = enrich_locations(&mut records, &stub);

        assert_eq!(records[0].location, Some(GeoPoint { lat: 53.4, lng: -2.9 }));
        assert_eq!(records[1].location, Some(GeoPoint { lat: 53.41, lng: -2.98 }));
        assert_ne!(records[0].location, records[1].location);
        assert_eq!(stats.requeried, 1);
        // Only the second of the colliding pair was re-queried.
        assert_eq!(
            *stub.calls.borrow(),
            vec!["Anfield", "Goodison Park", "Liverpool"]
        );
    }

    #[test]
    fn test_unique_resolutions_untouched() {
        let stub = Stub::new(&[
            ("Camp Nou", "Spain", 41.38, 2.12),
            ("Wembley Stadium", "England", 51.55, -0.28),
        ]);
        let mut records = vec![
            record(1, "Camp Nou", "Barcelona", "Spain"),
            record(2, "Wembley Stadium", "London", "England"),
        ];

        let stats = enrich_locations(&mut records, &stub);

        assert_eq!(stats.requeried, 0);
        assert_eq!(stub.calls.borrow().len(), 2);
    }

    #[test]
    fn test_unresolved_record_retried_by_city() {
        let stub = Stub::new(&[("Tehran", "Iran", 35.69, 51.39)]);
        let mut records = vec![record(1, "Azadi Stadium", "Tehran", "Iran")];

        let stats = enrich_locations(&mut records, &stub);

        assert_eq!(records[0].location, Some(GeoPoint { lat: 35.69, lng: 51.39 }));
        assert_eq!(stats.requeried, 1);
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn test_city_miss_keeps_pass_one_answer() {
        // Colliding pair whose city query finds nothing: the duplicate
        // keeps the coarse pass one coordinates rather than losing them.
        let stub = Stub::new(&[
            ("San Siro", "Italy", 45.47, 9.12),
            ("Giuseppe Meazza", "Italy", 45.47, 9.12),
        ]);
        let mut records = vec![
            record(1, "San Siro", "Milan", "Italy"),
            record(2, "Giuseppe Meazza", "Milan", "Italy"),
        ];

        let stats = enrich_locations(&mut records, &stub);

        assert_eq!(records[1].location, Some(GeoPoint { lat: 45.47, lng: 9.12 }));
        assert_eq!(stats.requeried, 1);
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn test_placeholder_substitution() {
        let scraped = vec![
            ScrapedStadium {
                rank: 1,
                stadium: "A".into(),
                capacity: "100".into(),
                region: String::new(),
                country: String::new(),
                city: String::new(),
                images: NO_IMAGE_SENTINEL.to_string(),
                home_team: String::new(),
            },
            ScrapedStadium {
                rank: 2,
                stadium: "B".into(),
                capacity: "200".into(),
                region: String::new(),
                country: String::new(),
                city: String::new(),
                images: "https://img.example/b.jpg".into(),
                home_team: String::new(),
            },
        ];

        let records = prepare_records(scraped, PLACEHOLDER);
        assert_eq!(records[0].images, PLACEHOLDER);
        assert_eq!(records[1].images, "https://img.example/b.jpg");
        assert!(records.iter().all(|r| !r.images.is_empty()));
    }

    // End-to-end over markup: a 3-row table whose middle row is
    // malformed, with a footnoted capacity on the first row.
    const PAGE: &str = r#"<html><body>
<table><tr><th>x</th></tr></table>
<table><tr><th>y</th></tr></table>
<table>
  <tr><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th></tr>
  <tr><td>Alpha Arena</td><td>1,234[note]</td><td>Europe</td><td>Utopia</td><td>Alphaville</td><td></td><td>Alpha FC</td></tr>
  <tr><td>Broken</td><td>1</td><td>Europe</td><td>Utopia</td><td>Nowhere</td></tr>
  <tr><td>Gamma Ground</td><td>45,000</td><td>Europe</td><td>Utopia</td><td>Gammaton</td><td><img src="//img.example/g.png"/></td><td>Gamma FC</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_extract_transform_end_to_end() {
        let scraped = extract_stadiums(PAGE, 2).unwrap();
        assert_eq!(scraped.len(), 2);

        let stub = Stub::new(&[("Alpha Arena", "Utopia", 1.0, 2.0)]);
        let records = transform_batch(scraped, Some(&stub), PLACEHOLDER);

        let ranks: Vec<u32> = records.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 3]);

        assert_eq!(records[0].capacity, Some(1234));
        assert_eq!(records[1].capacity, Some(45000));

        assert_eq!(records[0].images, PLACEHOLDER);
        assert_eq!(records[1].images, "https://img.example/g.png");

        assert_eq!(records[0].location, Some(GeoPoint { lat: 1.0, lng: 2.0 }));
        assert_eq!(records[1].location, None);
    }
}
