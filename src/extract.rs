//! Extract stage: fetch the source page, locate the stadium table, and
//! build the raw record batch.

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;

use crate::clean::clean_text;
use crate::errors::{MalformedRow, PipelineError};
use crate::types::{write_payload, ScrapedStadium, NO_IMAGE_SENTINEL};

/// Column count the record layout needs; rows with fewer cells are
/// dropped from the batch.
pub const MIN_CELLS: usize = 7;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; WikiStadiumsPipeline/1.0)";
const TIMEOUT_SECS: u64 = 10;

/// One `<td>` of a table row: its flattened text plus the `src` of an
/// embedded `<img>`, if any.
#[derive(Debug, Clone)]
pub struct RawCell {
    pub text: String,
    pub image: Option<String>,
}

pub fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")
}

/// Fetch the raw markup of `url`. No retries; the orchestrator owns
/// retry policy.
pub fn fetch_page(client: &reqwest::blocking::Client, url: &str) -> Result<String, PipelineError> {
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(|source| PipelineError::Fetch {
            url: url.to_string(),
            source,
        })
}

/// Locate the table at `table_index` (document order, zero-based) and
/// return its data rows, header excluded.
///
/// The position is the one structural assumption made about the page;
/// it is injected rather than hardcoded at the call sites so a source
/// layout change stays a one-line fix.
pub fn table_rows(html: &str, table_index: usize) -> Result<Vec<Vec<RawCell>>, PipelineError> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").unwrap();
    let tr_selector = Selector::parse("tr").unwrap();
    let td_selector = Selector::parse("td").unwrap();
    let img_selector = Selector::parse("img").unwrap();

    let tables: Vec<_> = document.select(&table_selector).collect();
    let table = tables.get(table_index).ok_or_else(|| {
        PipelineError::Parse(format!(
            "document has {} tables, wanted index {}",
            tables.len(),
            table_index
        ))
    })?;

    let rows = table
        .select(&tr_selector)
        .skip(1) // header row
        .map(|tr| {
            tr.select(&td_selector)
                .map(|td| RawCell {
                    text: td.text().collect::<String>(),
                    image: td
                        .select(&img_selector)
                        .next()
                        .and_then(|img| img.value().attr("src"))
                        .map(str::to_string),
                })
                .collect()
        })
        .collect();

    Ok(rows)
}

/// Assemble parsed rows into records. The row at 1-based position i
/// gets rank i; malformed rows are reported and dropped, so surviving
/// records keep their original position ranks.
pub fn build_records(rows: Vec<Vec<RawCell>>) -> Vec<ScrapedStadium> {
    let mut records = Vec::with_capacity(rows.len());

    for (i, cells) in rows.into_iter().enumerate() {
        let rank = i + 1;
        if cells.len() < MIN_CELLS {
            let err = MalformedRow {
                row: rank,
                found: cells.len(),
                expected: MIN_CELLS,
            };
            eprintln!("  skipping row: {err}");
            continue;
        }

        // Thousands separators come off the capacity text here; the
        // coercion to an integer happens in the transform stage, after
        // the batch has crossed the payload boundary.
        let capacity = clean_text(&cells[1].text).replace(',', "").replace('.', "");

        let images = match cells[5].image.as_deref() {
            Some(src) => match src.split_once("//") {
                // Protocol-relative (or scheme-carrying) src: keep the
                // path and force a secure scheme.
                Some((_, rest)) => format!("https://{rest}"),
                None => format!("https://{}", src.trim_start_matches('/')),
            },
            None => NO_IMAGE_SENTINEL.to_string(),
        };

        records.push(ScrapedStadium {
            rank: rank as u32,
            stadium: clean_text(&cells[0].text),
            capacity,
            region: clean_text(&cells[2].text),
            country: clean_text(&cells[3].text),
            city: clean_text(&cells[4].text),
            images,
            home_team: clean_text(&cells[6].text),
        });
    }

    records
}

/// Parse + build in one step.
pub fn extract_stadiums(
    html: &str,
    table_index: usize,
) -> Result<Vec<ScrapedStadium>, PipelineError> {
    Ok(build_records(table_rows(html, table_index)?))
}

/// Raw CSV snapshot of the extracted batch, written alongside the
/// payload before any enrichment has run.
pub fn write_raw_csv(records: &[ScrapedStadium], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("stadiums.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn run_extract(url: &str, table_index: usize, payload: &str) -> Result<()> {
    let client = http_client()?;
    println!("Fetching stadium table from {url}");
    let html = fetch_page(&client, url)?;

    let records = extract_stadiums(&html, table_index)?;
    println!("Extracted {} records", records.len());

    write_raw_csv(&records, Path::new("data"))?;
    write_payload(Path::new(payload), &records)?;
    println!("Wrote raw batch to {payload}");
    Ok(())
}
