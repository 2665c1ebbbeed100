//! Load stage: CSV, object-store, and relational sinks. Each sink
//! consumes the enriched batch independently; a failing sink never
//! corrupts what a sibling already wrote.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rusqlite::Connection;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::extract::http_client;
use crate::types::{read_payload, GeoPoint, StadiumRecord};

const CSV_HEADER: [&str; 9] = [
    "rank", "stadium", "capacity", "region", "country", "city", "images", "home_team", "location",
];

/// File name carrying the run timestamp, so re-runs never overwrite an
/// earlier export.
fn run_file_name(now: DateTime<Local>) -> String {
    format!(
        "stadium_cleaned_{}_{}.csv",
        now.format("%Y-%m-%d"),
        now.format("%H_%M_%S")
    )
}

fn write_csv_to<W: Write>(records: &[StadiumRecord], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for r in records {
        writer.write_record(&[
            r.rank.to_string(),
            r.stadium.clone(),
            r.capacity.map(|c| c.to_string()).unwrap_or_default(),
            r.region.clone(),
            r.country.clone(),
            r.city.clone(),
            r.images.clone(),
            r.home_team.clone(),
            r.location.map(GeoPoint::to_inline).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the enriched batch to a freshly timestamped CSV under `dir`.
pub fn write_csv(records: &[StadiumRecord], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(run_file_name(Local::now()));
    let file =
        fs::File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    write_csv_to(records, file)?;
    Ok(path)
}

/// Object-store target, configured entirely from the environment.
/// `STADIUM_STORE_URL` unset means the upload sink is simply off.
pub struct ObjectStore {
    pub endpoint: String,
    pub token: String,
}

impl ObjectStore {
    pub fn from_env() -> Result<Option<Self>> {
        let endpoint = match std::env::var("STADIUM_STORE_URL") {
            Ok(endpoint) => endpoint,
            Err(_) => return Ok(None),
        };
        let token = std::env::var("STADIUM_STORE_TOKEN")
            .context("STADIUM_STORE_TOKEN must be set when STADIUM_STORE_URL is")?;
        Ok(Some(Self { endpoint, token }))
    }
}

/// Upload an already-written CSV to the object store under its own
/// file name.
pub fn upload_csv(
    client: &reqwest::blocking::Client,
    store: &ObjectStore,
    path: &Path,
) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("CSV path has no file name")?;
    let url = format!("{}/{}", store.endpoint.trim_end_matches('/'), name);
    let body = fs::read(path)?;

    client
        .put(&url)
        .bearer_auth(&store.token)
        .header(reqwest::header::CONTENT_TYPE, "text/csv")
        .body(body)
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("failed to upload {name}"))?;

    Ok(url)
}

pub fn init_database(conn: &Connection) -> Result<()> {
    let schema = include_str!("../schema.sql");
    conn.execute_batch(schema)?;
    Ok(())
}

fn insert_batch(conn: &mut Connection, records: &[StadiumRecord]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO stadiums (rank, stadium, capacity, region, country, city, images, home_team, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for r in records {
            stmt.execute((
                r.rank,
                &r.stadium,
                r.capacity,
                &r.region,
                &r.country,
                &r.city,
                &r.images,
                &r.home_team,
                r.location.map(GeoPoint::to_array_text),
            ))?;
        }
    }
    // Any insert error above unwinds before this point and the dropped
    // transaction rolls the whole batch back.
    tx.commit()?;
    Ok(())
}

/// Append the batch to the relational sink, creating the table first if
/// this is a fresh database.
pub fn load_sqlite(records: &[StadiumRecord], db_path: &str) -> Result<()> {
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("failed to open database {db_path}"))?;
    init_database(&conn)?;
    insert_batch(&mut conn, records)?;
    println!("Loaded {} records into {db_path}", records.len());
    Ok(())
}

/// CSV sink plus the optional object-store upload.
pub fn write_sinks(records: &[StadiumRecord], dir: &Path) -> Result<()> {
    let path = write_csv(records, dir)?;
    println!("Wrote {} records to {}", records.len(), path.display());

    match ObjectStore::from_env()? {
        Some(store) => {
            let client = http_client()?;
            let url = upload_csv(&client, &store, &path)?;
            println!("Uploaded to {url}");
        }
        None => println!("Object store not configured, skipping upload (set STADIUM_STORE_URL)"),
    }
    Ok(())
}

pub fn run_write(payload: &str, dir: &str) -> Result<()> {
    let records: Vec<StadiumRecord> = read_payload(Path::new(payload))?;
    write_sinks(&records, Path::new(dir))
}

pub fn run_load(payload: &str, db_path: &str) -> Result<()> {
    let records: Vec<StadiumRecord> = read_payload(Path::new(payload))?;
    load_sqlite(&records, db_path)
}
