use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

mod clean;
mod errors;
mod extract;
mod geocode;
mod load;
mod transform;
mod types;

use geocode::{Geocoder, OpenCage};

pub const WIKIPEDIA_URL: &str =
    "https://en.wikipedia.org/wiki/List_of_association_football_stadiums_by_capacity";

/// Placeholder shown for stadiums whose table row carries no image.
pub const NO_IMAGE_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/0/0a/No-image-available.png/480px-No-image-available.png";

/// Document-order position of the capacity table on the source page.
/// Brittle by nature; when the page layout changes, this default is the
/// only thing that should need touching.
pub const STADIUM_TABLE_INDEX: usize = 2;

const RAW_PAYLOAD: &str = "data/batch.json";
const ENRICHED_PAYLOAD: &str = "data/batch_enriched.json";
const DEFAULT_DB: &str = "stadiums.db";
const DEFAULT_OUT_DIR: &str = "data";

#[derive(Parser)]
#[command(name = "wiki-stadiums")]
#[command(about = "Football stadium table scraper and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the stadium table and write the raw batch payload
    Extract {
        /// Source page address
        #[arg(long, default_value = WIKIPEDIA_URL)]
        url: String,
        /// Zero-based position of the stadium table in the document
        #[arg(long, default_value_t = STADIUM_TABLE_INDEX)]
        table_index: usize,
        /// Raw batch payload file handed to `transform`
        #[arg(long, default_value = RAW_PAYLOAD)]
        payload: String,
    },
    /// Coerce capacities, substitute image placeholders, add coordinates
    Transform {
        /// Raw batch payload written by `extract`
        #[arg(long, default_value = RAW_PAYLOAD)]
        payload: String,
        /// Enriched batch payload handed to `write` and `load`
        #[arg(long, default_value = ENRICHED_PAYLOAD)]
        out: String,
        /// Skip geocoding entirely (locations stay empty)
        #[arg(long)]
        skip_geo: bool,
        /// Placeholder URL for records without an image
        #[arg(long, default_value = NO_IMAGE_URL)]
        no_image_url: String,
    },
    /// Write the enriched batch to a timestamped CSV (and the object
    /// store, when configured)
    Write {
        #[arg(long, default_value = ENRICHED_PAYLOAD)]
        payload: String,
        /// Output directory for the CSV export
        #[arg(long, default_value = DEFAULT_OUT_DIR)]
        dir: String,
    },
    /// Load the enriched batch into the SQLite sink
    Load {
        #[arg(long, default_value = ENRICHED_PAYLOAD)]
        payload: String,
        /// SQLite database file
        #[arg(long, default_value = DEFAULT_DB)]
        db: String,
    },
    /// Run extract, transform and both sinks in one process
    Run {
        #[arg(long, default_value = WIKIPEDIA_URL)]
        url: String,
        #[arg(long, default_value_t = STADIUM_TABLE_INDEX)]
        table_index: usize,
        #[arg(long)]
        skip_geo: bool,
        #[arg(long, default_value = NO_IMAGE_URL)]
        no_image_url: String,
        #[arg(long, default_value = DEFAULT_OUT_DIR)]
        dir: String,
        #[arg(long, default_value = DEFAULT_DB)]
        db: String,
    },
    /// Remove generated files (data/ and the SQLite database)
    Clean,
}

/// Whole pipeline in one process: stages hand each other explicit batch
/// values, no payload files involved.
fn run_pipeline(
    url: &str,
    table_index: usize,
    skip_geo: bool,
    no_image_url: &str,
    dir: &str,
    db: &str,
) -> Result<()> {
    let client = extract::http_client()?;
    println!("Fetching stadium table from {url}");
    let html = extract::fetch_page(&client, url)?;
    let scraped = extract::extract_stadiums(&html, table_index)?;
    println!("Extracted {} records", scraped.len());

    let geocoder = if skip_geo {
        None
    } else {
        Some(OpenCage::from_env()?)
    };
    let records = transform::transform_batch(
        scraped,
        geocoder.as_ref().map(|g| g as &dyn Geocoder),
        no_image_url,
    );

    // Sinks fan out after transform; one failing must not keep the
    // other from running.
    let mut first_failure = None;
    if let Err(err) = load::write_sinks(&records, Path::new(dir)) {
        eprintln!("file sink failed: {err:#}");
        first_failure.get_or_insert(err);
    }
    if let Err(err) = load::load_sqlite(&records, db) {
        eprintln!("database sink failed: {err:#}");
        first_failure.get_or_insert(err);
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_clean() -> Result<()> {
    println!("Cleaning generated files...");

    let db_path = Path::new(DEFAULT_DB);
    if db_path.exists() {
        fs::remove_file(db_path)?;
        println!("  Removed {DEFAULT_DB}");
    }

    let data_path = Path::new("data");
    if data_path.exists() {
        fs::remove_dir_all(data_path)?;
        println!("  Removed data/");
    }

    println!("Clean complete!");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            url,
            table_index,
            payload,
        } => extract::run_extract(&url, table_index, &payload),
        Commands::Transform {
            payload,
            out,
            skip_geo,
            no_image_url,
        } => transform::run_transform(&payload, &out, skip_geo, &no_image_url),
        Commands::Write { payload, dir } => load::run_write(&payload, &dir),
        Commands::Load { payload, db } => load::run_load(&payload, &db),
        Commands::Run {
            url,
            table_index,
            skip_geo,
            no_image_url,
            dir,
            db,
        } => run_pipeline(&url, table_index, skip_geo, &no_image_url, &dir, &db),
        Commands::Clean => run_clean(),
    }
}
