//! Preprocessor binary: turns the raw Glottolog and PHOIBLE exports into the
//! phoneme → map-cell table rendered by the front end.
//!
//! ## Input
//!
//! A data directory containing:
//! - `glottolog_latlng.txt`   — grep log over the Glottolog tree, taken with
//!   `grep -r "longitude =\|latitude =\|iso639-3 =\|level =" . | sort`
//! - `common_glottocodes.txt` — Glottocodes to keep, one per line
//! - `phoible.csv`            — the PHOIBLE inventory table
//! - `phoneme_filter.json`    — curated phonemes, grouped by category
//!
//! ## Output
//!
//! Written to `--output-dir` (defaults to the data directory), replacing any
//! previous run:
//! - `glottolog_latlng.json`          — every classification node with ancestors
//! - `glottolog_latlng_filtered.json` — the nodes named in the allow-list
//! - `phoneme_latlng.json`            — phoneme → located languages
//! - `phoneme_coords.json`            — phoneme → `[x, y]` map cells
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin preprocess -- --data-dir data
//! cargo run --release --bin preprocess -- --data-dir data --map-width 240 --map-height 120
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use tracing::{info, warn};

use langmap::common::{
    DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH, DEFAULT_MAX_LATITUDE, DEFAULT_MIN_LATITUDE,
    DEFAULT_START_LONGITUDE, ProjectionConfig,
};
use langmap::glottolog::DumpFormat;
use langmap::io::*;
use langmap::phoible::InventoryColumns;
use langmap::pipeline::{PipelineInputs, prepare_with_progress};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(about = "Project PHOIBLE phonemes onto map cells via Glottolog coordinates")]
struct Args {
    /// Directory holding the raw inputs.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Where to write the JSON artifacts. Defaults to the data directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Map width in cells.
    #[arg(long, default_value_t = DEFAULT_MAP_WIDTH)]
    map_width: u32,

    /// Map height in cells.
    #[arg(long, default_value_t = DEFAULT_MAP_HEIGHT)]
    map_height: u32,

    /// Longitude (degrees) drawn in the leftmost column.
    #[arg(long, default_value_t = DEFAULT_START_LONGITUDE, allow_hyphen_values = true)]
    start_longitude: f64,

    /// Southern latitude bound (degrees); anything further south is clamped.
    #[arg(long, default_value_t = DEFAULT_MIN_LATITUDE, allow_hyphen_values = true)]
    min_latitude: f64,

    /// Northern latitude bound (degrees); anything further north is clamped.
    #[arg(long, default_value_t = DEFAULT_MAX_LATITUDE, allow_hyphen_values = true)]
    max_latitude: f64,

    /// Name of the phoneme column in the inventory table.
    #[arg(long, default_value = "Phoneme")]
    phoneme_column: String,

    /// Name of the Glottocode column in the inventory table.
    #[arg(long, default_value = "Glottocode")]
    glottocode_column: String,
}

impl Args {
    fn projection_config(&self) -> ProjectionConfig {
        ProjectionConfig {
            map_width: self.map_width,
            map_height: self.map_height,
            start_longitude: self.start_longitude,
            min_latitude: self.min_latitude,
            max_latitude: self.max_latitude,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let paths = DataPaths::new(&args.data_dir, args.output_dir.clone());
    let config = args.projection_config();
    // Fail on a bad config before reading anything.
    config.validate()?;

    info!("Data:   {}", paths.data_dir.display());
    info!("Output: {}", paths.output_dir.display());
    info!(
        "Map:    {}x{} cells, start longitude {}, latitude [{}, {}]",
        config.map_width,
        config.map_height,
        config.start_longitude,
        config.min_latitude,
        config.max_latitude
    );
    std::fs::create_dir_all(&paths.output_dir)
        .map_err(|e| langmap::common::PrepError::io(&paths.output_dir, e))?;

    let pipeline_start = Instant::now();

    // ── Step 1: Read the inputs ─────────────────────────────────────────
    info!("Step 1: Reading inputs...");
    let dump = read_text(&paths.input(GLOTTOLOG_DUMP))?;
    let columns = InventoryColumns {
        phoneme: args.phoneme_column.clone(),
        identifier: args.glottocode_column.clone(),
    };
    let inventory = read_inventory(&paths.input(PHOIBLE_TABLE), &columns)?;
    if inventory.skipped > 0 {
        warn!(
            "  Skipped {} inventory rows without phoneme or Glottocode",
            inventory.skipped
        );
    }
    let inputs = PipelineInputs {
        dump_lines: dump.lines().collect(),
        dump_format: DumpFormat::default(),
        allowed_codes: read_allow_list(&paths.input(ALLOWED_CODES))?,
        inventory: inventory.rows,
        filter: read_filter(&paths.input(PHONEME_FILTER))?,
    };
    info!(
        "  {} dump lines, {} allowed codes, {} inventory rows",
        HumanCount(inputs.dump_lines.len() as u64),
        HumanCount(inputs.allowed_codes.len() as u64),
        HumanCount(inputs.inventory.len() as u64)
    );

    // ── Step 2: Parse, filter, join and project ─────────────────────────
    info!("Step 2: Running pipeline...");
    let pb = ProgressBar::new(inputs.retained_phonemes() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "  Projecting {bar:40.cyan/blue} {pos}/{len} phonemes [{elapsed_precise}] {msg}",
        )?
        .progress_chars("##-"),
    );
    let artifacts = prepare_with_progress(&inputs, config, |symbol| {
        pb.set_message(symbol.to_string());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    let d = &artifacts.report.diagnostics;
    info!(
        "  {} phonemes, {} cells ({} positions merged into shared cells)",
        d.phonemes_retained,
        HumanCount(d.points as u64),
        HumanCount(d.collapsed as u64)
    );
    if d.phonemes_empty > 0 {
        warn!("  {} phonemes have no located languages", d.phonemes_empty);
    }

    // ── Step 3: Write the artifacts ─────────────────────────────────────
    info!("Step 3: Writing artifacts...");
    write_json(&paths.output(GLOTTOLOG_JSON), &artifacts.geo_records)?;
    write_json(&paths.output(GLOTTOLOG_FILTERED_JSON), &artifacts.filtered_records)?;
    write_json(
        &paths.output(PHONEME_LATLNG_JSON),
        &phoneme_latlngs(&artifacts.phonemes),
    )?;
    write_json(&paths.output(PHONEME_COORDS_JSON), &artifacts.coordinates)?;

    artifacts.report.log_warnings();

    info!(
        "Wrote {} in {}",
        paths.output(PHONEME_COORDS_JSON).display(),
        HumanDuration(pipeline_start.elapsed())
    );
    Ok(())
}
