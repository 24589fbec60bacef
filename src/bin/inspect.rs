//! Inspect a written `phoneme_coords.json`: per-phoneme cell counts, category
//! totals and the overall extents, in a human-readable format.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --coords data/phoneme_coords.json
//! cargo run --release --bin inspect -- --coords data/phoneme_coords.json --filter data/phoneme_filter.json
//! ```

use std::path::PathBuf;

use clap::Parser;
use langmap::common::PixelExtents;
use langmap::io::{read_coords, read_filter};

#[derive(Parser, Debug)]
#[command(about = "Inspect a phoneme → map-cell table")]
struct Args {
    /// Path to the `phoneme_coords.json` artifact.
    #[arg(long)]
    coords: PathBuf,

    /// Phoneme filter used for the run; enables per-category totals.
    #[arg(long)]
    filter: Option<PathBuf>,

    /// Number of phonemes to list, most widespread first (0 lists all).
    #[arg(long, default_value_t = 20)]
    top: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let coords = read_coords(&args.coords)?;

    let total_cells: usize = coords.values().map(|c| c.len()).sum();
    let empty = coords.values().filter(|c| c.is_empty()).count();

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Coords: {}", args.coords.display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Phonemes:   {:>10}", coords.len());
    println!("║  Empty:      {empty:>10}");
    println!("║  Cells:      {total_cells:>10}");
    match PixelExtents::from_points(coords.values().flatten()) {
        Some(e) => {
            println!("║  x range:    {:>4} .. {:<4}", e.min_x, e.max_x);
            println!("║  y range:    {:>4} .. {:<4}", e.min_y, e.max_y);
        }
        None => println!("║  x/y range:  (no cells)"),
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Phonemes ─────────────────────────────────────────────────────────
    let mut ranked: Vec<(&String, usize)> = coords.iter().map(|(s, c)| (s, c.len())).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let shown = if args.top == 0 { ranked.len() } else { args.top.min(ranked.len()) };
    println!("Phonemes by cell count ({shown} of {}):", ranked.len());
    for (symbol, n) in &ranked[..shown] {
        println!("  {symbol:<8} {n:>6}");
    }

    // ── Categories ───────────────────────────────────────────────────────
    if let Some(filter_path) = &args.filter {
        let filter = read_filter(filter_path)?;
        println!();
        println!("Categories:");
        for (category, symbols) in filter.categories() {
            let present = symbols.iter().filter(|s| coords.contains_key(*s)).count();
            let cells: usize = symbols
                .iter()
                .filter_map(|s| coords.get(s))
                .map(|c| c.len())
                .sum();
            println!(
                "  {category:<20} {present:>3}/{:<3} phonemes {cells:>8} cells",
                symbols.len()
            );
        }
    }

    Ok(())
}
