//! Reading the raw inputs and writing the JSON artifacts of a data directory.
//!
//! ## Inputs
//!
//! - `glottolog_latlng.txt`   — grep log over the Glottolog tree
//! - `common_glottocodes.txt` — one Glottocode per line
//! - `phoible.csv`            — PHOIBLE inventory table
//! - `phoneme_filter.json`    — `{ "<category>": ["<symbol>", ...] }`
//!
//! ## Outputs
//!
//! - `glottolog_latlng.json`          — id → `{attributes..., ancestors}`
//! - `glottolog_latlng_filtered.json` — same, restricted to the allow-list
//! - `phoneme_latlng.json`            — symbol → `[[lat, lng], ...]`
//! - `phoneme_coords.json`            — symbol → `[[x, y], ...]`

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::{Glottocode, LatLng, PhonemeCoords, PhonemeIndex, PrepError};
use crate::glottolog::parse_allow_list;
use crate::phoible::{InventoryColumns, InventoryRows, read_inventory_rows};
use crate::pipeline::PhonemeFilter;

pub const GLOTTOLOG_DUMP: &str = "glottolog_latlng.txt";
pub const ALLOWED_CODES: &str = "common_glottocodes.txt";
pub const PHOIBLE_TABLE: &str = "phoible.csv";
pub const PHONEME_FILTER: &str = "phoneme_filter.json";

pub const GLOTTOLOG_JSON: &str = "glottolog_latlng.json";
pub const GLOTTOLOG_FILTERED_JSON: &str = "glottolog_latlng_filtered.json";
pub const PHONEME_LATLNG_JSON: &str = "phoneme_latlng.json";
pub const PHONEME_COORDS_JSON: &str = "phoneme_coords.json";

pub fn read_text(path: &Path) -> Result<String, PrepError> {
    fs::read_to_string(path).map_err(|e| PrepError::io(path, e))
}

pub fn read_allow_list(path: &Path) -> Result<HashSet<Glottocode>, PrepError> {
    Ok(parse_allow_list(&read_text(path)?))
}

pub fn read_inventory(path: &Path, columns: &InventoryColumns) -> Result<InventoryRows, PrepError> {
    let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
    read_inventory_rows(BufReader::new(file), columns)
}

pub fn read_filter(path: &Path) -> Result<PhonemeFilter, PrepError> {
    PhonemeFilter::from_json(&read_text(path)?)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PrepError> {
    let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes `value` as compact JSON, replacing any previous file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PrepError> {
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer(&mut w, value)?;
    w.flush().map_err(|e| PrepError::io(path, e))?;
    Ok(())
}

pub fn read_coords(path: &Path) -> Result<PhonemeCoords, PrepError> {
    read_json(path)
}

/// Symbol → joined positions, the on-disk form of a [`PhonemeIndex`].
pub fn phoneme_latlngs(phonemes: &PhonemeIndex) -> BTreeMap<&str, &BTreeSet<LatLng>> {
    phonemes
        .iter()
        .map(|(symbol, record)| (symbol.as_str(), &record.coordinates))
        .collect()
}

/// File locations of one run.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let output_dir = output_dir.unwrap_or_else(|| data_dir.clone());
        Self {
            data_dir,
            output_dir,
        }
    }

    pub fn input(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}
