//! PHOIBLE phoneme inventories and their join against Glottolog geography.

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{
    ATTR_LATITUDE, ATTR_LONGITUDE, GeoIndex, GeoRecord, Glottocode, LatLng, PhonemeIndex,
    PhonemeRecord, PrepError,
};

// ============================================================================
// Inventory loading
// ============================================================================

/// Header names of the two columns the loader needs. Every other column of
/// the table is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryColumns {
    pub phoneme: String,
    pub identifier: String,
}

impl Default for InventoryColumns {
    fn default() -> Self {
        Self {
            phoneme: "Phoneme".to_string(),
            identifier: "Glottocode".to_string(),
        }
    }
}

/// A (phoneme, Glottocode) pair taken from one table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub phoneme: String,
    pub glottocode: Glottocode,
}

impl InventoryRow {
    pub fn new(phoneme: impl Into<String>, glottocode: impl Into<String>) -> Self {
        Self {
            phoneme: phoneme.into(),
            glottocode: Glottocode::new(glottocode),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InventoryRows {
    pub rows: Vec<InventoryRow>,
    /// Rows with an empty phoneme or identifier cell.
    pub skipped: usize,
}

/// Reads the (phoneme, identifier) pairs out of a CSV table with headers.
pub fn read_inventory_rows<R: Read>(
    reader: R,
    columns: &InventoryColumns,
) -> Result<InventoryRows, PrepError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PrepError::MissingColumn(name.to_string()))
    };
    let phoneme_idx = position(&columns.phoneme)?;
    let identifier_idx = position(&columns.identifier)?;

    let mut out = InventoryRows::default();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let phoneme = record.get(phoneme_idx).map(str::trim).unwrap_or("");
        let identifier = record.get(identifier_idx).map(str::trim).unwrap_or("");
        if phoneme.is_empty() || identifier.is_empty() {
            debug!("Skipping inventory row {}: missing phoneme or identifier", idx + 1);
            out.skipped += 1;
            continue;
        }
        out.rows.push(InventoryRow::new(phoneme, identifier));
    }
    Ok(out)
}

/// Groups rows by phoneme. The same Glottocode listed twice for a phoneme is
/// a single set member.
pub fn build_inventory<'a>(rows: impl IntoIterator<Item = &'a InventoryRow>) -> PhonemeIndex {
    let mut index = PhonemeIndex::new();
    for row in rows {
        index
            .entry(row.phoneme.clone())
            .or_insert_with(|| PhonemeRecord::new(row.phoneme.clone()))
            .identifiers
            .insert(row.glottocode.clone());
    }
    index
}

// ============================================================================
// Geo join
// ============================================================================

fn parse_degrees(
    record: &GeoRecord,
    attribute: &'static str,
    raw: &str,
) -> Result<f64, PrepError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PrepError::InvalidNumber {
            glottocode: record.id.clone(),
            attribute,
            value: raw.to_string(),
        })
}

/// Position of a record, or `None` if it carries no latitude (dialects and
/// families). A latitude without longitude, or a value that is not a finite
/// number, means the dump is corrupt.
pub fn record_position(record: &GeoRecord) -> Result<Option<LatLng>, PrepError> {
    let Some(raw_lat) = record.attribute(ATTR_LATITUDE) else {
        return Ok(None);
    };
    let raw_lng = record
        .attribute(ATTR_LONGITUDE)
        .ok_or_else(|| PrepError::MissingLongitude(record.id.clone()))?;
    let lat = parse_degrees(record, ATTR_LATITUDE, raw_lat)?;
    let lng = parse_degrees(record, ATTR_LONGITUDE, raw_lng)?;
    Ok(Some(LatLng::new(lat, lng)))
}

/// Checks the coordinates of every record in `geo`, whether or not a phoneme
/// refers to it. Returns the number of located records.
pub fn check_geography(geo: &GeoIndex) -> Result<usize, PrepError> {
    let mut located = 0;
    for record in geo.values() {
        if record_position(record)?.is_some() {
            located += 1;
        }
    }
    Ok(located)
}

impl PhonemeRecord {
    /// Replaces `coordinates` with the positions of every identifier that
    /// `geo` knows and that has geography. Identifiers missing from `geo` are
    /// skipped. Returns the number of positions.
    pub fn locate(&mut self, geo: &GeoIndex) -> Result<usize, PrepError> {
        let mut coordinates = std::collections::BTreeSet::new();
        for code in &self.identifiers {
            let Some(record) = geo.get(code) else {
                continue;
            };
            if let Some(position) = record_position(record)? {
                coordinates.insert(position);
            }
        }
        self.coordinates = coordinates;
        Ok(self.coordinates.len())
    }
}

/// Joins every phoneme against `geo`. Re-running the join on the same index
/// yields the same coordinates.
pub fn join_geography(phonemes: &mut PhonemeIndex, geo: &GeoIndex) -> Result<(), PrepError> {
    for record in phonemes.values_mut() {
        let located = record.locate(geo)?;
        debug!(
            "{}: {} of {} identifiers located",
            record.symbol,
            located,
            record.identifiers.len()
        );
    }
    Ok(())
}
