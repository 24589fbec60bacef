//! Stage orchestration: dump → records → filtered records → phoneme
//! inventory → geography → raster cells.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use indicatif::HumanCount;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::common::{
    GeoIndex, Glottocode, PhonemeCoords, PhonemeIndex, PixelExtents, PixelPoint, PrepError,
    ProjectionConfig,
};
use crate::glottolog::{DumpFormat, LeafCollision, filter_codes, parse_dump};
use crate::phoible::{InventoryRow, build_inventory, check_geography, join_geography};
use crate::projection::MapProjector;

// ============================================================================
// Phoneme filter
// ============================================================================

/// Curated phoneme subset, grouped by category (e.g. "plosives", "vowels").
/// Category order is kept as written in the source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhonemeFilter(pub IndexMap<String, Vec<String>>);

impl PhonemeFilter {
    pub fn from_json(text: &str) -> Result<Self, PrepError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Every symbol across all categories.
    pub fn allow_list(&self) -> HashSet<&str> {
        self.0.values().flatten().map(String::as_str).collect()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// ============================================================================
// Projection stage
// ============================================================================

/// Summary of one projection run. Formatting is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Phonemes that are both in the filter and in the inventory.
    pub phonemes_retained: usize,
    /// Retained phonemes without a single located language.
    pub phonemes_empty: usize,
    /// Sum of per-phoneme distinct cells.
    pub points: usize,
    /// Coordinates that landed on a cell the phoneme already had.
    pub collapsed: usize,
    /// Filter symbols the inventory never mentions.
    pub missing_from_data: Vec<String>,
    /// `None` when nothing at all was projected.
    pub extents: Option<PixelExtents>,
}

#[derive(Debug, Clone)]
pub struct ProjectionOutput {
    pub coordinates: PhonemeCoords,
    pub diagnostics: Diagnostics,
}

pub struct ProjectionPipeline {
    projector: MapProjector,
}

impl ProjectionPipeline {
    pub fn new(config: ProjectionConfig) -> Result<Self, PrepError> {
        Ok(Self {
            projector: MapProjector::new(config)?,
        })
    }

    /// Projects the coordinates of every phoneme in `filter`. Phonemes absent
    /// from the filter never reach the output.
    pub fn run(&self, phonemes: &PhonemeIndex, filter: &PhonemeFilter) -> ProjectionOutput {
        self.run_with_progress(phonemes, filter, |_| {})
    }

    /// Same as [`run`](Self::run), calling `on_phoneme` after each retained
    /// phoneme is projected.
    pub fn run_with_progress(
        &self,
        phonemes: &PhonemeIndex,
        filter: &PhonemeFilter,
        mut on_phoneme: impl FnMut(&str),
    ) -> ProjectionOutput {
        let allowed = filter.allow_list();
        let mut coordinates = PhonemeCoords::new();
        let mut diagnostics = Diagnostics::default();

        for (symbol, record) in phonemes {
            if !allowed.contains(symbol.as_str()) {
                continue;
            }
            let cells: BTreeSet<PixelPoint> = record
                .coordinates
                .iter()
                .map(|&pos| self.projector.project_latlng(pos))
                .collect();

            diagnostics.phonemes_retained += 1;
            diagnostics.points += cells.len();
            diagnostics.collapsed += record.coordinates.len() - cells.len();
            if cells.is_empty() {
                diagnostics.phonemes_empty += 1;
            }
            coordinates.insert(symbol.clone(), cells);
            on_phoneme(symbol);
        }

        let mut missing: Vec<String> = allowed
            .into_iter()
            .filter(|s| !phonemes.contains_key(*s))
            .map(str::to_string)
            .collect();
        missing.sort();
        diagnostics.missing_from_data = missing;
        diagnostics.extents = PixelExtents::from_points(coordinates.values().flatten());

        ProjectionOutput {
            coordinates,
            diagnostics,
        }
    }
}

// ============================================================================
// Full run
// ============================================================================

/// Everything the pipeline consumes, already read into memory.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs<'a> {
    /// Raw grep-log lines of the classification dump.
    pub dump_lines: Vec<&'a str>,
    pub dump_format: DumpFormat,
    pub allowed_codes: HashSet<Glottocode>,
    pub inventory: Vec<InventoryRow>,
    pub filter: PhonemeFilter,
}

impl PipelineInputs<'_> {
    /// Filter symbols with at least one inventory row: how many phonemes the
    /// projection stage will visit.
    pub fn retained_phonemes(&self) -> usize {
        let present: HashSet<&str> = self.inventory.iter().map(|r| r.phoneme.as_str()).collect();
        self.filter
            .allow_list()
            .into_iter()
            .filter(|s| present.contains(s))
            .count()
    }
}

/// Data-integrity findings collected along the way.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub malformed_lines: usize,
    pub collisions: Vec<LeafCollision>,
    pub diagnostics: Diagnostics,
}

impl PipelineReport {
    /// Logs the findings that deserve attention.
    pub fn log_warnings(&self) {
        for c in &self.collisions {
            warn!(
                "Glottocode {} appears under two paths; kept {}, dropped {}",
                c.leaf, c.kept_path, c.dropped_path
            );
        }
        if !self.diagnostics.missing_from_data.is_empty() {
            warn!(
                "{} filter phonemes not found in inventory: {}",
                self.diagnostics.missing_from_data.len(),
                self.diagnostics.missing_from_data.join(" ")
            );
        }
        match self.diagnostics.extents {
            Some(e) => info!(
                "  x range: min={}, max={}; y range: min={}, max={}",
                e.min_x, e.max_x, e.min_y, e.max_y
            ),
            None => warn!("No coordinates projected; pixel extents are undefined"),
        }
    }
}

/// Every intermediate product of a run, in stage order.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub geo_records: GeoIndex,
    pub filtered_records: GeoIndex,
    pub phonemes: PhonemeIndex,
    pub coordinates: PhonemeCoords,
    pub report: PipelineReport,
}

/// Runs every stage in order.
pub fn prepare(inputs: &PipelineInputs<'_>, config: ProjectionConfig) -> Result<Artifacts, PrepError> {
    prepare_with_progress(inputs, config, |_| {})
}

/// Same as [`prepare`], calling `on_phoneme` as each retained phoneme is
/// projected.
pub fn prepare_with_progress(
    inputs: &PipelineInputs<'_>,
    config: ProjectionConfig,
    on_phoneme: impl FnMut(&str),
) -> Result<Artifacts, PrepError> {
    let pipeline = ProjectionPipeline::new(config)?;

    let parsed = parse_dump(inputs.dump_lines.iter().copied(), &inputs.dump_format);
    let filtered_records = filter_codes(&parsed.records, &inputs.allowed_codes);
    let located = check_geography(&filtered_records)?;
    info!(
        "Glottolog: {} records, {} after filtering by {} codes, {} located",
        HumanCount(parsed.records.len() as u64),
        HumanCount(filtered_records.len() as u64),
        HumanCount(inputs.allowed_codes.len() as u64),
        HumanCount(located as u64)
    );

    let mut phonemes = build_inventory(&inputs.inventory);
    join_geography(&mut phonemes, &filtered_records)?;
    info!(
        "Inventory: {} phonemes from {} rows",
        HumanCount(phonemes.len() as u64),
        HumanCount(inputs.inventory.len() as u64)
    );

    let output = pipeline.run_with_progress(&phonemes, &inputs.filter, on_phoneme);

    Ok(Artifacts {
        geo_records: parsed.records,
        filtered_records,
        phonemes,
        coordinates: output.coordinates,
        report: PipelineReport {
            malformed_lines: parsed.malformed_lines,
            collisions: parsed.collisions,
            diagnostics: output.diagnostics,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LatLng, PhonemeRecord};

    fn filter(json: &str) -> PhonemeFilter {
        PhonemeFilter::from_json(json).unwrap()
    }

    fn phoneme(symbol: &str, positions: &[(f64, f64)]) -> (String, PhonemeRecord) {
        let mut record = PhonemeRecord::new(symbol);
        for (i, &(lat, lng)) in positions.iter().enumerate() {
            record.identifiers.insert(Glottocode(format!("lang{i:04}")));
            record.coordinates.insert(LatLng::new(lat, lng));
        }
        (symbol.to_string(), record)
    }

    #[test]
    fn filter_flattens_categories_in_order() {
        let f = filter(r#"{"vowels": ["a", "i"], "stops": ["p", "a"]}"#);
        let categories: Vec<&str> = f.categories().map(|(c, _)| c).collect();
        assert_eq!(categories, vec!["vowels", "stops"]);
        let allowed = f.allow_list();
        assert_eq!(allowed.len(), 3);
        assert!(allowed.contains("p"));
    }

    #[test]
    fn end_to_end_single_language() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();

        let inputs = PipelineInputs {
            dump_lines: vec![
                "./languoids/tree/fam00001/md.ini:level = family",
                "./languoids/tree/fam00001/abcd1234/md.ini:latitude = 0",
                "./languoids/tree/fam00001/abcd1234/md.ini:longitude = -168.1098805",
                "./languoids/tree/fam00001/abcd1234/md.ini:level = language",
            ],
            allowed_codes: HashSet::from([Glottocode::from("abcd1234")]),
            inventory: vec![InventoryRow::new("p", "abcd1234")],
            filter: filter(r#"{"consonants": ["p"]}"#),
            ..Default::default()
        };
        let artifacts = prepare(&inputs, ProjectionConfig::default()).unwrap();

        assert_eq!(artifacts.geo_records.len(), 2);
        assert_eq!(artifacts.filtered_records.len(), 1);
        assert_eq!(
            serde_json::to_value(&artifacts.coordinates).unwrap(),
            serde_json::json!({"p": [[0, 30]]})
        );

        let d = &artifacts.report.diagnostics;
        assert_eq!(d.phonemes_retained, 1);
        assert_eq!(d.points, 1);
        assert_eq!(
            d.extents,
            Some(PixelExtents {
                min_x: 0,
                max_x: 0,
                min_y: 30,
                max_y: 30,
            })
        );
        artifacts.report.log_warnings();
    }

    #[test]
    fn unfiltered_phonemes_never_reach_the_output() {
        let phonemes: PhonemeIndex = [
            phoneme("p", &[(0.0, 0.0)]),
            phoneme("q", &[(10.0, 10.0)]),
            phoneme("ʔ", &[(20.0, 20.0)]),
        ]
        .into_iter()
        .collect();
        let pipeline = ProjectionPipeline::new(ProjectionConfig::default()).unwrap();
        let out = pipeline.run(&phonemes, &filter(r#"{"stops": ["p", "ʔ", "ts"]}"#));

        assert_eq!(out.coordinates.keys().collect::<Vec<_>>(), vec!["p", "ʔ"]);
        assert_eq!(out.diagnostics.missing_from_data, vec!["ts".to_string()]);
    }

    #[test]
    fn positions_in_the_same_cell_collapse() {
        let phonemes: PhonemeIndex = [phoneme("a", &[(11.0, 20.0), (11.2, 20.3), (-40.0, 100.0)])]
            .into_iter()
            .collect();
        let pipeline = ProjectionPipeline::new(ProjectionConfig::default()).unwrap();
        let out = pipeline.run(&phonemes, &filter(r#"{"v": ["a"]}"#));

        assert_eq!(out.coordinates["a"].len(), 2);
        assert_eq!(out.diagnostics.points, 2);
        assert_eq!(out.diagnostics.collapsed, 1);
    }

    #[test]
    fn empty_sets_leave_extents_undefined() {
        let phonemes: PhonemeIndex = [phoneme("a", &[]), phoneme("b", &[])].into_iter().collect();
        let pipeline = ProjectionPipeline::new(ProjectionConfig::default()).unwrap();
        let out = pipeline.run(&phonemes, &filter(r#"{"v": ["a", "b"]}"#));

        assert_eq!(out.coordinates.len(), 2);
        assert!(out.coordinates.values().all(BTreeSet::is_empty));
        assert_eq!(out.diagnostics.phonemes_empty, 2);
        assert_eq!(out.diagnostics.extents, None);
    }

    #[test]
    fn extents_skip_empty_phonemes() {
        let phonemes: PhonemeIndex = [
            phoneme("a", &[]),
            phoneme("b", &[(67.0, -168.1098805), (0.0, 11.8901195)]),
        ]
        .into_iter()
        .collect();
        let pipeline = ProjectionPipeline::new(ProjectionConfig::default()).unwrap();
        let out = pipeline.run(&phonemes, &filter(r#"{"v": ["a", "b"]}"#));
        assert_eq!(
            out.diagnostics.extents,
            Some(PixelExtents {
                min_x: 0,
                max_x: 60,
                min_y: 0,
                max_y: 30,
            })
        );
    }

    #[test]
    fn progress_callback_sees_each_retained_phoneme() {
        let phonemes: PhonemeIndex = [phoneme("a", &[(0.0, 0.0)]), phoneme("b", &[(1.0, 1.0)])]
            .into_iter()
            .collect();
        let pipeline = ProjectionPipeline::new(ProjectionConfig::default()).unwrap();
        let mut seen = Vec::new();
        pipeline.run_with_progress(&phonemes, &filter(r#"{"v": ["b"]}"#), |s| {
            seen.push(s.to_string())
        });
        assert_eq!(seen, vec!["b".to_string()]);
    }

    #[test]
    fn unreferenced_corrupt_record_aborts_the_run() {
        let inputs = PipelineInputs {
            dump_lines: vec![
                "abcd1234:latitude = 1",
                "abcd1234:longitude = 3",
                "zzzz9999:latitude = bogus",
            ],
            allowed_codes: HashSet::from([Glottocode::from("abcd1234"), Glottocode::from("zzzz9999")]),
            inventory: vec![InventoryRow::new("p", "abcd1234")],
            filter: filter(r#"{"c": ["p"]}"#),
            ..Default::default()
        };
        assert!(matches!(
            prepare(&inputs, ProjectionConfig::default()),
            Err(PrepError::InvalidNumber { ref glottocode, .. }) if glottocode.as_str() == "zzzz9999"
        ));

        // Outside the allow-list the record is never written, so it is not checked.
        let trimmed = PipelineInputs {
            allowed_codes: HashSet::from([Glottocode::from("abcd1234")]),
            ..inputs
        };
        assert!(prepare(&trimmed, ProjectionConfig::default()).is_ok());
    }

    #[test]
    fn retained_phonemes_counts_progress_steps() {
        let inputs = PipelineInputs {
            dump_lines: vec!["abcd1234:latitude = 1", "abcd1234:longitude = 3"],
            allowed_codes: HashSet::from([Glottocode::from("abcd1234")]),
            inventory: vec![
                InventoryRow::new("p", "abcd1234"),
                InventoryRow::new("p", "efgh5678"),
                InventoryRow::new("t", "abcd1234"),
                InventoryRow::new("k", "abcd1234"),
            ],
            filter: filter(r#"{"c": ["p", "t", "ts"]}"#),
            ..Default::default()
        };
        assert_eq!(inputs.retained_phonemes(), 2);

        let mut seen = 0;
        prepare_with_progress(&inputs, ProjectionConfig::default(), |_| seen += 1).unwrap();
        assert_eq!(seen, inputs.retained_phonemes());
    }

    #[test]
    fn corrupt_coordinates_abort_the_run() {
        let inputs = PipelineInputs {
            dump_lines: vec!["abcd1234:latitude = 1O.5", "abcd1234:longitude = 3"],
            allowed_codes: HashSet::from([Glottocode::from("abcd1234")]),
            inventory: vec![InventoryRow::new("p", "abcd1234")],
            filter: filter(r#"{"c": ["p"]}"#),
            ..Default::default()
        };
        assert!(matches!(
            prepare(&inputs, ProjectionConfig::default()),
            Err(PrepError::InvalidNumber { .. })
        ));
    }
}
