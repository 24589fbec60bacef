//! Glottolog classification dump → flat [`GeoRecord`]s.
//!
//! The dump is a grep log taken over the Glottolog `languoids/tree/` directory:
//!
//! ```text
//! ./languoids/tree/indo1319/.../stan1293/md.ini:latitude = 52.0
//! ```
//!
//! After [`DumpFormat::normalize`] strips the tree prefix and the `md.ini`
//! suffix, each line follows the grammar `<path>:<attribute> = <value>`, where
//! `<path>` is the `/`-separated chain of Glottocodes from the family root down
//! to the node the attribute belongs to.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::{GeoIndex, GeoRecord, Glottocode};

// ============================================================================
// Line grammar
// ============================================================================

/// Raw grep-log decoration around the tree path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpFormat {
    /// Stripped from the start of a line when present.
    pub prefix: String,
    /// Removed wherever it occurs (the per-node metadata file name).
    pub suffix: String,
}

impl Default for DumpFormat {
    fn default() -> Self {
        Self {
            prefix: "./languoids/tree/".to_string(),
            suffix: "/md.ini".to_string(),
        }
    }
}

impl DumpFormat {
    pub fn normalize<'a>(&self, line: &'a str) -> std::borrow::Cow<'a, str> {
        let line = line.strip_prefix(self.prefix.as_str()).unwrap_or(line);
        if !self.suffix.is_empty() && line.contains(self.suffix.as_str()) {
            line.replace(self.suffix.as_str(), "").trim().to_string().into()
        } else {
            line.trim().into()
        }
    }
}

/// One `<path>:<attribute> = <value>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLine<'a> {
    pub path: &'a str,
    pub attribute: &'a str,
    pub value: &'a str,
}

impl<'a> DumpLine<'a> {
    /// Splits on the first `:` and then on the first ` = `. Returns `None` when
    /// either separator is missing, any component is empty, or the path has an
    /// empty segment.
    pub fn parse(line: &'a str) -> Option<Self> {
        let (path, assignment) = line.split_once(':')?;
        let (attribute, value) = assignment.split_once(" = ")?;
        let (path, attribute, value) = (path.trim(), attribute.trim(), value.trim());
        if path.is_empty() || attribute.is_empty() || value.is_empty() {
            return None;
        }
        if path.split('/').any(str::is_empty) {
            return None;
        }
        Some(Self {
            path,
            attribute,
            value,
        })
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Two different tree paths ended in the same Glottocode. The later path wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCollision {
    pub leaf: Glottocode,
    pub kept_path: String,
    pub dropped_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDump {
    pub records: GeoIndex,
    pub malformed_lines: usize,
    pub collisions: Vec<LeafCollision>,
}

/// Parses already-normalized dump lines.
///
/// Attributes accumulate per path, with the last write winning when a path
/// repeats an attribute. Each path is then split into its leaf (the key) and
/// its ancestors, stored nearest-first.
pub fn parse_records<'a>(lines: impl IntoIterator<Item = &'a str>) -> ParsedDump {
    let mut by_path: BTreeMap<&str, BTreeMap<String, String>> = BTreeMap::new();
    // First-appearance order; on a leaf collision the later path overrides.
    let mut path_order: Vec<&str> = Vec::new();
    let mut malformed_lines = 0usize;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let Some(parsed) = DumpLine::parse(line) else {
            debug!("Skipping malformed dump line: {line:?}");
            malformed_lines += 1;
            continue;
        };
        let attrs = by_path.entry(parsed.path).or_insert_with(|| {
            path_order.push(parsed.path);
            BTreeMap::new()
        });
        attrs.insert(parsed.attribute.to_string(), parsed.value.to_string());
    }

    let mut records = GeoIndex::new();
    let mut leaf_paths: BTreeMap<Glottocode, &str> = BTreeMap::new();
    let mut collisions = Vec::new();

    for path in path_order {
        let Some(attributes) = by_path.remove(path) else {
            continue;
        };
        let mut segments: Vec<Glottocode> = path.split('/').map(Glottocode::from).collect();
        let Some(leaf) = segments.pop() else {
            continue;
        };
        segments.reverse();

        if let Some(previous) = leaf_paths.insert(leaf.clone(), path) {
            collisions.push(LeafCollision {
                leaf: leaf.clone(),
                kept_path: path.to_string(),
                dropped_path: previous.to_string(),
            });
        }
        records.insert(
            leaf.clone(),
            GeoRecord {
                id: leaf,
                ancestors: segments,
                attributes,
            },
        );
    }

    ParsedDump {
        records,
        malformed_lines,
        collisions,
    }
}

/// Normalizes raw grep-log lines with `format` and parses them.
pub fn parse_dump<'a>(lines: impl IntoIterator<Item = &'a str>, format: &DumpFormat) -> ParsedDump {
    let normalized: Vec<_> = lines.into_iter().map(|l| format.normalize(l)).collect();
    let parsed = parse_records(normalized.iter().map(|l| &**l));
    if parsed.malformed_lines > 0 {
        warn!("Skipped {} malformed dump lines", parsed.malformed_lines);
    }
    parsed
}

// ============================================================================
// Code filter
// ============================================================================

/// Reads an allow-list with one Glottocode per line. Blank lines are ignored.
pub fn parse_allow_list(text: &str) -> HashSet<Glottocode> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Glottocode::from)
        .collect()
}

/// Keeps only the records whose id is in `allowed`.
pub fn filter_codes(records: &GeoIndex, allowed: &HashSet<Glottocode>) -> GeoIndex {
    records
        .iter()
        .filter(|(code, _)| allowed.contains(*code))
        .map(|(code, record)| (code.clone(), record.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Glottocode {
        Glottocode::from(s)
    }

    #[test]
    fn line_grammar_splits_on_first_separators() {
        let line = DumpLine::parse("indo1319/germ1287/stan1293:name = a = b").unwrap();
        assert_eq!(line.path, "indo1319/germ1287/stan1293");
        assert_eq!(line.attribute, "name");
        assert_eq!(line.value, "a = b");

        let line = DumpLine::parse("abcd1234:note = 12:30").unwrap();
        assert_eq!(line.path, "abcd1234");
        assert_eq!(line.value, "12:30");
    }

    #[test]
    fn line_grammar_rejects_malformed() {
        for bad in [
            "",
            "no separators at all",
            "abcd1234 latitude = 1",
            "abcd1234:latitude=1",
            ":latitude = 1",
            "abcd1234: = 1",
            "abcd1234:latitude = ",
            "abcd1234//efgh5678:latitude = 1",
        ] {
            assert_eq!(DumpLine::parse(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let parsed = parse_records([
            "root0001/mid00002/leaf0003:latitude = 1.5",
            "root0001/mid00002/leaf0003:longitude = 2.5",
            "root0001/mid00002/leaf0003:level = language",
            "root0001/mid00002:level = family",
            "root0001:level = family",
        ]);

        assert_eq!(parsed.malformed_lines, 0);
        assert!(parsed.collisions.is_empty());
        assert_eq!(parsed.records.len(), 3);

        let leaf = &parsed.records[&code("leaf0003")];
        assert_eq!(leaf.id, code("leaf0003"));
        assert_eq!(leaf.ancestors, vec![code("mid00002"), code("root0001")]);
        assert_eq!(leaf.attribute("latitude"), Some("1.5"));
        assert_eq!(leaf.attribute("longitude"), Some("2.5"));
        assert_eq!(leaf.attribute("level"), Some("language"));

        assert_eq!(parsed.records[&code("mid00002")].ancestors, vec![code("root0001")]);
        assert!(parsed.records[&code("root0001")].ancestors.is_empty());
    }

    #[test]
    fn repeated_attribute_last_write_wins() {
        let parsed = parse_records(["a0000001/b0000002:latitude = 1", "a0000001/b0000002:latitude = 7"]);
        assert_eq!(parsed.records[&code("b0000002")].attribute("latitude"), Some("7"));
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let parsed = parse_records(["garbage", "", "a0000001:level = family", "also:garbage"]);
        assert_eq!(parsed.malformed_lines, 2);
        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn colliding_leaves_are_reported() {
        let parsed = parse_records([
            "fam00001/dupl0001:latitude = 1",
            "fam00002/dupl0001:latitude = 2",
        ]);
        assert_eq!(parsed.records.len(), 1);
        let kept = &parsed.records[&code("dupl0001")];
        assert_eq!(kept.attribute("latitude"), Some("2"));
        assert_eq!(kept.ancestors, vec![code("fam00002")]);
        assert_eq!(
            parsed.collisions,
            vec![LeafCollision {
                leaf: code("dupl0001"),
                kept_path: "fam00002/dupl0001".to_string(),
                dropped_path: "fam00001/dupl0001".to_string(),
            }]
        );
    }

    #[test]
    fn grep_log_decoration_is_stripped() {
        let format = DumpFormat::default();
        assert_eq!(
            format.normalize("./languoids/tree/indo1319/stan1293/md.ini:latitude = 52.0\n"),
            "indo1319/stan1293:latitude = 52.0"
        );
        // lines without the prefix are still accepted
        assert_eq!(
            format.normalize("indo1319/md.ini:level = family"),
            "indo1319:level = family"
        );

        let parsed = parse_dump(
            ["./languoids/tree/indo1319/stan1293/md.ini:latitude = 52.0"],
            &format,
        );
        assert_eq!(parsed.records[&code("stan1293")].ancestors, vec![code("indo1319")]);
    }

    #[test]
    fn filter_keeps_only_allowed_codes() {
        let parsed = parse_records([
            "a0000001:level = family",
            "a0000001/b0000002:level = language",
            "a0000001/c0000003:level = language",
        ]);
        let allowed = parse_allow_list("b0000002\n\n  c0000003  \nzzzz9999\n");
        assert_eq!(allowed.len(), 3);

        let filtered = filter_codes(&parsed.records, &allowed);
        assert_eq!(
            filtered.keys().cloned().collect::<Vec<_>>(),
            vec![code("b0000002"), code("c0000003")]
        );

        assert!(filter_codes(&parsed.records, &HashSet::new()).is_empty());
    }
}
