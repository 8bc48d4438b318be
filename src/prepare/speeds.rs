//! Per-segment speed override table.
//!
//! Three-column CSV (from external id, to external id, speed km/h), keyed by
//! the unordered pair so a single row covers both directions. A zero speed
//! would make the segment weight infinite, so such rows are rejected.

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::ExternalNodeId;

#[derive(Debug, Default)]
pub struct SegmentSpeedTable {
    speeds: FxHashMap<(ExternalNodeId, ExternalNodeId), u32>,
}

impl SegmentSpeedTable {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;

        let mut speeds = FxHashMap::default();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != 3 {
                bail!(
                    "{}: row {} has {} columns, expected from,to,speed",
                    path.as_ref().display(),
                    line + 1,
                    record.len()
                );
            }
            let from: ExternalNodeId = record[0]
                .parse()
                .with_context(|| format!("row {}: bad from-node id", line + 1))?;
            let to: ExternalNodeId = record[1]
                .parse()
                .with_context(|| format!("row {}: bad to-node id", line + 1))?;
            let speed: u32 = record[2]
                .parse()
                .with_context(|| format!("row {}: bad speed", line + 1))?;
            if speed == 0 {
                bail!(
                    "{}: row {}: speed of 0 km/h is not allowed",
                    path.as_ref().display(),
                    line + 1
                );
            }
            speeds.insert(Self::key(from, to), speed);
        }
        Ok(Self { speeds })
    }

    fn key(a: ExternalNodeId, b: ExternalNodeId) -> (ExternalNodeId, ExternalNodeId) {
        (a.min(b), a.max(b))
    }

    pub fn lookup(&self, a: ExternalNodeId, b: ExternalNodeId) -> Option<u32> {
        self.speeds.get(&Self::key(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }
}

/// Segment weight in deci-seconds from length and speed, floored at 1.
/// Factory-time weights use the same formula, so overridden and untouched
/// segments stay in the same unit.
pub fn segment_weight(length_m: f64, speed_kmh: u32) -> u32 {
    let weight = ((length_m * 10.0) / (speed_kmh as f64 / 3.6) + 0.5).floor();
    (weight as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn lookup_is_unordered() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "100,200,72").unwrap();
        file.flush().unwrap();
        let table = SegmentSpeedTable::from_csv(file.path()).unwrap();
        assert_eq!(table.lookup(100, 200), Some(72));
        assert_eq!(table.lookup(200, 100), Some(72));
        assert_eq!(table.lookup(100, 300), None);
    }

    #[test]
    fn zero_speed_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "100,200,0").unwrap();
        file.flush().unwrap();
        let err = SegmentSpeedTable::from_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("0 km/h"));
    }

    #[test]
    fn weight_formula_matches_reference_case() {
        // 100 m at 72 km/h: floor(100·10 / 20 + 0.5) = 50 deci-seconds.
        assert_eq!(segment_weight(100.0, 72), 50);
    }

    #[test]
    fn weight_floor_is_one() {
        assert_eq!(segment_weight(0.01, 130), 1);
    }
}
