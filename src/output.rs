//! Records produced by the extractors and the ingestion run.
//!
//! All records are plain values rebuilt from source bytes on every run. The
//! only identity they carry is the normalised facility name, which joins
//! spreadsheet rows to coordinates.

use crate::error::SkipReason;
use crate::reconcile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One facility row of the outpatient spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub accepts_outpatients: bool,
    pub treats_positive_patients: bool,
    pub health_center_name: String,
    /// Natural key: normalised with every space removed.
    pub facility_name: String,
    pub city: String,
    /// Street address without the prefecture prefix.
    pub address: String,
    pub phone: String,
    pub non_regular_patients_allowed: bool,
    pub pediatrics: bool,
    pub mon: String,
    pub tue: String,
    pub wed: String,
    pub thu: String,
    pub fri: String,
    pub sat: String,
    pub sun: String,
    /// Always `false` unless `treats_positive_patients`.
    pub positive_face_to_face: bool,
    pub positive_remote: bool,
    pub positive_home_visit: bool,
    pub memo: String,
}

impl FacilityRecord {
    /// Opening hours Monday first, as they appear in the record.
    pub fn week(&self) -> [&str; 7] {
        [
            self.mon.as_str(),
            self.tue.as_str(),
            self.wed.as_str(),
            self.thu.as_str(),
            self.fri.as_str(),
            self.sat.as_str(),
            self.sun.as_str(),
        ]
    }
}

/// Coordinates for one facility, in signed decimal degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub facility_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoRecord {
    /// The `(0, 0)` placeholder the geocoder path emits for "no match".
    pub fn no_match(facility_name: impl Into<String>) -> Self {
        Self {
            facility_name: facility_name.into(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// A source row that was dropped without failing the extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based row number in the source (sheet row, or CSV record including
    /// the header).
    pub row: usize,
    pub reason: SkipReason,
}

/// Result of one extractor call: surviving records in source order, plus
/// the rows that were dropped on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRow>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    /// Rows examined (kept + skipped).
    pub fn rows_seen(&self) -> usize {
        self.records.len() + self.skipped.len()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

/// Timings and counts for one ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub facilities: usize,
    pub facility_rows_skipped: usize,
    pub hospital_locations: usize,
    pub clinic_locations: usize,
    pub location_rows_skipped: usize,
    pub resolve_duration_ms: u64,
    pub facilities_duration_ms: u64,
    pub locations_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one ingestion run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    /// Spreadsheet link found on the outpatient page, if any.
    pub source_url: Option<String>,
    /// `None` when no spreadsheet is published for the period; an absent
    /// list must not be mistaken for an empty one.
    pub facilities: Option<Extraction<FacilityRecord>>,
    pub hospital_locations: Extraction<GeoRecord>,
    pub clinic_locations: Extraction<GeoRecord>,
    pub stats: IngestStats,
}

impl IngestOutput {
    /// Natural keys of the extracted facilities, or `None` when no
    /// spreadsheet was found.
    pub fn facility_names(&self) -> Option<BTreeSet<String>> {
        self.facilities.as_ref().map(|f| {
            f.records
                .iter()
                .map(|r| r.facility_name.clone())
                .collect()
        })
    }

    /// Facilities in `current` that this run no longer lists.
    ///
    /// Returns an empty set when no spreadsheet was found, so a missing
    /// publication never deletes anything.
    pub fn stale_facilities(&self, current: &BTreeSet<String>) -> BTreeSet<String> {
        match self.facility_names() {
            Some(new) => reconcile::stale_facilities(current, &new),
            None => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_is_origin() {
        let g = GeoRecord::no_match("森山病院");
        assert_eq!(g.facility_name, "森山病院");
        assert!(g.is_no_match());
    }

    #[test]
    fn rows_seen_counts_both_channels() {
        let e = Extraction {
            records: vec![GeoRecord::no_match("a")],
            skipped: vec![SkippedRow {
                row: 3,
                reason: SkipReason::Empty,
            }],
        };
        assert_eq!(e.rows_seen(), 2);
        assert_eq!(e.into_records().len(), 1);
    }

    #[test]
    fn stale_facilities_empty_without_publication() {
        let output = IngestOutput {
            source_url: None,
            facilities: None,
            hospital_locations: Extraction::default(),
            clinic_locations: Extraction::default(),
            stats: IngestStats::default(),
        };
        let current: BTreeSet<String> = ["市立旭川病院".to_string()].into();
        assert!(output.stale_facilities(&current).is_empty());
    }
}
