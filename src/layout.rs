//! Fixed positional layouts of the source documents.
//!
//! Neither source carries a trustworthy header row, so fields are addressed
//! by column index. Every index lives in one of the two tables below; when a
//! publisher moves a column only the table changes, never the parsing code.
//! [`SheetLayout::validate`] and [`OpendataLayout::validate`] are run once by
//! [`crate::config::IngestConfigBuilder::build`].

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of cells in one weekday's schedule window:
/// `[am_start, am_sep, am_end, pm_start, pm_sep, pm_end]`.
pub const DAY_WINDOW: usize = 6;

/// Days covered by the schedule block, Monday first.
pub const DAYS_PER_WEEK: usize = 7;

/// Column positions in the fever-outpatient spreadsheet (0-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Presence mark: accepts fever outpatients.
    pub accepts_outpatients: usize,
    /// Presence mark: involved in treating positive patients.
    pub treats_positive_patients: usize,
    pub health_center_name: usize,
    pub facility_name: usize,
    pub city: usize,
    pub address: usize,
    pub phone: usize,
    /// Free text compared against [`NON_REGULAR_PATIENTS_PHRASE`].
    pub eligibility: usize,
    /// Presence mark: sees children.
    pub pediatrics: usize,
    /// First cell of the 7 × 6 weekly schedule block.
    pub schedule_start: usize,
    /// Presence marks consulted only for positive-patient facilities.
    pub positive_face_to_face: usize,
    pub positive_remote: usize,
    pub positive_home_visit: usize,
    pub memo: usize,
}

/// The eligibility text meaning "patients other than regulars are seen too".
pub const NON_REGULAR_PATIENTS_PHRASE: &str = "かかりつけ患者以外の診療も可";

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            accepts_outpatients: 0,
            treats_positive_patients: 1,
            health_center_name: 2,
            facility_name: 3,
            city: 4,
            address: 5,
            phone: 6,
            eligibility: 7,
            pediatrics: 8,
            schedule_start: 9,
            positive_face_to_face: 51,
            positive_remote: 52,
            positive_home_visit: 53,
            memo: 57,
        }
    }
}

impl SheetLayout {
    /// Cell range of one weekday's schedule window (`day` 0 = Monday).
    pub fn day_window(&self, day: usize) -> std::ops::Range<usize> {
        let start = self.schedule_start + day * DAY_WINDOW;
        start..start + DAY_WINDOW
    }

    /// Minimum row width needed to address every column.
    pub fn width(&self) -> usize {
        self.single_columns()
            .into_iter()
            .map(|(_, c)| c + 1)
            .chain(std::iter::once(self.day_window(DAYS_PER_WEEK - 1).end))
            .max()
            .unwrap_or(0)
    }

    fn single_columns(&self) -> [(&'static str, usize); 13] {
        [
            ("accepts_outpatients", self.accepts_outpatients),
            ("treats_positive_patients", self.treats_positive_patients),
            ("health_center_name", self.health_center_name),
            ("facility_name", self.facility_name),
            ("city", self.city),
            ("address", self.address),
            ("phone", self.phone),
            ("eligibility", self.eligibility),
            ("pediatrics", self.pediatrics),
            ("positive_face_to_face", self.positive_face_to_face),
            ("positive_remote", self.positive_remote),
            ("positive_home_visit", self.positive_home_visit),
            ("memo", self.memo),
        ]
    }

    /// Reject layouts where two fields share a column or a field falls
    /// inside the schedule block.
    pub fn validate(&self) -> Result<(), IngestError> {
        let schedule = self.schedule_start..self.day_window(DAYS_PER_WEEK - 1).end;
        let mut seen: BTreeMap<usize, &str> = BTreeMap::new();
        for (name, col) in self.single_columns() {
            if schedule.contains(&col) {
                return Err(IngestError::InvalidConfig(format!(
                    "sheet column {col} ({name}) overlaps the schedule block {}..{}",
                    schedule.start, schedule.end
                )));
            }
            if let Some(other) = seen.insert(col, name) {
                return Err(IngestError::InvalidConfig(format!(
                    "sheet column {col} is assigned to both {other} and {name}"
                )));
            }
        }
        Ok(())
    }
}

/// Column positions in the prefectural medical-institution open data (0-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpendataLayout {
    /// Exact number of fields in a well-formed row.
    pub field_count: usize,
    /// Municipality, compared verbatim with the target locality.
    pub city: usize,
    pub facility_name: usize,
    pub latitude: usize,
    pub longitude: usize,
}

impl Default for OpendataLayout {
    fn default() -> Self {
        Self {
            field_count: 37,
            city: 4,
            facility_name: 5,
            latitude: 11,
            longitude: 12,
        }
    }
}

impl OpendataLayout {
    pub fn validate(&self) -> Result<(), IngestError> {
        let columns = [self.city, self.facility_name, self.latitude, self.longitude];
        if let Some(col) = columns.iter().find(|&&c| c >= self.field_count) {
            return Err(IngestError::InvalidConfig(format!(
                "open-data column {col} is outside the {}-field schema",
                self.field_count
            )));
        }
        let mut sorted = columns;
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(IngestError::InvalidConfig(
                "open-data layout assigns one column to two fields".into(),
            ));
        }
        Ok(())
    }
}
