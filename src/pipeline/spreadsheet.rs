//! Fever-outpatient spreadsheet → [`FacilityRecord`]s.
//!
//! ## Why render every cell to text?
//!
//! The schedule block holds times of day. Read numerically they would be
//! fractions of a day (`0.354166…` for 08:30) and lose the `HH:MM:SS` shape
//! that the schedule rules match on. Each cell is therefore rendered the way
//! a spreadsheet would display it (see [`cell_text`]) and only then
//! normalised.
//!
//! ## Why spawn_blocking?
//!
//! Unzipping and parsing the workbook XML is CPU-bound and synchronous;
//! it runs on the blocking pool so the runtime workers stay free.

use crate::config::IngestConfig;
use crate::error::{IngestError, SkipReason};
use crate::layout::{SheetLayout, DAYS_PER_WEEK, NON_REGULAR_PATIENTS_PHRASE};
use crate::output::{Extraction, FacilityRecord, SkippedRow};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::normalize::{is_marked, normalize_row};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{Duration, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Read, Seek};
use tracing::{debug, info};

/// Schedule value meaning "no session", as opposed to a real midnight.
pub const ZERO_TIME: &str = "00:00";

/// Joins the morning and afternoon sessions of one day.
const SESSION_SEPARATOR: &str = "、";

/// Joins the start and end of one session.
const RANGE_SEPARATOR: &str = "～";

/// A sheet row after rendering: 1-based sheet row number and its cells.
pub type SheetRow = (usize, Vec<String>);

/// Download the spreadsheet at `url` and extract every facility row.
pub async fn extract(
    fetcher: &Fetcher,
    url: &str,
    config: &IngestConfig,
) -> Result<Extraction<FacilityRecord>, IngestError> {
    let data = fetcher.spreadsheet(url).await?;

    let sheet = config.sheet_name.clone();
    let header_rows = config.header_rows;
    let width = config.sheet_layout.width();
    let rows = tokio::task::spawn_blocking(move || read_sheet(data, &sheet, header_rows, width))
        .await
        .map_err(|e| IngestError::Internal(format!("Spreadsheet task panicked: {}", e)))??;

    let extraction = extract_rows(rows, &config.sheet_layout);
    info!(
        "Extracted {} facilities ({} rows skipped)",
        extraction.records.len(),
        extraction.skipped.len()
    );
    Ok(extraction)
}

/// Open a workbook and render the data rows of one sheet.
pub fn read_sheet<RS>(
    data: RS,
    sheet: &str,
    header_rows: usize,
    width: usize,
) -> Result<Vec<SheetRow>, IngestError>
where
    RS: Read + Seek + Clone,
{
    let mut workbook = open_workbook_auto_from_rs(data).map_err(|e| {
        IngestError::UnreadableWorkbook {
            detail: e.to_string(),
        }
    })?;

    let available = workbook.sheet_names();
    if !available.iter().any(|name| name == sheet) {
        return Err(IngestError::SheetNotFound {
            sheet: sheet.to_string(),
            available,
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| IngestError::UnreadableWorkbook {
            detail: format!("sheet '{}': {}", sheet, e),
        })?;

    Ok(rows_from_range(&range, header_rows, width))
}

/// Render a used range into text rows addressed by absolute sheet position.
///
/// Rows above `header_rows` are dropped even if the used range starts below
/// row 1, cells left of the range are filled with `""`, and every row is
/// padded to at least `width` cells.
pub fn rows_from_range(range: &Range<Data>, header_rows: usize, width: usize) -> Vec<SheetRow> {
    let Some((first_row, first_col)) = range.start() else {
        return Vec::new();
    };
    let lead = first_col as usize;

    range
        .rows()
        .enumerate()
        .filter_map(|(i, cells)| {
            let absolute = first_row as usize + i;
            if absolute < header_rows {
                return None;
            }
            let mut row = vec![String::new(); lead];
            row.extend(cells.iter().map(cell_text));
            if row.len() < width {
                row.resize(width, String::new());
            }
            Some((absolute + 1, row))
        })
        .collect()
}

/// Display text of one cell.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_text(*f),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(dt) => excel_serial_text(dt.as_f64()),
    }
}

fn float_text(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// Render a 1900-system serial date: a bare time of day when the day part
/// is zero, a full timestamp otherwise.
///
/// Serial 60 is the 1900-02-29 that spreadsheet programs count although it
/// never existed; it renders literally and serials below it are shifted back
/// onto the real calendar.
pub fn excel_serial_text(serial: f64) -> String {
    let total_secs = (serial * 86_400.0).round();
    if !total_secs.is_finite() || total_secs < 0.0 {
        return float_text(serial);
    }
    let total_secs = total_secs as i64;
    let (days, secs) = (total_secs / 86_400, (total_secs % 86_400) as u32);

    let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0) else {
        return float_text(serial);
    };
    if days == 0 {
        return time.format("%H:%M:%S").to_string();
    }
    let epoch = match days {
        1..=59 => NaiveDate::from_ymd_opt(1899, 12, 31),
        60 => return format!("1900-02-29 {}", time.format("%H:%M:%S")),
        _ => NaiveDate::from_ymd_opt(1899, 12, 30),
    };
    let date = epoch
        .zip(Duration::try_days(days))
        .and_then(|(epoch, offset)| epoch.checked_add_signed(offset));
    match date {
        Some(d) => d.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => float_text(serial),
    }
}

/// Normalise rendered rows and map them to records.
pub fn extract_rows(rows: Vec<SheetRow>, layout: &SheetLayout) -> Extraction<FacilityRecord> {
    let mut extraction = Extraction::default();
    for (number, cells) in rows {
        let cells = normalize_row(&cells);
        match facility_from_row(&cells, layout) {
            Ok(record) => extraction.records.push(record),
            Err(reason) => {
                debug!("Skipping sheet row {}: {}", number, reason);
                extraction.skipped.push(SkippedRow { row: number, reason });
            }
        }
    }
    extraction
}

/// Map one normalised row to a record.
pub fn facility_from_row(row: &[String], layout: &SheetLayout) -> Result<FacilityRecord, SkipReason> {
    let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

    if row.iter().all(|c| c.is_empty()) {
        return Err(SkipReason::Empty);
    }
    let facility_name = cell(layout.facility_name).replace(' ', "");
    if facility_name.is_empty() {
        return Err(SkipReason::MissingFacilityName);
    }

    let treats_positive_patients = is_marked(cell(layout.treats_positive_patients));
    let positive = |i: usize| treats_positive_patients && is_marked(cell(i));

    let [mon, tue, wed, thu, fri, sat, sun]: [String; DAYS_PER_WEEK] =
        std::array::from_fn(|day| {
            let window = layout.day_window(day);
            let cells: Vec<&str> = window.map(cell).collect();
            opening_hours(&cells)
        });

    Ok(FacilityRecord {
        accepts_outpatients: is_marked(cell(layout.accepts_outpatients)),
        treats_positive_patients,
        health_center_name: cell(layout.health_center_name).to_string(),
        facility_name,
        city: cell(layout.city).to_string(),
        address: cell(layout.address).replace("北海道", ""),
        phone: cell(layout.phone).to_string(),
        non_regular_patients_allowed: cell(layout.eligibility) == NON_REGULAR_PATIENTS_PHRASE,
        pediatrics: is_marked(cell(layout.pediatrics)),
        mon,
        tue,
        wed,
        thu,
        fri,
        sat,
        sun,
        positive_face_to_face: positive(layout.positive_face_to_face),
        positive_remote: positive(layout.positive_remote),
        positive_home_visit: positive(layout.positive_home_visit),
        memo: cell(layout.memo).to_string(),
    })
}

/// Collapse one day's six schedule cells
/// (`am_start, ～, am_end, pm_start, ～, pm_end`) into display text.
///
/// A session is kept when either end differs from [`ZERO_TIME`]. When both
/// are kept and the morning runs open-ended into an afternoon with no start
/// (`08:30～00:00、00:00～17:00`) they merge into one range (`08:30～17:00`).
pub fn opening_hours<S: AsRef<str>>(cells: &[S]) -> String {
    let time = |i: usize| strip_if_time_format(cells.get(i).map_or("", |c| c.as_ref()));
    let session = |start: String, end: String| {
        if is_zero_time(&start) && is_zero_time(&end) {
            None
        } else {
            Some(format!("{start}{RANGE_SEPARATOR}{end}"))
        }
    };

    let am = session(time(0), time(2));
    let pm = session(time(3), time(5));
    match (am, pm) {
        (None, None) => String::new(),
        (Some(only), None) | (None, Some(only)) => only,
        (Some(am), Some(pm)) => format!("{am}{SESSION_SEPARATOR}{pm}").replace(
            &format!("{RANGE_SEPARATOR}{ZERO_TIME}{SESSION_SEPARATOR}{ZERO_TIME}{RANGE_SEPARATOR}"),
            RANGE_SEPARATOR,
        ),
    }
}

/// Blank cells count as "no session" too.
fn is_zero_time(t: &str) -> bool {
    t.is_empty() || t == ZERO_TIME
}

static RE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*([0-9]{2}):([0-9]{2}):([0-9]{2})$").unwrap());

/// `…HH:MM:SS` → `HH:MM`; anything else passes through unchanged.
pub fn strip_if_time_format(text: &str) -> String {
    match RE_TIME.captures(text) {
        Some(caps) => format!("{}:{}", &caps[1], &caps[2]),
        None => text.to_string(),
    }
}
