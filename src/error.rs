//! Error types for the outpatients-ingest library.
//!
//! Two distinct types reflect two distinct outcomes:
//!
//! * [`IngestError`] is **fatal**: the extraction step cannot produce a
//!   trustworthy result (transport failure, the source changed shape, the
//!   geocoding API changed its contract, a missing credential). Returned as
//!   `Err(IngestError)` from every extractor and from [`crate::ingest::ingest`].
//!
//! * [`SkipReason`] is **non-fatal**: a single source row was dropped (blank,
//!   wrong field count, unparseable coordinate, other locality). Stored in
//!   [`crate::output::Extraction::skipped`] next to the surviving records so
//!   callers can check how many rows survived independently of whether the
//!   extraction itself succeeded.
//!
//! A partial facility list is never returned as `Ok`: downstream
//! reconciliation deletes facilities missing from the list, so any fatal
//! error aborts the whole step.

use thiserror::Error;

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport or HTTP failure.
    Fetch,
    /// The source document no longer has the expected shape.
    StructuralParse,
    /// The geocoding API response is missing expected structure.
    UpstreamProtocol,
    /// Bad argument, bad configuration or missing credential.
    Configuration,
    /// Unexpected internal error.
    Internal,
}

/// All fatal errors returned by the outpatients-ingest library.
///
/// Row-level drops use [`SkipReason`] and are never propagated here.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The request could not be sent or the body could not be read.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    /// The origin answered with a non-success status.
    #[error("Fetch of '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    // ── Structural errors ─────────────────────────────────────────────────
    /// The body is not valid in the declared character encoding.
    #[error("Content of '{url}' is not valid {encoding}")]
    DecodeFailed { url: String, encoding: String },

    /// The spreadsheet binary could not be opened.
    #[error("Spreadsheet could not be read: {detail}")]
    UnreadableWorkbook { detail: String },

    /// The workbook does not contain the configured sheet.
    #[error("Sheet '{sheet}' not found (available: {})", .available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },

    /// The delimited file could not be tokenised.
    #[error("Malformed CSV: {detail}")]
    MalformedCsv { detail: String },

    // ── Upstream protocol errors ──────────────────────────────────────────
    /// The geocoding API returned JSON without the expected structure.
    #[error("Unexpected geocoder response: {detail}")]
    UpstreamProtocol { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required credential is not configured.
    #[error("Credential '{var}' is not set.\nExport it or add it to .env.")]
    MissingCredential { var: String },

    /// The facility name passed to the geocoder is empty.
    #[error("Facility name must be a non-empty string")]
    InvalidFacilityName,

    /// The encoding label is not known to the decoder.
    #[error("Unknown character encoding '{label}'")]
    UnknownEncoding { label: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Classify this error according to the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::FetchFailed { .. }
            | IngestError::FetchTimeout { .. }
            | IngestError::HttpStatus { .. } => ErrorKind::Fetch,
            IngestError::DecodeFailed { .. }
            | IngestError::UnreadableWorkbook { .. }
            | IngestError::SheetNotFound { .. }
            | IngestError::MalformedCsv { .. } => ErrorKind::StructuralParse,
            IngestError::UpstreamProtocol { .. } => ErrorKind::UpstreamProtocol,
            IngestError::MissingCredential { .. }
            | IngestError::InvalidFacilityName
            | IngestError::UnknownEncoding { .. }
            | IngestError::InvalidConfig(_) => ErrorKind::Configuration,
            IngestError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Why a single source row produced no record.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum SkipReason {
    /// Every cell was blank after normalisation.
    #[error("row is empty")]
    Empty,

    /// The facility-name cell was blank, so the row has no natural key.
    #[error("facility name is empty")]
    MissingFacilityName,

    /// The row does not have the fixed schema width.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// The locality column names a different municipality.
    #[error("locality '{city}' is not the target locality")]
    OutsideLocality { city: String },

    /// A latitude/longitude cell is not a finite decimal number.
    #[error("{field} '{value}' is not a decimal number")]
    BadCoordinate { field: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_display() {
        let e = IngestError::HttpStatus {
            url: "https://example.org/a.csv".into(),
            status: 503,
        };
        let msg = e.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("a.csv"), "got: {msg}");
    }

    #[test]
    fn sheet_not_found_lists_available_sheets() {
        let e = IngestError::SheetNotFound {
            sheet: "Sheet1".into(),
            available: vec!["一覧".into(), "注意事項".into()],
        };
        assert_eq!(
            e.to_string(),
            "Sheet 'Sheet1' not found (available: 一覧, 注意事項)"
        );
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            IngestError::FetchTimeout {
                url: "u".into(),
                secs: 5
            }
            .kind(),
            ErrorKind::Fetch
        );
        assert_eq!(
            IngestError::UnreadableWorkbook {
                detail: "zip".into()
            }
            .kind(),
            ErrorKind::StructuralParse
        );
        assert_eq!(
            IngestError::UpstreamProtocol {
                detail: "no Feature".into()
            }
            .kind(),
            ErrorKind::UpstreamProtocol
        );
        assert_eq!(
            IngestError::MissingCredential {
                var: "YOLP_APP_ID".into()
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(IngestError::InvalidFacilityName.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn skip_reason_display() {
        let r = SkipReason::FieldCount {
            expected: 37,
            found: 12,
        };
        assert_eq!(r.to_string(), "expected 37 fields, found 12");

        let r = SkipReason::BadCoordinate {
            field: "latitude".into(),
            value: "不明".into(),
        };
        assert!(r.to_string().contains("不明"));
    }
}
