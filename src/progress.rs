//! Progress-callback trait for per-stage ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to be told when
//! each stage of [`crate::ingest::ingest`] starts, finishes or fails.
//!
//! # Example
//!
//! ```rust
//! use outpatients_ingest::{IngestConfig, IngestProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RecordCounter {
//!     records: Arc<AtomicUsize>,
//! }
//!
//! impl IngestProgressCallback for RecordCounter {
//!     fn on_stage_complete(&self, stage: Stage, records: usize, skipped: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!         eprintln!("{stage}: {records} kept, {skipped} skipped");
//!     }
//! }
//!
//! let counter = Arc::new(RecordCounter {
//!     records: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of an ingestion run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Find the current spreadsheet link on the outpatient page.
    ResolveLink,
    /// Download and parse the facility spreadsheet.
    Facilities,
    /// Download and parse the hospital open-data CSV.
    HospitalLocations,
    /// Download and parse the clinic open-data CSV.
    ClinicLocations,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveLink => "resolve link",
            Stage::Facilities => "facilities",
            Stage::HospitalLocations => "hospital locations",
            Stage::ClinicLocations => "clinic locations",
        };
        f.write_str(name)
    }
}

/// Called by the ingestion pipeline as it moves through its stages.
///
/// Stages run one at a time, but the trait is `Send + Sync` so a callback can
/// be shared with other tasks (a UI thread, a channel forwarder). All methods
/// default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called before a stage fetches anything.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes.
    ///
    /// # Arguments
    /// * `records`: records produced (1 for a resolved link, 0 if none)
    /// * `skipped`: source rows dropped without error
    fn on_stage_complete(&self, stage: Stage, records: usize, skipped: usize) {
        let _ = (stage, records, skipped);
    }

    /// Called when a stage fails fatally; no further stages run.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: Mutex<Vec<Stage>>,
        records: AtomicUsize,
        skipped: AtomicUsize,
        errors: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage) {
            self.started.lock().unwrap().push(stage);
        }

        fn on_stage_complete(&self, _stage: Stage, records: usize, skipped: usize) {
            self.records.fetch_add(records, Ordering::SeqCst);
            self.skipped.fetch_add(skipped, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _stage: Stage, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::ResolveLink);
        cb.on_stage_complete(Stage::Facilities, 12, 1);
        cb.on_stage_error(Stage::HospitalLocations, "HTTP 500");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage_start(Stage::Facilities);
        tracker.on_stage_complete(Stage::Facilities, 40, 2);
        tracker.on_stage_start(Stage::HospitalLocations);
        tracker.on_stage_error(Stage::HospitalLocations, "timeout");

        assert_eq!(
            *tracker.started.lock().unwrap(),
            vec![Stage::Facilities, Stage::HospitalLocations]
        );
        assert_eq!(tracker.records.load(Ordering::SeqCst), 40);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::ClinicLocations.to_string(), "clinic locations");
    }
}
