//! Full ingestion run: every source, in a fixed order, one at a time.
//!
//! ```text
//! resolve link ──▶ facilities ──▶ hospital locations ──▶ clinic locations
//! ```
//!
//! Any fatal error aborts the run; a partial facility list is never
//! returned, since a reconciler would read the missing facilities as closed.
//! When the outpatient page has no spreadsheet for the period the facility
//! stage is skipped and [`IngestOutput::facilities`] is `None`; the location
//! stages still run.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::output::{Extraction, IngestOutput, IngestStats};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::{opendata, resolve, spreadsheet};
use crate::progress::Stage;
use std::future::Future;
use std::time::Instant;
use tracing::{info, warn};

/// Run the whole pipeline.
///
/// # Errors
/// Returns the first fatal [`IngestError`] of any stage. Row-level drops are
/// not errors; they are reported in each [`Extraction::skipped`].
pub async fn ingest(config: &IngestConfig) -> Result<IngestOutput, IngestError> {
    let total_start = Instant::now();
    let fetcher = Fetcher::new(config)?;
    info!("Starting ingestion from {}", config.outpatients_page_url);

    // ── Step 1: Resolve spreadsheet link ─────────────────────────────────
    let resolve_start = Instant::now();
    let source_url = run_stage(
        config,
        Stage::ResolveLink,
        resolve::resolve(&fetcher, config),
        |url: &Option<String>| (usize::from(url.is_some()), 0),
    )
    .await?;
    let resolve_duration_ms = resolve_start.elapsed().as_millis() as u64;

    // ── Step 2: Facilities ───────────────────────────────────────────────
    let facilities_start = Instant::now();
    let facilities = match &source_url {
        Some(url) => Some(
            run_stage(
                config,
                Stage::Facilities,
                spreadsheet::extract(&fetcher, url, config),
                counts,
            )
            .await?,
        ),
        None => {
            warn!("No spreadsheet published; facility list left untouched");
            None
        }
    };
    let facilities_duration_ms = facilities_start.elapsed().as_millis() as u64;

    // ── Step 3: Hospital and clinic coordinates ──────────────────────────
    let locations_start = Instant::now();
    let hospital_locations = run_stage(
        config,
        Stage::HospitalLocations,
        opendata::extract(&fetcher, &config.hospital_csv_url, config),
        counts,
    )
    .await?;
    let clinic_locations = run_stage(
        config,
        Stage::ClinicLocations,
        opendata::extract(&fetcher, &config.clinic_csv_url, config),
        counts,
    )
    .await?;
    let locations_duration_ms = locations_start.elapsed().as_millis() as u64;

    // ── Step 4: Stats ────────────────────────────────────────────────────
    let stats = IngestStats {
        facilities: facilities.as_ref().map_or(0, |f| f.records.len()),
        facility_rows_skipped: facilities.as_ref().map_or(0, |f| f.skipped.len()),
        hospital_locations: hospital_locations.records.len(),
        clinic_locations: clinic_locations.records.len(),
        location_rows_skipped: hospital_locations.skipped.len() + clinic_locations.skipped.len(),
        resolve_duration_ms,
        facilities_duration_ms,
        locations_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Ingestion complete: {} facilities, {} locations, {}ms total",
        stats.facilities,
        stats.hospital_locations + stats.clinic_locations,
        stats.total_duration_ms
    );

    Ok(IngestOutput {
        source_url,
        facilities,
        hospital_locations,
        clinic_locations,
        stats,
    })
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync(config: &IngestConfig) -> Result<IngestOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ingest(config))
}

/// Await one stage, reporting it to the progress callback.
async fn run_stage<T, F>(
    config: &IngestConfig,
    stage: Stage,
    work: F,
    summarize: impl Fn(&T) -> (usize, usize),
) -> Result<T, IngestError>
where
    F: Future<Output = Result<T, IngestError>>,
{
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    match work.await {
        Ok(value) => {
            if let Some(cb) = cb {
                let (records, skipped) = summarize(&value);
                cb.on_stage_complete(stage, records, skipped);
            }
            Ok(value)
        }
        Err(e) => {
            warn!("Stage '{}' failed: {}", stage, e);
            if let Some(cb) = cb {
                cb.on_stage_error(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

fn counts<T>(extraction: &Extraction<T>) -> (usize, usize) {
    (extraction.records.len(), extraction.skipped.len())
}
