//! # outpatients-ingest
//!
//! Scrape the Hokkaido fever-outpatient listings for Asahikawa and turn them
//! into normalised, comparison-ready records.
//!
//! ## Why this crate?
//!
//! The sources are published for people, not programs: the current
//! spreadsheet is only findable through an image caption on an HTML page,
//! its columns are positional with no trustworthy header, the coordinate
//! open data is Windows-31J with a bare `0` meaning "not applicable", and
//! the same facility name appears in full-width form in one source and
//! half-width in another. This crate does the scraping and the
//! normalisation so that a persistence layer can upsert by facility name
//! and diff the name sets safely.
//!
//! ## Pipeline Overview
//!
//! ```text
//! outpatient page (HTML)
//!  │
//!  ├─ 1. Resolve      last captioned .xlsx link, or none this period
//!  ├─ 2. Facilities   fixed 58-column rows → FacilityRecord
//!  ├─ 3. Locations    hospital + clinic open data (cp932) → GeoRecord
//!  └─ 4. Output       records + skipped rows + per-stage stats
//!
//! geocode(name) ──▶ local-search API → GeoRecord (on demand)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outpatients_ingest::{ingest, IngestConfig};
//! use std::collections::BTreeSet;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::from_env()?;
//!     let output = ingest(&config).await?;
//!     if let Some(facilities) = &output.facilities {
//!         println!("{} facilities", facilities.records.len());
//!     }
//!     let stored: BTreeSet<String> = BTreeSet::new();
//!     for name in output.stale_facilities(&stored) {
//!         println!("delete {name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `outpatients` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! outpatients-ingest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod reconcile;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{ErrorKind, IngestError, SkipReason};
pub use ingest::{ingest, ingest_sync};
pub use layout::{OpendataLayout, SheetLayout};
pub use output::{Extraction, FacilityRecord, GeoRecord, IngestOutput, IngestStats, SkippedRow};
pub use pipeline::geocode::geocode;
pub use pipeline::normalize::normalize;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use reconcile::stale_facilities;
