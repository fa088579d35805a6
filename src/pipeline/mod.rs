//! Pipeline stages for fever-outpatient ingestion.
//!
//! Each submodule implements exactly one extraction step. Extractors share
//! the [`fetch::Fetcher`] and the [`normalize`] rules and nothing else.
//!
//! ## Data Flow
//!
//! ```text
//! outpatient page ──▶ resolve ──▶ spreadsheet ──▶ FacilityRecord[]
//!   (HTML, utf-8)     (link)      (xlsx rows)
//!
//! open-data CSVs  ──▶ opendata ──────────────────▶ GeoRecord[]
//!   (cp932)           (37-column rows)
//!
//! facility name   ──▶ geocode ───────────────────▶ GeoRecord[]
//!                     (local-search JSON)
//! ```
//!
//! 1. [`fetch`]: one GET per call; caller picks the content shape
//!    and the character encoding
//! 2. [`normalize`]: width folding, whitespace and the `"0"` sentinel;
//!    applied to every extracted cell
//! 3. [`resolve`]: last captioned spreadsheet link on the page
//! 4. [`spreadsheet`]: fixed-position facility rows; runs in
//!    `spawn_blocking` because workbook parsing is synchronous
//! 5. [`opendata`]: coordinates of the target locality
//! 6. [`geocode`]: coordinates for one name from the search API

pub mod fetch;
pub mod geocode;
pub mod normalize;
pub mod opendata;
pub mod resolve;
pub mod spreadsheet;
