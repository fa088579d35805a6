//! Boundary with the persistence layer.
//!
//! Upserting records is the store's job. The one decision this crate makes
//! on its behalf is which previously stored facilities have disappeared from
//! the source, keyed by normalised facility name.

use std::collections::BTreeSet;

/// Names present in `current` (the store) but absent from `new` (this run).
pub fn stale_facilities(current: &BTreeSet<String>, new: &BTreeSet<String>) -> BTreeSet<String> {
    current.difference(new).cloned().collect()
}
