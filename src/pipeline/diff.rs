//! Change Detector
//!
//! Deep, field-scoped equality between the persisted trip and the freshly
//! built one, used to suppress no-op writes. The only field excluded is
//! `last_observed`, which changes every tick and carries no reconciliation
//! meaning. `Trip` derives `PartialEq`, which recurses through estimate
//! slots and schedule snapshots and compares both sides symmetrically, so
//! a field populated on either side alone always registers.

use crate::types::Trip;

/// Whether persisting `proposed` over `existing` would change anything
/// semantically meaningful.
pub fn needs_write(existing: &Trip, proposed: &Trip) -> bool {
    let mut a = existing.clone();
    let mut b = proposed.clone();
    a.last_observed = 0;
    b.last_observed = 0;
    a != b
}
