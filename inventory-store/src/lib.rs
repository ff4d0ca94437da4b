//! Inventory Store - keyed CSV record collection for endpoint observations
//!
//! One row per host, keyed by MAC address. Each run:
//! - Loads the whole collection (or bootstraps it on first run)
//! - Finds the row for the observed host, reports field discrepancies
//! - Merges the observation in place, or appends it for a new host
//! - Rewrites the whole file atomically under an exclusive lock

pub mod collection;
pub mod error;
pub mod policy;
pub mod record;
pub mod store;

pub use collection::{MergeAction, RecordCollection, Schema};
pub use error::{Result, StoreError};
pub use policy::{Discrepancy, ReconcilePolicy, WAN_SPEED_TOLERANCE_MBPS};
pub use record::{ActivePorts, Field, Record, WanSpeed, TRACKED_PORTS};
pub use store::{ReconcileOutcome, RecordStore};

use std::path::Path;

/// Reconcile `observation` against the collection at `path` with the default policy
pub fn reconcile<P: AsRef<Path>>(path: P, observation: &Record) -> Result<ReconcileOutcome> {
    RecordStore::new(path.as_ref()).reconcile(observation)
}
