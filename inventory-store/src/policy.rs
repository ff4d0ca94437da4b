//! Field comparison policy
//!
//! Identity and descriptive fields must match exactly. WAN speed is a noisy
//! measurement, so it is only flagged once it drifts past a tolerance.

use crate::record::{Field, Record, WanSpeed};
use std::fmt;

/// Allowed WAN speed drift, in Mbps, before a change is reported
pub const WAN_SPEED_TOLERANCE_MBPS: f64 = 10.0;

/// A field whose new observation differs from the stored one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub field: Field,
    pub previous: String,
    pub current: String,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: previous '{}', current '{}'",
            self.field, self.previous, self.current
        )
    }
}

/// Per-field comparison rules applied during a merge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    pub wan_speed_tolerance: f64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            wan_speed_tolerance: WAN_SPEED_TOLERANCE_MBPS,
        }
    }
}

impl ReconcilePolicy {
    /// Compare `observed` against `stored` over the given columns
    ///
    /// Only columns present in the stored schema are passed in, so a field the
    /// old file never had cannot produce a discrepancy.
    pub fn compare(&self, stored: &Record, observed: &Record, columns: &[Field]) -> Vec<Discrepancy> {
        columns
            .iter()
            .filter_map(|&field| self.compare_field(field, stored, observed))
            .collect()
    }

    fn compare_field(&self, field: Field, stored: &Record, observed: &Record) -> Option<Discrepancy> {
        let flagged = match field {
            Field::WanSpeed => self.wan_speed_drifted(&stored.wan_speed, &observed.wan_speed),
            _ => stored.value(field) != observed.value(field),
        };

        flagged.then(|| Discrepancy {
            field,
            previous: stored.value(field).into_owned(),
            current: observed.value(field).into_owned(),
        })
    }

    /// Whether a WAN speed change is worth reporting
    ///
    /// A missing observation is never reported. A stored value that is empty or
    /// not a number cannot be compared and is always reported.
    pub fn wan_speed_drifted(&self, stored: &WanSpeed, observed: &WanSpeed) -> bool {
        match (stored, observed) {
            (_, WanSpeed::Unmeasured) => false,
            (WanSpeed::Measured(previous), WanSpeed::Measured(current)) => {
                (current - previous).abs() > self.wan_speed_tolerance
            }
            (_, WanSpeed::Measured(_)) => true,
            (_, WanSpeed::Unparsed(_)) => stored.to_string() != observed.to_string(),
        }
    }
}
