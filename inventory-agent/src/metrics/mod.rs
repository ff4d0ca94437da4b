//! Performance and exposure metrics for the inventory probe
//!
//! Provides:
//! - WAN download throughput (degrades to "unknown" on any failure)
//! - Locally bound TCP ports from the tracked well-known set

pub mod ports;
pub mod wan;

pub use ports::collect_active_ports;
pub use wan::WanSpeedProbe;
