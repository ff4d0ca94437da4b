//! WAN throughput measurement
//!
//! Downloads a large payload from a speed test endpoint and derives the
//! download rate. The whole test is bounded by a deadline; if the deadline hits
//! mid-transfer the rate is computed from what arrived so far.

use crate::config::WanConfig;
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WanSpeedProbe {
    enabled: bool,
    url: String,
    timeout: Duration,
}

impl WanSpeedProbe {
    pub fn from_config(config: &WanConfig) -> Self {
        Self {
            enabled: config.enabled,
            url: config.url.clone(),
            timeout: config.timeout(),
        }
    }

    /// Download speed in Mbps, `None` if the test is disabled or fails
    pub async fn measure(&self) -> Option<f64> {
        if !self.enabled {
            info!("WAN speed test disabled");
            return None;
        }

        match self.download().await {
            Ok(mbps) => {
                info!("WAN download speed: {:.2} Mbps", mbps);
                Some(mbps)
            }
            Err(e) => {
                warn!("Error fetching WAN speed: {:#}", e);
                None
            }
        }
    }

    async fn download(&self) -> Result<f64> {
        let deadline = Instant::now() + self.timeout;
        let client = reqwest::Client::builder()
            .user_agent(concat!("inventory-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!("Starting WAN speed test against {}", self.url);
        let mut response = timeout_at(deadline, client.get(&self.url).send())
            .await
            .map_err(|_| anyhow!("timed out waiting for {}", self.url))??
            .error_for_status()?;

        let started = Instant::now();
        let mut bytes: u64 = 0;
        loop {
            match timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => bytes += chunk.len() as u64,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("Deadline reached after {} bytes", bytes);
                    break;
                }
            }
        }

        throughput_mbps(bytes, started.elapsed())
            .ok_or_else(|| anyhow!("no data received from {}", self.url))
    }
}

/// Megabits per second, rounded to 2 decimals
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some(round2(bytes as f64 * 8.0 / secs / 1_000_000.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
