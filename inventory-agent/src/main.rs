//! Inventory Agent - endpoint inventory probe
//!
//! One run of the agent:
//! - Identifies the host (MAC, computer name, timezone, IP, processor, OS)
//! - Measures WAN download speed and tracked local port exposure
//! - Reconciles the observation into the per-host CSV collection
//! - Reports discrepancies against the previously stored values

mod config;
mod discovery;
mod metrics;

use anyhow::{Context, Result};
use config::ProbeConfig;
use discovery::SystemInfo;
use inventory_store::{ReconcileOutcome, Record, RecordStore, WanSpeed};
use metrics::WanSpeedProbe;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "inventory_agent=info,inventory_store=info";

/// Single-run probe state
struct Probe {
    config: ProbeConfig,
    output_path: PathBuf,
}

impl Probe {
    async fn new() -> Result<Self> {
        info!("Initializing Inventory Agent v{}", env!("CARGO_PKG_VERSION"));

        let config = ProbeConfig::load()
            .await
            .context("Failed to load configuration")?;
        let output_path = config.output_path()?;

        Ok(Probe {
            config,
            output_path,
        })
    }

    /// Gather one observation of this host
    async fn collect(&self) -> Result<Record> {
        let system_info = SystemInfo::discover()
            .await
            .context("Failed to discover system information")?;

        let wan_probe = WanSpeedProbe::from_config(&self.config.wan);
        let (wan_speed, active_ports) = tokio::join!(
            wan_probe.measure(),
            metrics::collect_active_ports(self.config.ports.probe_timeout())
        );

        Ok(observation_from(system_info, wan_speed, active_ports))
    }

    /// Collect and reconcile into the output collection
    async fn run(&self) -> Result<ReconcileOutcome> {
        let observation = self.collect().await?;

        let store = RecordStore::new(&self.output_path).with_policy(self.config.reconcile.policy());
        let outcome = tokio::task::spawn_blocking(move || store.reconcile(&observation))
            .await
            .context("Reconcile task failed")?
            .with_context(|| format!("Failed to update {}", self.output_path.display()))?;

        Ok(outcome)
    }
}

fn observation_from(
    system_info: SystemInfo,
    wan_speed: Option<f64>,
    active_ports: inventory_store::ActivePorts,
) -> Record {
    Record {
        mac_address: system_info.network.primary_mac,
        computer_name: system_info.computer_name,
        system_timezone: system_info.timezone,
        ip_address: system_info.network.primary_ip.to_string(),
        processor_model: system_info.processor_model,
        operating_system: system_info.operating_system,
        wan_speed: WanSpeed::from(wan_speed),
        active_ports,
    }
}

/// Console report of a finished run
fn render_report(outcome: &ReconcileOutcome, output_path: &std::path::Path) -> String {
    let mut lines = Vec::new();

    if !outcome.discrepancies.is_empty() {
        lines.push("Data discrepancies found for this system:".to_string());
        for discrepancy in &outcome.discrepancies {
            lines.push(format!("- {}", discrepancy));
        }
    }

    lines.push(format!(
        "System information has been collected and stored in {}",
        output_path.display()
    ));
    lines.join("\n")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let probe = Probe::new().await.context("Failed to create probe")?;
    let outcome = probe.run().await.context("Probe execution failed")?;

    for discrepancy in &outcome.discrepancies {
        warn!("Discrepancy - {}", discrepancy);
    }
    println!("{}", render_report(&outcome, &probe.output_path));

    Ok(())
}
