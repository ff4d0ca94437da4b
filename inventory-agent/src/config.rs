//! Probe configuration
//!
//! Handles:
//! - Output location of the persisted collection
//! - WAN speed test endpoint and time budget
//! - Local port probe timeout
//! - Reconciliation tolerance

use anyhow::{Context, Result};
use inventory_store::{ReconcilePolicy, WAN_SPEED_TOLERANCE_MBPS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "INVENTORY_AGENT_CONFIG";

/// File name used when no output path is configured
pub const DEFAULT_OUTPUT_FILE: &str = "endpoint-scanner-output.csv";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Defaults to `endpoint-scanner-output.csv` beside the executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub wan: WanConfig,
    pub ports: PortsConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WanConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Mbps of drift tolerated before a WAN speed change is reported
    pub wan_speed_tolerance: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            wan: WanConfig::default(),
            ports: PortsConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl Default for WanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://speed.cloudflare.com/__down?bytes=25000000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self { probe_timeout_ms: 200 }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            wan_speed_tolerance: WAN_SPEED_TOLERANCE_MBPS,
        }
    }
}

impl WanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PortsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl ReconcileConfig {
    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            wan_speed_tolerance: self.wan_speed_tolerance,
        }
    }
}

impl ProbeConfig {
    /// Load config from the OS-specific location, writing defaults on first run
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if config_path.exists() {
            Self::load_from(&config_path).await
        } else {
            info!("No config at {}, using defaults", config_path.display());
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path).await {
                debug!("Could not write default config: {:#}", e);
            }
            Ok(config)
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// `$INVENTORY_AGENT_CONFIG`, else `<config dir>/inventory-agent/config.toml`
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("inventory-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Where the collection is persisted
    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.output_path {
            return Ok(path.clone());
        }

        let exe = std::env::current_exe().context("Could not locate running executable")?;
        let dir = exe
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Executable has no parent directory"))?;
        Ok(dir.join(DEFAULT_OUTPUT_FILE))
    }
}
