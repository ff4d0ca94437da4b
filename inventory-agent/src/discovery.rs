//! Host identification for the inventory probe
//!
//! This module handles:
//! - Primary MAC address detection with priority (Ethernet > WiFi > Other)
//! - Outbound IP address detection
//! - Host description (computer name, timezone, processor, operating system)

use anyhow::{Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use std::net::IpAddr;
use std::path::Path;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

/// Network interface carrying a hardware address
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub mac: String,
    pub ip: IpAddr,
    pub interface_type: InterfaceType,
}

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
    Other,
}

/// Network identity of the host
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub primary_mac: String,
    pub primary_ip: IpAddr,
    pub interfaces: Vec<NetworkInterface>,
}

/// Identity and description of the host
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub computer_name: String,
    pub timezone: String,
    pub processor_model: String,
    pub operating_system: String,
    pub network: NetworkInfo,
}

impl SystemInfo {
    /// Discover complete system information
    pub async fn discover() -> Result<Self> {
        info!("Starting system discovery...");

        let network = NetworkInfo::discover()
            .await
            .context("Failed to discover network information")?;

        let computer_name = gethostname::gethostname()
            .to_string_lossy()
            .to_string();

        let timezone = detect_timezone();
        let processor_model = detect_processor_model();
        let operating_system = detect_operating_system();

        info!(
            "Discovery complete - MAC: {}, Computer: {}, OS: {} ({} interfaces)",
            network.primary_mac,
            computer_name,
            operating_system,
            network.interfaces.len()
        );

        Ok(SystemInfo {
            computer_name,
            timezone,
            processor_model,
            operating_system,
            network,
        })
    }
}

impl NetworkInfo {
    /// Discover network interfaces, primary MAC and outbound IP
    pub async fn discover() -> Result<Self> {
        debug!("Enumerating network interfaces...");

        let if_addrs = get_if_addrs().context("Failed to enumerate network interfaces")?;

        let mut interfaces: Vec<NetworkInterface> = Vec::new();
        for if_addr in if_addrs {
            if if_addr.is_loopback() {
                continue;
            }
            // One entry per interface; IPv4 wins over IPv6
            if let Some(existing) = interfaces.iter_mut().find(|i| i.name == if_addr.name) {
                if let IfAddr::V4(v4) = &if_addr.addr {
                    if existing.ip.is_ipv6() {
                        existing.ip = IpAddr::V4(v4.ip);
                    }
                }
                continue;
            }

            let ip = match &if_addr.addr {
                IfAddr::V4(v4) => IpAddr::V4(v4.ip),
                IfAddr::V6(v6) => IpAddr::V6(v6.ip),
            };

            if let Some(mac) = Self::get_interface_mac(&if_addr.name) {
                let interface = NetworkInterface {
                    name: if_addr.name.clone(),
                    mac,
                    ip,
                    interface_type: Self::classify_interface(&if_addr.name),
                };

                debug!("Found interface: {} ({})", interface.name, interface.mac);
                interfaces.push(interface);
            }
        }

        let primary_mac = match Self::select_primary_mac(&interfaces) {
            Ok(mac) => mac,
            Err(e) => {
                warn!("{}, falling back to default MAC", e);
                Self::default_mac()?
            }
        };

        let primary_ip = Self::detect_primary_ip(&interfaces)?;

        info!(
            "Selected primary MAC: {} from {} interfaces, IP: {}",
            primary_mac,
            interfaces.len(),
            primary_ip
        );

        Ok(NetworkInfo {
            primary_mac,
            primary_ip,
            interfaces,
        })
    }

    /// Get the formatted MAC address of a specific interface
    fn get_interface_mac(interface_name: &str) -> Option<String> {
        match mac_address::mac_address_by_name(interface_name) {
            Ok(Some(mac)) => {
                let bytes = mac.bytes();
                if bytes.iter().all(|&b| b == 0) {
                    debug!("Ignoring null MAC on {}", interface_name);
                    None
                } else {
                    Some(format_mac(&bytes))
                }
            }
            Ok(None) => {
                debug!("No MAC found for interface: {}", interface_name);
                None
            }
            Err(e) => {
                debug!("Error getting MAC for {}: {}", interface_name, e);
                None
            }
        }
    }

    /// MAC the OS reports as default when no interface could be ranked
    fn default_mac() -> Result<String> {
        mac_address::get_mac_address()
            .context("Failed to read default MAC address")?
            .map(|mac| format_mac(&mac.bytes()))
            .ok_or_else(|| anyhow::anyhow!("No MAC address available on this host"))
    }

    /// Outbound IPv4 address, else the first interface address
    fn detect_primary_ip(interfaces: &[NetworkInterface]) -> Result<IpAddr> {
        match local_ip_address::local_ip() {
            Ok(ip) => Ok(ip),
            Err(e) => {
                warn!("Could not detect outbound IP ({}), using interface address", e);
                interfaces
                    .iter()
                    .find(|i| i.ip.is_ipv4())
                    .or_else(|| interfaces.first())
                    .map(|i| i.ip)
                    .ok_or_else(|| anyhow::anyhow!("No IP address available on this host"))
            }
        }
    }

    /// Classify interface type based on name patterns
    fn classify_interface(name: &str) -> InterfaceType {
        let name_lower = name.to_lowercase();

        if name_lower.starts_with("lo") {
            return InterfaceType::Loopback;
        }

        if name_lower.contains("wlan") || name_lower.contains("wifi") ||
           name_lower.starts_with("wlp") || name_lower.starts_with("wlo") {
            return InterfaceType::Wireless;
        }

        if name_lower.starts_with("eth") || name_lower.starts_with("en") {
            return InterfaceType::Ethernet;
        }

        InterfaceType::Other
    }

    /// Select primary MAC address based on interface priority
    fn select_primary_mac(interfaces: &[NetworkInterface]) -> Result<String> {
        if interfaces.is_empty() {
            return Err(anyhow::anyhow!("No network interfaces found"));
        }

        for wanted in [InterfaceType::Ethernet, InterfaceType::Wireless] {
            if let Some(interface) = interfaces.iter().find(|i| i.interface_type == wanted) {
                info!("Selected {:?} interface as primary: {}", wanted, interface.name);
                return Ok(interface.mac.clone());
            }
        }

        if let Some(interface) = interfaces
            .iter()
            .find(|i| i.interface_type != InterfaceType::Loopback)
        {
            warn!("No Ethernet/WiFi found, using first interface: {}", interface.name);
            return Ok(interface.mac.clone());
        }

        Err(anyhow::anyhow!("No suitable network interface found"))
    }
}

/// Lowercase colon-separated hex
pub fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Zone name from `TZ`, `/etc/timezone` or `/etc/localtime`, else the UTC offset
fn detect_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }

    if let Ok(content) = std::fs::read_to_string("/etc/timezone") {
        let tz = content.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }

    if let Ok(target) = std::fs::read_link("/etc/localtime") {
        if let Some(zone) = zone_from_localtime_target(&target) {
            return zone;
        }
    }

    chrono::Local::now().format("%:z").to_string()
}

/// `/usr/share/zoneinfo/Europe/Paris` -> `Europe/Paris`
fn zone_from_localtime_target(target: &Path) -> Option<String> {
    let target = target.to_string_lossy();
    target
        .split_once("zoneinfo/")
        .map(|(_, zone)| zone.trim_matches('/').to_string())
        .filter(|zone| !zone.is_empty())
}

fn detect_processor_model() -> String {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));

    sys.cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// `"<system> <release>"`, e.g. `Linux 6.1.0-18-amd64`
fn detect_operating_system() -> String {
    let system = os_family(std::env::consts::OS);
    match System::kernel_version() {
        Some(release) if !release.trim().is_empty() => format!("{} {}", system, release.trim()),
        _ => system,
    }
}

fn os_family(os: &str) -> String {
    match os {
        "linux" | "android" => "Linux".to_string(),
        "windows" => "Windows".to_string(),
        "macos" | "ios" => "Darwin".to_string(),
        "freebsd" => "FreeBSD".to_string(),
        "openbsd" => "OpenBSD".to_string(),
        "netbsd" => "NetBSD".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn iface(name: &str, mac: &str) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            mac: mac.to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            interface_type: NetworkInfo::classify_interface(name),
        }
    }

    #[test]
    fn test_interface_classification() {
        assert_eq!(NetworkInfo::classify_interface("eth0"), InterfaceType::Ethernet);
        assert_eq!(NetworkInfo::classify_interface("enp3s0"), InterfaceType::Ethernet);
        assert_eq!(NetworkInfo::classify_interface("wlan0"), InterfaceType::Wireless);
        assert_eq!(NetworkInfo::classify_interface("wlo1"), InterfaceType::Wireless);
        assert_eq!(NetworkInfo::classify_interface("lo"), InterfaceType::Loopback);
        assert_eq!(NetworkInfo::classify_interface("docker0"), InterfaceType::Other);
    }

    #[test]
    fn test_primary_mac_priority() {
        let interfaces = vec![
            iface("docker0", "02:42:00:00:00:01"),
            iface("wlan0", "aa:bb:cc:dd:ee:02"),
            iface("eth0", "aa:bb:cc:dd:ee:03"),
        ];
        assert_eq!(
            NetworkInfo::select_primary_mac(&interfaces).unwrap(),
            "aa:bb:cc:dd:ee:03"
        );

        let wireless_only = vec![iface("docker0", "02:42:00:00:00:01"), iface("wlp2s0", "aa:bb:cc:dd:ee:02")];
        assert_eq!(
            NetworkInfo::select_primary_mac(&wireless_only).unwrap(),
            "aa:bb:cc:dd:ee:02"
        );

        let other_only = vec![iface("docker0", "02:42:00:00:00:01")];
        assert_eq!(
            NetworkInfo::select_primary_mac(&other_only).unwrap(),
            "02:42:00:00:00:01"
        );

        assert!(NetworkInfo::select_primary_mac(&[]).is_err());
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(&[0xAA, 0xBB, 0x0C, 0x0D, 0xEE, 0xFF]), "aa:bb:0c:0d:ee:ff");
        assert!(inventory_store::record::is_canonical_mac(&format_mac(&[1, 2, 3, 4, 5, 6])));
    }

    #[test]
    fn test_zone_from_localtime_target() {
        assert_eq!(
            zone_from_localtime_target(Path::new("/usr/share/zoneinfo/Europe/Paris")),
            Some("Europe/Paris".to_string())
        );
        assert_eq!(
            zone_from_localtime_target(Path::new("../usr/share/zoneinfo/UTC")),
            Some("UTC".to_string())
        );
        assert_eq!(zone_from_localtime_target(Path::new("/etc/custom")), None);
    }

    #[test]
    fn test_os_family() {
        assert_eq!(os_family("linux"), "Linux");
        assert_eq!(os_family("macos"), "Darwin");
        assert_eq!(os_family("haiku"), "haiku");
    }

    #[test]
    fn test_host_description_not_empty() {
        assert!(!detect_processor_model().is_empty());
        assert!(!detect_operating_system().is_empty());
        assert!(!detect_timezone().is_empty());
    }
}
