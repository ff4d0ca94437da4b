//! Fixed-shape host record
//!
//! A `Record` is one host's observation snapshot. Columns are addressed through
//! the `Field` enum so the CSV layer never deals with free-form string keys.

use crate::error::StoreError;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// Well-known TCP ports whose local exposure is tracked
pub const TRACKED_PORTS: [u16; 20] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139,
    143, 443, 445, 993, 995, 1723, 3306, 3389, 5900, 8080,
];

/// Separator used inside the `Active Ports` cell
pub const PORT_SEPARATOR: &str = "; ";

/// Record columns, in canonical header order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    MacAddress,
    ComputerName,
    SystemTimezone,
    IpAddress,
    ProcessorModel,
    OperatingSystem,
    WanSpeed,
    ActivePorts,
}

impl Field {
    /// Canonical column order used when a collection is created
    pub const ALL: [Field; 8] = [
        Field::MacAddress,
        Field::ComputerName,
        Field::SystemTimezone,
        Field::IpAddress,
        Field::ProcessorModel,
        Field::OperatingSystem,
        Field::WanSpeed,
        Field::ActivePorts,
    ];

    /// Header text for this column
    pub fn name(self) -> &'static str {
        match self {
            Field::MacAddress => "MAC Address",
            Field::ComputerName => "Computer Name",
            Field::SystemTimezone => "System Timezone",
            Field::IpAddress => "IP Address",
            Field::ProcessorModel => "Processor Model",
            Field::OperatingSystem => "Operating System",
            Field::WanSpeed => "WAN Speed",
            Field::ActivePorts => "Active Ports",
        }
    }

    /// Resolve a header cell. Surrounding whitespace is ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// WAN download throughput in Mbps
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WanSpeed {
    /// Measurement failed or was skipped (empty cell)
    #[default]
    Unmeasured,
    Measured(f64),
    /// Stored cell that is not a number; kept verbatim so a rewrite loses nothing
    Unparsed(String),
}

impl WanSpeed {
    /// Parse a stored cell
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return WanSpeed::Unmeasured;
        }
        match trimmed.parse::<f64>() {
            Ok(mbps) if mbps.is_finite() => WanSpeed::Measured(mbps),
            _ => WanSpeed::Unparsed(raw.to_string()),
        }
    }
}

impl From<Option<f64>> for WanSpeed {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(mbps) if mbps.is_finite() => WanSpeed::Measured(mbps),
            _ => WanSpeed::Unmeasured,
        }
    }
}

impl fmt::Display for WanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WanSpeed::Unmeasured => Ok(()),
            WanSpeed::Measured(mbps) => write!(f, "{:.2}", mbps),
            WanSpeed::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Tracked ports bound locally, in their persisted `"22; 443"` form
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivePorts(String);

impl ActivePorts {
    /// Keep only tracked ports, sorted ascending without duplicates
    pub fn from_ports<I>(ports: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let tracked: BTreeSet<u16> = ports
            .into_iter()
            .filter(|port| TRACKED_PORTS.contains(port))
            .collect();

        let joined = tracked
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(PORT_SEPARATOR);

        ActivePorts(joined)
    }

    /// Wrap a cell read from disk as-is
    pub fn from_stored(raw: impl Into<String>) -> Self {
        ActivePorts(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivePorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One host's snapshot, keyed by MAC address
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub mac_address: String,
    pub computer_name: String,
    pub system_timezone: String,
    pub ip_address: String,
    pub processor_model: String,
    pub operating_system: String,
    pub wan_speed: WanSpeed,
    pub active_ports: ActivePorts,
}

impl Record {
    /// Stringified cell value for a column
    pub fn value(&self, field: Field) -> Cow<'_, str> {
        match field {
            Field::MacAddress => Cow::Borrowed(&self.mac_address),
            Field::ComputerName => Cow::Borrowed(&self.computer_name),
            Field::SystemTimezone => Cow::Borrowed(&self.system_timezone),
            Field::IpAddress => Cow::Borrowed(&self.ip_address),
            Field::ProcessorModel => Cow::Borrowed(&self.processor_model),
            Field::OperatingSystem => Cow::Borrowed(&self.operating_system),
            Field::WanSpeed => Cow::Owned(self.wan_speed.to_string()),
            Field::ActivePorts => Cow::Borrowed(self.active_ports.as_str()),
        }
    }

    /// Set a column from its persisted text
    pub fn set_value(&mut self, field: Field, raw: &str) {
        match field {
            Field::MacAddress => self.mac_address = raw.to_string(),
            Field::ComputerName => self.computer_name = raw.to_string(),
            Field::SystemTimezone => self.system_timezone = raw.to_string(),
            Field::IpAddress => self.ip_address = raw.to_string(),
            Field::ProcessorModel => self.processor_model = raw.to_string(),
            Field::OperatingSystem => self.operating_system = raw.to_string(),
            Field::WanSpeed => self.wan_speed = WanSpeed::parse(raw),
            Field::ActivePorts => self.active_ports = ActivePorts::from_stored(raw),
        }
    }

    /// Check the identity key before the record is allowed into a collection
    pub fn validate(&self) -> Result<(), StoreError> {
        if !is_canonical_mac(&self.mac_address) {
            return Err(StoreError::InvalidObservation(format!(
                "MAC address '{}' is not lowercase colon-separated hex",
                self.mac_address
            )));
        }
        Ok(())
    }
}

/// `aa:bb:cc:dd:ee:ff`, lowercase only
pub fn is_canonical_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets.iter().all(|octet| {
            octet.len() == 2
                && octet
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        })
}
