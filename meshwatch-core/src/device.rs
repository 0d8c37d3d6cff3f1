//! Device records exchanged with the discovery layer
//!
//! The discovery layer (multicast listeners, neighbor-table readers, BLE
//! scanners) lives outside this crate. It hands the engine two record types:
//!
//! ```text
//! DiscoveredDevice { address, vendor?, type?, protocol, rssi?, lastSeen, isOnline }
//! RangingSample    { deviceId, anchorId, rssi, timestamp }
//! ```
//!
//! Field names serialize in camelCase so the records can cross an RPC
//! boundary unchanged. Hardware addresses are normalized on parse, which
//! makes [`DeviceId`] the stable key for every per-device store.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::geometry::AnchorId;
use crate::time::Timestamp;

/// Weakest RSSI accepted from the discovery layer (dBm)
pub const MIN_VALID_RSSI: f64 = -127.0;

/// Strongest RSSI accepted from the discovery layer (dBm)
pub const MAX_VALID_RSSI: f64 = 20.0;

/// Stable device identifier: a normalized hardware (MAC) address
///
/// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` and `aabbccddeeff`;
/// always displays as lowercase colon-separated octets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    /// Build from raw octets
    pub const fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Organizationally unique identifier prefix, `aa:bb:cc`
    pub fn oui(&self) -> String {
        format!("{:02x}:{:02x}:{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        value.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Discovery protocol that produced a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// ARP / neighbor table
    Arp,
    /// Multicast DNS
    Mdns,
    /// SSDP / UPnP
    Ssdp,
    /// NetBIOS name service
    Netbios,
    /// Bluetooth / BLE advertisement
    Bluetooth,
    /// Wi-Fi probe or beacon
    Wifi,
    /// ICMP reachability sweep
    Ping,
}

impl Protocol {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Arp => "arp",
            Protocol::Mdns => "mdns",
            Protocol::Ssdp => "ssdp",
            Protocol::Netbios => "netbios",
            Protocol::Bluetooth => "bluetooth",
            Protocol::Wifi => "wifi",
            Protocol::Ping => "ping",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    AccessPoint,
    Printer,
    SmartTv,
    StreamingDevice,
    GamingConsole,
    Laptop,
    Desktop,
    Smartphone,
    Tablet,
    SmartSpeaker,
    SmartHome,
    SecurityCamera,
    SmartDoorbell,
    SmartThermostat,
    SmartLight,
    SmartSwitch,
    SmartPlug,
    Unknown,
}

impl DeviceType {
    /// Exposure score used as an anomaly feature (infrastructure scores high)
    pub fn risk_score(&self) -> f64 {
        match self {
            DeviceType::Router | DeviceType::AccessPoint => 0.9,
            DeviceType::SmartTv => 0.8,
            DeviceType::Printer => 0.7,
            DeviceType::Laptop | DeviceType::Desktop => 0.6,
            DeviceType::Smartphone | DeviceType::Tablet => 0.5,
            _ => 0.3,
        }
    }
}

/// A device as reported by one discovery protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Hardware address
    pub address: DeviceId,
    /// Network-layer address, when the protocol reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_address: Option<IpAddr>,
    /// Advertised host name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Vendor name
    #[serde(default)]
    pub vendor: Option<String>,
    /// Device category
    #[serde(default, rename = "type")]
    pub device_type: Option<DeviceType>,
    /// Protocol that produced this sighting
    pub protocol: Protocol,
    /// Signal strength at the scanning host, if the protocol measures it
    #[serde(default)]
    pub rssi: Option<f64>,
    /// Time of sighting
    pub last_seen: Timestamp,
    /// Whether the device answered
    pub is_online: bool,
}

impl DiscoveredDevice {
    /// Minimal sighting with no classification
    pub fn new(address: DeviceId, protocol: Protocol, last_seen: Timestamp) -> Self {
        Self {
            address,
            network_address: None,
            hostname: None,
            vendor: None,
            device_type: None,
            protocol,
            rssi: None,
            last_seen,
            is_online: true,
        }
    }

    /// Set vendor
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Set device type
    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    /// Set RSSI
    pub fn with_rssi(mut self, rssi: f64) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Set host name
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Identity tuple compared by the identity-change detector
    pub fn fingerprint(&self) -> IdentityFingerprint {
        IdentityFingerprint {
            vendor: self.vendor.clone(),
            device_type: self.device_type,
            protocol: self.protocol,
        }
    }

    /// Reject records the rest of the engine cannot interpret
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(rssi) = self.rssi {
            validate_rssi(rssi)?;
        }
        Ok(())
    }
}

/// One RSSI observation of a device at an anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangingSample {
    /// Observed device
    pub device_id: DeviceId,
    /// Observing anchor
    pub anchor_id: AnchorId,
    /// Raw signal strength (dBm)
    pub rssi: f64,
    /// Observation time
    pub timestamp: Timestamp,
}

impl RangingSample {
    /// Reject non-finite or implausible RSSI
    pub fn validate(&self) -> CoreResult<()> {
        validate_rssi(self.rssi)
    }
}

/// (vendor, type, protocol) tuple identifying what a hardware address claims to be
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFingerprint {
    /// Vendor name
    pub vendor: Option<String>,
    /// Device category
    pub device_type: Option<DeviceType>,
    /// Discovery protocol
    pub protocol: Protocol,
}

impl IdentityFingerprint {
    /// Names of the fields that differ from `previous`
    ///
    /// A field that is unknown on either side is not treated as a change.
    pub fn changed_fields(&self, previous: &IdentityFingerprint) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let (Some(a), Some(b)) = (&self.vendor, &previous.vendor) {
            if !a.eq_ignore_ascii_case(b) {
                changed.push("vendor");
            }
        }
        if let (Some(a), Some(b)) = (self.device_type, previous.device_type) {
            if a != b && a != DeviceType::Unknown && b != DeviceType::Unknown {
                changed.push("type");
            }
        }
        if self.protocol != previous.protocol {
            changed.push("protocol");
        }
        changed
    }
}

/// Check an RSSI value is finite and physically plausible
pub fn validate_rssi(rssi: f64) -> CoreResult<()> {
    if !rssi.is_finite() {
        return Err(CoreError::Parse {
            field: "rssi",
            reason: "not a finite number".into(),
        });
    }
    if !(MIN_VALID_RSSI..=MAX_VALID_RSSI).contains(&rssi) {
        return Err(CoreError::Parse {
            field: "rssi",
            reason: format!("{} dBm outside [{}, {}]", rssi, MIN_VALID_RSSI, MAX_VALID_RSSI),
        });
    }
    Ok(())
}
