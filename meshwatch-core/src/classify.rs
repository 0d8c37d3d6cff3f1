//! Vendor and device-type classification
//!
//! Discovery protocols rarely report both fields, so missing values are
//! inferred in order of reliability:
//!
//! ```text
//! hostname substring  →  vendor substring  →  OUI prefix table
//! ```
//!
//! Patterns shorter than three characters ("tv", "hp", "ap") only match a
//! whole hostname token, otherwise "laptop" would classify as an access point.

use crate::device::{DeviceId, DeviceType, DiscoveredDevice};

/// OUI prefix to vendor
static OUI_VENDORS: &[(&str, &str)] = &[
    ("00:00:0c", "Cisco"),
    ("00:01:42", "Cisco"),
    ("00:01:96", "Cisco"),
    ("00:0f:66", "Cisco"),
    ("00:1b:0d", "Cisco"),
    ("00:03:93", "Apple"),
    ("00:0a:95", "Apple"),
    ("00:0d:93", "Apple"),
    ("00:16:cb", "Apple"),
    ("00:17:f2", "Apple"),
    ("00:19:e3", "Apple"),
    ("00:1b:63", "Apple"),
    ("00:1c:b3", "Apple"),
    ("00:1e:c2", "Apple"),
    ("00:21:e9", "Apple"),
    ("00:25:00", "Apple"),
    ("00:26:08", "Apple"),
    ("00:26:bb", "Apple"),
    ("00:12:fb", "Samsung"),
    ("00:13:77", "Samsung"),
    ("00:15:99", "Samsung"),
    ("00:16:32", "Samsung"),
    ("00:1a:8a", "Samsung"),
    ("00:1d:25", "Samsung"),
    ("00:21:19", "Samsung"),
    ("00:01:e6", "HP"),
    ("00:02:a5", "HP"),
    ("00:04:ea", "HP"),
    ("00:08:c7", "HP"),
    ("00:0b:cd", "HP"),
    ("00:10:e3", "HP"),
    ("00:14:38", "HP"),
    ("00:17:a4", "HP"),
    ("00:05:5d", "D-Link"),
    ("00:07:7d", "D-Link"),
    ("00:0d:88", "D-Link"),
    ("00:0f:3d", "D-Link"),
    ("00:11:95", "D-Link"),
    ("00:15:e9", "D-Link"),
    ("00:1b:11", "D-Link"),
    ("00:1d:0f", "TP-Link"),
    ("00:21:27", "TP-Link"),
    ("00:23:cd", "TP-Link"),
    ("00:25:86", "TP-Link"),
    ("00:27:19", "TP-Link"),
    ("00:09:5b", "Netgear"),
    ("00:0f:b5", "Netgear"),
    ("00:14:6c", "Netgear"),
    ("00:1b:2f", "Netgear"),
    ("00:22:3f", "Netgear"),
    ("00:24:b2", "Netgear"),
    ("00:06:25", "Linksys"),
    ("00:0c:41", "Linksys"),
    ("00:12:17", "Linksys"),
    ("00:14:bf", "Linksys"),
    ("00:18:39", "Linksys"),
    ("00:1a:70", "Linksys"),
    ("00:25:9c", "Linksys"),
];

/// Hostname pattern to type, most specific first
static HOSTNAME_PATTERNS: &[(&str, DeviceType)] = &[
    ("chromecast", DeviceType::StreamingDevice),
    ("appletv", DeviceType::StreamingDevice),
    ("roku", DeviceType::StreamingDevice),
    ("playstation", DeviceType::GamingConsole),
    ("nintendo", DeviceType::GamingConsole),
    ("xbox", DeviceType::GamingConsole),
    ("ps4", DeviceType::GamingConsole),
    ("ps5", DeviceType::GamingConsole),
    ("thermostat", DeviceType::SmartThermostat),
    ("doorbell", DeviceType::SmartDoorbell),
    ("homepod", DeviceType::SmartSpeaker),
    ("alexa", DeviceType::SmartSpeaker),
    ("echo", DeviceType::SmartSpeaker),
    ("camera", DeviceType::SecurityCamera),
    ("ring", DeviceType::SecurityCamera),
    ("gateway", DeviceType::Router),
    ("router", DeviceType::Router),
    ("printer", DeviceType::Printer),
    ("print", DeviceType::Printer),
    ("canon", DeviceType::Printer),
    ("epson", DeviceType::Printer),
    ("brother", DeviceType::Printer),
    ("iphone", DeviceType::Smartphone),
    ("android", DeviceType::Smartphone),
    ("phone", DeviceType::Smartphone),
    ("ipad", DeviceType::Tablet),
    ("tablet", DeviceType::Tablet),
    ("laptop", DeviceType::Laptop),
    ("desktop", DeviceType::Desktop),
    ("nest", DeviceType::SmartHome),
    ("bulb", DeviceType::SmartLight),
    ("light", DeviceType::SmartLight),
    ("outlet", DeviceType::SmartPlug),
    ("plug", DeviceType::SmartPlug),
    ("switch", DeviceType::SmartSwitch),
    ("samsung", DeviceType::SmartTv),
    ("sony", DeviceType::SmartTv),
    ("tv", DeviceType::SmartTv),
    ("lg", DeviceType::SmartTv),
    ("hp", DeviceType::Printer),
    ("ap", DeviceType::AccessPoint),
];

/// Vendor pattern to type
static VENDOR_PATTERNS: &[(&str, DeviceType)] = &[
    ("apple", DeviceType::Smartphone),
    ("samsung", DeviceType::Smartphone),
    ("canon", DeviceType::Printer),
    ("epson", DeviceType::Printer),
    ("brother", DeviceType::Printer),
    ("hp", DeviceType::Printer),
    ("cisco", DeviceType::Router),
    ("netgear", DeviceType::Router),
    ("linksys", DeviceType::Router),
    ("d-link", DeviceType::Router),
    ("tp-link", DeviceType::Router),
    ("intel", DeviceType::Laptop),
];

/// Stateless classifier over the built-in tables
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceClassifier;

impl DeviceClassifier {
    /// Vendor from the OUI prefix of `address`
    pub fn vendor_for(&self, address: &DeviceId) -> Option<&'static str> {
        let oui = address.oui();
        OUI_VENDORS
            .iter()
            .find(|(prefix, _)| *prefix == oui)
            .map(|(_, vendor)| *vendor)
    }

    /// Best-effort device type
    pub fn type_for(
        &self,
        address: &DeviceId,
        hostname: Option<&str>,
        vendor: Option<&str>,
    ) -> DeviceType {
        if let Some(host) = hostname {
            let host = host.to_ascii_lowercase();
            if let Some(t) = match_patterns(HOSTNAME_PATTERNS, &host) {
                return t;
            }
        }

        let vendor = vendor.map(str::to_string).or_else(|| self.vendor_for(address).map(str::to_string));
        if let Some(v) = vendor {
            let v = v.to_ascii_lowercase();
            if let Some(t) = match_patterns(VENDOR_PATTERNS, &v) {
                return t;
            }
        }

        DeviceType::Unknown
    }

    /// Fill in vendor and type where the discovery protocol left them empty
    pub fn enrich(&self, device: &mut DiscoveredDevice) {
        if device.vendor.is_none() {
            device.vendor = self.vendor_for(&device.address).map(str::to_string);
        }
        if device.device_type.is_none() {
            let t = self.type_for(
                &device.address,
                device.hostname.as_deref(),
                device.vendor.as_deref(),
            );
            if t != DeviceType::Unknown {
                device.device_type = Some(t);
            }
        }
    }
}

fn match_patterns(patterns: &[(&str, DeviceType)], text: &str) -> Option<DeviceType> {
    patterns.iter().find_map(|(pattern, t)| {
        let hit = if pattern.len() < 3 {
            text.split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token == *pattern)
        } else {
            text.contains(pattern)
        };
        hit.then_some(*t)
    })
}
