//! Device registry with presence hysteresis
//!
//! ```text
//!            seen                 missed × N
//!   ┌──────────────────┐   ┌───────────────────┐
//!   ▼                  │   │                   ▼
//! Online ──missed──→ Online(misses<N) ──→ Offline ──seen──→ Online
//! ```
//!
//! A single dropped scan only bumps the miss counter; the device flips to
//! offline when the counter reaches the threshold, exactly once per outage.
//!
//! A miss is only counted when the protocol the device was last reported
//! through finished its scan. A failed or timed-out transport says nothing
//! about the devices behind it.

use std::collections::HashMap;

use log::info;
use meshwatch_core::{DeviceId, DiscoveredDevice, Protocol, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Presence state of a known device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Registry entry for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    /// Latest merged sighting
    pub device: DiscoveredDevice,
    /// Presence state
    pub state: PresenceState,
    /// Scans in a row that did not see the device
    pub consecutive_misses: u32,
    /// First sighting
    pub first_seen: Timestamp,
}

/// State changes caused by one discovery scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Addresses seen for the first time
    pub new_devices: Vec<DeviceId>,
    /// Devices seen again after being marked offline
    pub reappeared: Vec<DeviceId>,
    /// Devices that just reached the miss threshold
    pub went_offline: Vec<DeviceId>,
    /// Sightings accepted in this scan
    pub seen: usize,
}

/// Merge sightings of the same address from several protocols
///
/// Input order is source registration order. The first sighting of an
/// address keeps its protocol; later ones only fill fields it lacks, and the
/// strongest RSSI and latest time win.
pub fn merge_sightings(sightings: impl IntoIterator<Item = DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let mut order: Vec<DeviceId> = Vec::new();
    let mut merged: HashMap<DeviceId, DiscoveredDevice> = HashMap::new();

    for sighting in sightings {
        match merged.get_mut(&sighting.address) {
            None => {
                order.push(sighting.address.clone());
                merged.insert(sighting.address.clone(), sighting);
            }
            Some(existing) => {
                if existing.vendor.is_none() {
                    existing.vendor = sighting.vendor;
                }
                if existing.device_type.is_none() {
                    existing.device_type = sighting.device_type;
                }
                if existing.hostname.is_none() {
                    existing.hostname = sighting.hostname;
                }
                if existing.network_address.is_none() {
                    existing.network_address = sighting.network_address;
                }
                existing.rssi = match (existing.rssi, sighting.rssi) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                existing.last_seen = existing.last_seen.max(sighting.last_seen);
                existing.is_online |= sighting.is_online;
            }
        }
    }

    order.into_iter().filter_map(|id| merged.remove(&id)).collect()
}

/// Known devices keyed by hardware address
pub struct DeviceRegistry {
    offline_after: u32,
    devices: RwLock<HashMap<DeviceId, DeviceEntry>>,
}

impl DeviceRegistry {
    /// Empty registry flipping devices offline after `offline_after` misses
    pub fn new(offline_after: u32) -> Self {
        Self {
            offline_after: offline_after.max(1),
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Apply one scan
    ///
    /// `seen` must already be merged. Known devices absent from it count a
    /// miss when their protocol is among `completed`.
    pub fn observe_scan(&self, seen: &[DiscoveredDevice], completed: &[Protocol]) -> ScanReport {
        let mut report = ScanReport {
            seen: seen.len(),
            ..Default::default()
        };
        let mut devices = self.devices.write();

        for sighting in seen {
            match devices.get_mut(&sighting.address) {
                None => {
                    info!("device online device={} protocol={} new=true", sighting.address, sighting.protocol);
                    report.new_devices.push(sighting.address.clone());
                    devices.insert(
                        sighting.address.clone(),
                        DeviceEntry {
                            device: sighting.clone(),
                            state: PresenceState::Online,
                            consecutive_misses: 0,
                            first_seen: sighting.last_seen,
                        },
                    );
                }
                Some(entry) => {
                    if entry.state == PresenceState::Offline {
                        info!("device online device={} reappeared=true", sighting.address);
                        report.reappeared.push(sighting.address.clone());
                    }
                    let mut device = sighting.clone();
                    if device.vendor.is_none() {
                        device.vendor = entry.device.vendor.take();
                    }
                    if device.device_type.is_none() {
                        device.device_type = entry.device.device_type;
                    }
                    if device.hostname.is_none() {
                        device.hostname = entry.device.hostname.take();
                    }
                    entry.device = device;
                    entry.state = PresenceState::Online;
                    entry.consecutive_misses = 0;
                }
            }
        }

        for (id, entry) in devices.iter_mut() {
            if entry.state == PresenceState::Offline
                || !completed.contains(&entry.device.protocol)
                || seen.iter().any(|s| &s.address == id)
            {
                continue;
            }
            entry.consecutive_misses += 1;
            if entry.consecutive_misses >= self.offline_after {
                info!("device offline device={} misses={}", id, entry.consecutive_misses);
                entry.state = PresenceState::Offline;
                entry.device.is_online = false;
                report.went_offline.push(id.clone());
            }
        }

        report.went_offline.sort();
        report
    }

    /// Entry for one device
    pub fn get(&self, id: &DeviceId) -> Option<DeviceEntry> {
        self.devices.read().get(id).cloned()
    }

    /// Every entry
    pub fn snapshot(&self) -> Vec<DeviceEntry> {
        let mut entries: Vec<DeviceEntry> = self.devices.read().values().cloned().collect();
        entries.sort_by(|a, b| a.device.address.cmp(&b.device.address));
        entries
    }

    /// Devices currently online
    pub fn online_count(&self) -> usize {
        self.devices
            .read()
            .values()
            .filter(|e| e.state == PresenceState::Online)
            .count()
    }

    /// Remove devices last seen before `cutoff`
    pub fn prune(&self, cutoff: Timestamp) -> Vec<DeviceId> {
        let mut devices = self.devices.write();
        let stale: Vec<DeviceId> = devices
            .iter()
            .filter(|(_, e)| e.device.last_seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            devices.remove(id);
        }
        stale
    }

    /// Known devices
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether no device is known
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::{DeviceType, Protocol};

    fn id(n: u8) -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 1, n])
    }

    const ARP: &[Protocol] = &[Protocol::Arp];

    fn seen(n: u8, ts: Timestamp) -> DiscoveredDevice {
        DiscoveredDevice::new(id(n), Protocol::Arp, ts)
    }

    #[test]
    fn test_hysteresis_cycle() {
        let registry = DeviceRegistry::new(3);
        assert_eq!(registry.observe_scan(&[seen(1, 0)], ARP).new_devices, vec![id(1)]);

        assert!(registry.observe_scan(&[], ARP).went_offline.is_empty());
        assert!(registry.observe_scan(&[], ARP).went_offline.is_empty());
        assert_eq!(registry.get(&id(1)).unwrap().consecutive_misses, 2);
        assert_eq!(registry.observe_scan(&[], ARP).went_offline, vec![id(1)]);
        // Already offline: no second transition
        assert!(registry.observe_scan(&[], ARP).went_offline.is_empty());

        let back = registry.observe_scan(&[seen(1, 10)], ARP);
        assert_eq!(back.reappeared, vec![id(1)]);
        assert!(back.new_devices.is_empty());
        assert_eq!(registry.get(&id(1)).unwrap().state, PresenceState::Online);
    }

    #[test]
    fn test_single_miss_resets() {
        let registry = DeviceRegistry::new(2);
        registry.observe_scan(&[seen(1, 0)], ARP);
        registry.observe_scan(&[], ARP);
        registry.observe_scan(&[seen(1, 1)], ARP);
        assert!(registry.observe_scan(&[], ARP).went_offline.is_empty());
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn test_merge_prefers_first_protocol() {
        let arp = DiscoveredDevice::new(id(1), Protocol::Arp, 5).with_rssi(-70.0);
        let mdns = DiscoveredDevice::new(id(1), Protocol::Mdns, 9)
            .with_vendor("Apple")
            .with_type(DeviceType::Laptop)
            .with_rssi(-60.0);
        let other = seen(2, 5);

        let merged = merge_sightings(vec![arp, other, mdns]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].protocol, Protocol::Arp);
        assert_eq!(merged[0].vendor.as_deref(), Some("Apple"));
        assert_eq!(merged[0].device_type, Some(DeviceType::Laptop));
        assert_eq!(merged[0].rssi, Some(-60.0));
        assert_eq!(merged[0].last_seen, 9);
        assert_eq!(merged[1].address, id(2));
    }

    #[test]
    fn test_known_fields_survive_vague_sightings() {
        let registry = DeviceRegistry::new(3);
        registry.observe_scan(&[seen(1, 0).with_vendor("Netgear")], ARP);
        registry.observe_scan(&[seen(1, 1)], ARP);
        assert_eq!(registry.get(&id(1)).unwrap().device.vendor.as_deref(), Some("Netgear"));
    }

    #[test]
    fn test_failed_protocol_counts_no_miss() {
        let registry = DeviceRegistry::new(2);
        let mdns = DiscoveredDevice::new(id(2), Protocol::Mdns, 0);
        registry.observe_scan(&[seen(1, 0), mdns], &[Protocol::Arp, Protocol::Mdns]);

        // mDNS keeps failing while ARP completes empty
        for _ in 0..4 {
            let report = registry.observe_scan(&[], ARP);
            assert!(!report.went_offline.contains(&id(2)));
        }
        assert_eq!(registry.get(&id(1)).unwrap().state, PresenceState::Offline);
        assert_eq!(registry.get(&id(2)).unwrap().consecutive_misses, 0);

        // Nothing completed at all
        let report = registry.observe_scan(&[], &[]);
        assert!(report.went_offline.is_empty());
        assert_eq!(registry.get(&id(2)).unwrap().state, PresenceState::Online);
    }

    #[test]
    fn test_prune() {
        let registry = DeviceRegistry::new(3);
        registry.observe_scan(&[seen(1, 100), seen(2, 500)], ARP);
        assert_eq!(registry.prune(200), vec![id(1)]);
        assert_eq!(registry.len(), 1);
    }
}
