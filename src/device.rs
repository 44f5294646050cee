//! Per-device configuration.
//!
//! Maps a MAC address to a human-readable name, an optional freshness timeout
//! and the channels that should be exposed for the device.

use crate::mac_address::MacAddress;
use crate::config::parse_duration;
use std::collections::HashMap;
use std::time::Duration;

/// Lookup table of configured devices.
pub type DeviceMap = HashMap<MacAddress, DeviceConfig>;

/// Configuration for one known device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub mac: MacAddress,
    /// Human-readable name (e.g., "Fridge")
    pub name: Option<String>,
    /// Freshness timeout overriding the global one; zero means "use global"
    pub timeout: Option<Duration>,
    /// Publish the RSSI metric for this device
    pub rssi: bool,
    /// Publish the battery level metric for this device
    pub battery_level: bool,
}

impl DeviceConfig {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            name: None,
            timeout: None,
            rssi: true,
            battery_level: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The override timeout, if one is set and nonzero.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

/// Display name for a device: its configured name, or one derived from the MAC.
pub fn device_name(mac: MacAddress, config: Option<&DeviceConfig>) -> String {
    config
        .and_then(|c| c.name.as_deref())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Teltonika_{}", mac.to_underscored()))
}

/// Parse a device from a string in the format `MAC[=NAME][@TIMEOUT]`.
///
/// # Example
/// ```
/// use teltonika_eye_listener::device::parse_device;
/// use std::time::Duration;
///
/// let device = parse_device("7C:D9:F4:00:00:01=Fridge@10m").unwrap();
/// assert_eq!(device.name.as_deref(), Some("Fridge"));
/// assert_eq!(device.timeout, Some(Duration::from_secs(600)));
/// ```
pub fn parse_device(src: &str) -> Result<DeviceConfig, String> {
    let (rest, timeout) = match src.rsplit_once('@') {
        Some((rest, timeout)) => (rest, Some(parse_duration(timeout)?)),
        None => (src, None),
    };
    let (address, name) = match rest.split_once('=') {
        Some((address, name)) => (address, Some(name.trim())),
        None => (rest, None),
    };

    let mac: MacAddress = address.parse().map_err(|e| format!("{e}"))?;
    let mut device = DeviceConfig::new(mac);
    device.name = name.filter(|n| !n.is_empty()).map(str::to_string);
    device.timeout = timeout;
    Ok(device)
}

/// Convert a slice of device configurations into a lookup map.
///
/// Later entries for the same MAC replace earlier ones.
pub fn to_map(devices: &[DeviceConfig]) -> DeviceMap {
    devices.iter().map(|d| (d.mac, d.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;

    #[test]
    fn test_parse_device_mac_only() {
        let device = parse_device("7C:D9:F4:00:00:01").unwrap();
        assert_eq!(device, DeviceConfig::new(TEST_MAC));
    }

    #[test]
    fn test_parse_device_with_name_and_spaces() {
        let device = parse_device("7C:D9:F4:00:00:01=Living Room").unwrap();
        assert_eq!(device.name.as_deref(), Some("Living Room"));
        assert_eq!(device.timeout, None);
    }

    #[test]
    fn test_parse_device_with_timeout_only() {
        let device = parse_device("7C:D9:F4:00:00:01@90s").unwrap();
        assert_eq!(device.name, None);
        assert_eq!(device.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_device_invalid() {
        assert!(parse_device("no-mac=Kitchen").is_err());
        assert!(parse_device("7C:D9:F4:00:00:01=Kitchen@soon").is_err());
    }

    #[test]
    fn test_timeout_override_ignores_zero() {
        let device = DeviceConfig::new(TEST_MAC).with_timeout(Duration::ZERO);
        assert_eq!(device.timeout_override(), None);
        let device = device.with_timeout(Duration::from_secs(5));
        assert_eq!(device.timeout_override(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_device_name() {
        assert_eq!(device_name(TEST_MAC, None), "Teltonika_7C_D9_F4_00_00_01");
        let cfg = DeviceConfig::new(TEST_MAC).with_name("Freezer");
        assert_eq!(device_name(TEST_MAC, Some(&cfg)), "Freezer");
    }

    #[test]
    fn test_to_map() {
        let devices = vec![
            DeviceConfig::new(TEST_MAC).with_name("Kitchen"),
            DeviceConfig::new(TEST_MAC).with_name("Bedroom"),
        ];
        let map = to_map(&devices);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&TEST_MAC].name.as_deref(), Some("Bedroom"));
    }
}
