//! Dispatcher settings and duration parsing.

use crate::advertisement::VendorMatch;
use crate::channel::MetricKind;
use crate::device::DeviceConfig;
use std::time::Duration;

/// Default freshness timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between dynamic binding re-resolutions.
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(60);

/// Process-wide settings consumed by the [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Admit devices that have neither a binding nor a configuration
    pub discover: bool,
    /// Timeout for devices without an override
    pub timeout: Duration,
    /// Minimum time between dynamic binding re-resolutions
    pub resolve_interval: Duration,
    /// Publish RSSI for devices without a configuration
    pub rssi: bool,
    /// Publish battery level for devices without a configuration
    pub battery_level: bool,
    /// How EYE payloads are recognised among manufacturer data
    pub vendor: VendorMatch,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discover: false,
            timeout: DEFAULT_TIMEOUT,
            resolve_interval: DEFAULT_RESOLVE_INTERVAL,
            rssi: true,
            battery_level: true,
            vendor: VendorMatch::default(),
        }
    }
}

impl Settings {
    /// Whether `kind` is published for a device with `config`.
    ///
    /// Only RSSI and battery level can be switched off; a device configuration
    /// takes precedence over the global toggles.
    pub fn metric_enabled(&self, config: Option<&DeviceConfig>, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Rssi => config.map_or(self.rssi, |c| c.rssi),
            MetricKind::BatteryLevel => config.map_or(self.battery_level, |c| c.battery_level),
            _ => true,
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use teltonika_eye_listener::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("300s").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (digits, unit, scale): (&str, &str, u64) = if let Some(n) = src.strip_suffix("ms") {
        (n, "milliseconds", 1)
    } else if let Some(n) = src.strip_suffix('h') {
        (n, "hours", 3_600_000)
    } else if let Some(n) = src.strip_suffix('m') {
        (n, "minutes", 60_000)
    } else if let Some(n) = src.strip_suffix('s') {
        (n, "seconds", 1000)
    } else {
        (src, "duration", 1000)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid {unit}: {digits}"))?;
    value
        .checked_mul(scale)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {src}"))
}
