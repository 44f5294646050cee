//! Per-device freshness cache.
//!
//! Holds the latest reading of every device until it goes quiet for longer
//! than its timeout. Time is always passed in, never read from the clock.

use crate::mac_address::MacAddress;
use crate::reading::DecodedReading;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The cached state of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedState {
    pub reading: DecodedReading,
    pub last_seen: Instant,
}

impl CachedState {
    /// Whether this entry has outlived `timeout` at `now`.
    ///
    /// Exactly `timeout` since last seen is still fresh.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Latest reading per device.
#[derive(Debug, Default)]
pub struct FreshnessCache {
    entries: HashMap<MacAddress, CachedState>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `mac` with `reading`, seen at `now`.
    ///
    /// Nothing from a previous reading is carried over.
    pub fn insert(
        &mut self,
        mac: MacAddress,
        reading: DecodedReading,
        now: Instant,
    ) -> &CachedState {
        let state = CachedState {
            reading,
            last_seen: now,
        };
        self.entries.insert(mac, state);
        &self.entries[&mac]
    }

    pub fn get(&self, mac: MacAddress) -> Option<&CachedState> {
        self.entries.get(&mac)
    }

    /// The cached reading for `mac` if it is still fresh at `now`.
    pub fn current(
        &self,
        mac: MacAddress,
        now: Instant,
        timeout: Duration,
    ) -> Option<&DecodedReading> {
        self.entries
            .get(&mac)
            .filter(|state| !state.is_stale(now, timeout))
            .map(|state| &state.reading)
    }

    pub fn contains(&self, mac: MacAddress) -> bool {
        self.entries.contains_key(&mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn devices(&self) -> impl Iterator<Item = MacAddress> + '_ {
        self.entries.keys().copied()
    }

    /// Remove every entry that is stale at `now` and return the evicted
    /// devices, sorted. `timeout_for` yields each device's timeout.
    pub fn sweep(
        &mut self,
        now: Instant,
        timeout_for: impl Fn(MacAddress) -> Duration,
    ) -> Vec<MacAddress> {
        let mut evicted: Vec<MacAddress> = self
            .entries
            .iter()
            .filter(|(mac, state)| state.is_stale(now, timeout_for(**mac)))
            .map(|(mac, _)| *mac)
            .collect();
        evicted.sort();
        for mac in &evicted {
            self.entries.remove(mac);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{OTHER_MAC, TEST_MAC};

    const TIMEOUT: Duration = Duration::from_secs(300);

    fn reading(at: Instant) -> DecodedReading {
        let mut r = DecodedReading::empty(-60, at);
        r.temperature_c = Some(20.0);
        r
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);
        assert_eq!(cache.get(TEST_MAC).unwrap().last_seen, t0);
        assert!(cache.get(OTHER_MAC).is_none());
    }

    #[test]
    fn test_insert_replaces_instead_of_merging() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);

        let t1 = t0 + Duration::from_secs(1);
        let state = cache.insert(TEST_MAC, DecodedReading::empty(-61, t1), t1);
        assert_eq!(state.reading.temperature_c, None);
        assert_eq!(state.last_seen, t1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_boundary_is_strict() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);

        assert!(cache.sweep(t0 + TIMEOUT, |_| TIMEOUT).is_empty());
        assert!(cache.contains(TEST_MAC));

        let evicted = cache.sweep(t0 + TIMEOUT + Duration::from_millis(1), |_| TIMEOUT);
        assert_eq!(evicted, vec![TEST_MAC]);
        assert!(!cache.contains(TEST_MAC));
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);
        let later = t0 + TIMEOUT * 2;
        assert_eq!(cache.sweep(later, |_| TIMEOUT), vec![TEST_MAC]);
        assert!(cache.sweep(later, |_| TIMEOUT).is_empty());
    }

    #[test]
    fn test_sweep_uses_per_device_timeout() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);
        cache.insert(OTHER_MAC, reading(t0), t0);

        let short = Duration::from_secs(10);
        let evicted = cache.sweep(t0 + Duration::from_secs(11), |mac| {
            if mac == OTHER_MAC { short } else { TIMEOUT }
        });
        assert_eq!(evicted, vec![OTHER_MAC]);
        assert!(cache.contains(TEST_MAC));
    }

    #[test]
    fn test_current_hides_stale_entries() {
        let mut cache = FreshnessCache::new();
        let t0 = Instant::now();
        cache.insert(TEST_MAC, reading(t0), t0);
        assert!(cache.current(TEST_MAC, t0 + TIMEOUT, TIMEOUT).is_some());
        assert!(cache.current(TEST_MAC, t0 + TIMEOUT * 2, TIMEOUT).is_none());
    }
}
