//! Advertisement dispatcher.
//!
//! Owns the [`Registry`] and the [`FreshnessCache`] and drives both: every
//! advertisement goes through vendor matching, admission, decoding, the cache
//! and fan-out; every tick re-resolves dynamic bindings and evicts devices that
//! went quiet. Everything runs on the caller's thread and never blocks.

use crate::advertisement::AdvertisementRecord;
use crate::cache::FreshnessCache;
use crate::channel::{ChannelRef, MetricKind, Value};
use crate::config::Settings;
use crate::decoder::{DecodeError, decode};
use crate::device::{DeviceConfig, DeviceMap, device_name};
use crate::mac_address::MacAddress;
use crate::reading::DecodedReading;
use crate::registry::{BindError, BindingId, BindingTarget, Registry};
use log::{Level, debug, info};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors for a single advertisement. None of them is fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The payload matched the vendor signature but could not be decoded
    #[error("{mac}: {source}")]
    Decode {
        mac: MacAddress,
        #[source]
        source: DecodeError,
    },
    /// The device is neither configured nor bound, and discovery is off
    #[error("{0}: no binding and discovery disabled")]
    NoBindingAndDiscoveryDisabled(MacAddress),
}

impl DispatchError {
    /// Whether the error indicates a malformed advertisement rather than a
    /// policy decision.
    pub fn is_malfunction(&self) -> bool {
        matches!(self, DispatchError::Decode { .. })
    }

    /// Log level the host should report this error at.
    pub fn level(&self) -> Level {
        if self.is_malfunction() {
            Level::Warn
        } else {
            Level::Debug
        }
    }
}

/// Successful outcome of [`Dispatcher::handle_advertisement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// No manufacturer data matched the vendor signature
    NotMatched,
    /// Decoded and cached; `publications` values reached live channels
    Published {
        mac: MacAddress,
        publications: usize,
    },
}

/// What a tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Devices evicted from the cache, sorted
    pub evicted: Vec<MacAddress>,
    /// Dynamic bindings that moved to another device
    pub rebinds: usize,
}

/// Supplies channels for admitted devices that have no bindings yet.
///
/// Asked at most once per device, right before its first fan-out. When an
/// unconfigured device times out its provisioned bindings are removed and
/// [`Provisioner::release`] is called, so a later re-arrival is provisioned
/// again.
pub trait Provisioner: Send {
    fn provision(
        &mut self,
        mac: MacAddress,
        config: Option<&DeviceConfig>,
    ) -> Vec<(MetricKind, ChannelRef)>;

    /// The channels provisioned for `mac` are no longer bound.
    fn release(&mut self, _mac: MacAddress) {}
}

/// The advertisement-processing core.
pub struct Dispatcher {
    settings: Settings,
    devices: DeviceMap,
    registry: Registry,
    cache: FreshnessCache,
    discovered: BTreeSet<MacAddress>,
    provisioned: HashMap<MacAddress, Vec<BindingId>>,
    provisioner: Option<Box<dyn Provisioner>>,
}

impl Dispatcher {
    pub fn new(settings: Settings, devices: DeviceMap) -> Self {
        let registry = Registry::new(settings.resolve_interval);
        Self {
            settings,
            devices,
            registry,
            cache: FreshnessCache::new(),
            discovered: BTreeSet::new(),
            provisioned: HashMap::new(),
            provisioner: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioner = Some(Box::new(provisioner));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    pub fn device(&self, mac: MacAddress) -> Option<&DeviceConfig> {
        self.devices.get(&mac)
    }

    /// Devices admitted through discovery, i.e. without a configuration, that
    /// have not timed out since.
    pub fn discovered_devices(&self) -> impl Iterator<Item = MacAddress> + '_ {
        self.discovered.iter().copied()
    }

    /// Bind `kind` of the device selected by `target` to `channel`.
    pub fn bind(
        &mut self,
        kind: MetricKind,
        target: BindingTarget,
        channel: ChannelRef,
    ) -> Result<BindingId, BindError> {
        self.registry.bind(kind, target, channel, &self.devices)
    }

    pub fn bind_exact(
        &mut self,
        kind: MetricKind,
        mac: MacAddress,
        channel: ChannelRef,
    ) -> BindingId {
        self.registry.bind_exact(kind, mac, channel)
    }

    /// Freshness timeout for `mac`.
    pub fn timeout_for(&self, mac: MacAddress) -> Duration {
        timeout_for(&self.settings, &self.devices, mac)
    }

    /// The cached reading for `mac`, if it has not timed out at `now`.
    pub fn current(&self, mac: MacAddress, now: Instant) -> Option<&DecodedReading> {
        self.cache.current(mac, now, self.timeout_for(mac))
    }

    /// Process one advertisement received at `now`.
    pub fn handle_advertisement(
        &mut self,
        record: &AdvertisementRecord,
        now: Instant,
    ) -> Result<Dispatched, DispatchError> {
        let Some(payload) = record.vendor_payload(self.settings.vendor) else {
            return Ok(Dispatched::NotMatched);
        };
        let mac = record.mac;

        let configured = self.devices.contains_key(&mac);
        if !self.settings.discover && !configured && !self.registry.has_bindings(mac) {
            return Err(DispatchError::NoBindingAndDiscoveryDisabled(mac));
        }

        let reading = decode(payload, record.rssi_dbm, now)
            .map_err(|source| DispatchError::Decode { mac, source })?;

        if !configured && self.discovered.insert(mac) {
            info!("Discovered Teltonika EYE sensor {mac}");
        }
        self.provision(mac);

        let state = self.cache.insert(mac, reading, now);
        let config = self.devices.get(&mac);
        let mut publications = 0;
        for kind in MetricKind::ALL {
            if !self.settings.metric_enabled(config, kind) {
                continue;
            }
            let Some(value) = kind.extract(&state.reading) else {
                continue;
            };
            publications += publish_all(self.registry.bindings_for(mac, kind), value);
        }
        debug!("[{mac}] Published {publications} values");

        Ok(Dispatched::Published { mac, publications })
    }

    /// Re-resolve dynamic bindings, then evict devices that timed out.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let resolution = self.registry.resolve_dynamic(now);
        for rebind in &resolution.rebinds {
            if rebind.previous.is_some() {
                rebind.channel.publish(rebind.kind.value_kind().unavailable());
            }
            let Some(mac) = rebind.current else {
                continue;
            };
            let config = self.devices.get(&mac);
            if !self.settings.metric_enabled(config, rebind.kind) {
                continue;
            }
            let timeout = timeout_for(&self.settings, &self.devices, mac);
            if let Some(value) = self
                .cache
                .current(mac, now, timeout)
                .and_then(|reading| rebind.kind.extract(reading))
            {
                rebind.channel.publish(value);
            }
        }

        let (settings, devices) = (&self.settings, &self.devices);
        let evicted = self
            .cache
            .sweep(now, |mac| timeout_for(settings, devices, mac));
        for &mac in &evicted {
            let config = self.devices.get(&mac);
            for kind in MetricKind::ALL {
                if !self.settings.metric_enabled(config, kind) {
                    continue;
                }
                publish_all(
                    self.registry.bindings_for(mac, kind),
                    kind.value_kind().unavailable(),
                );
            }
            info!(
                "[{}] Device timeout reached, channels set to unavailable",
                device_name(mac, config)
            );
            self.forget(mac);
        }

        TickReport {
            evicted,
            rebinds: resolution.rebinds.len(),
        }
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        info!("Teltonika EYE dispatcher:");
        info!("  Discover devices: {}", self.settings.discover);
        info!("  Global timeout: {:?}", self.settings.timeout);
        info!("  Resolve interval: {:?}", self.settings.resolve_interval);
        info!("  Vendor match: {:?}", self.settings.vendor);
        info!("  RSSI enabled by default: {}", self.settings.rssi);
        info!(
            "  Battery level enabled by default: {}",
            self.settings.battery_level
        );
        info!("  Bindings: {:?}", self.registry);
        let mut devices: Vec<&DeviceConfig> = self.devices.values().collect();
        devices.sort_by_key(|d| d.mac);
        info!("  Configured devices: {}", devices.len());
        for cfg in devices {
            info!("    - {} ({})", device_name(cfg.mac, Some(cfg)), cfg.mac);
            info!("      Timeout: {:?}", self.timeout_for(cfg.mac));
            info!("      RSSI: {}, battery level: {}", cfg.rssi, cfg.battery_level);
        }
    }

    fn provision(&mut self, mac: MacAddress) {
        if self.provisioned.contains_key(&mac) || self.registry.has_bindings(mac) {
            return;
        }
        let Some(provisioner) = self.provisioner.as_mut() else {
            return;
        };
        let channels = provisioner.provision(mac, self.devices.get(&mac));
        debug!("[{mac}] Provisioned {} channels", channels.len());
        let ids = channels
            .into_iter()
            .map(|(kind, channel)| self.registry.bind_exact(kind, mac, channel))
            .collect();
        self.provisioned.insert(mac, ids);
    }

    /// Drop per-device state of an evicted device that is not configured.
    fn forget(&mut self, mac: MacAddress) {
        if self.devices.contains_key(&mac) {
            return;
        }
        self.discovered.remove(&mac);
        let Some(ids) = self.provisioned.remove(&mac) else {
            return;
        };
        for id in ids {
            self.registry.unbind(id);
        }
        if let Some(provisioner) = self.provisioner.as_mut() {
            provisioner.release(mac);
        }
        debug!("[{mac}] Released provisioned channels");
    }
}

fn timeout_for(settings: &Settings, devices: &DeviceMap, mac: MacAddress) -> Duration {
    devices
        .get(&mac)
        .and_then(DeviceConfig::timeout_override)
        .unwrap_or(settings.timeout)
}

fn publish_all<'a>(channels: impl Iterator<Item = &'a ChannelRef>, value: Value) -> usize {
    channels.filter(|channel| channel.publish(value)).count()
}
