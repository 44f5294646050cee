//! Identity registry: which channels want which device's metrics.
//!
//! Bindings come in three flavours, all resolving to a single [`MacAddress`]:
//!
//! - keyed: a device name or MAC string, resolved once against the configured
//!   devices when the binding is made
//! - exact: a fixed MAC address
//! - dynamic: an expression producing a MAC string, re-evaluated by
//!   [`Registry::resolve_dynamic`] on the periodic tick
//!
//! Lookups go through an identity-keyed index holding one binding list per
//! [`MetricKind`], so fan-out is the same regardless of how a binding resolved.

use crate::channel::{ChannelRef, MetricKind};
use crate::device::DeviceMap;
use crate::mac_address::MacAddress;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Handle to a registered binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(usize);

/// An expression yielding the MAC address a dynamic binding should follow.
///
/// Returning `None`, or a string that is not a MAC address, leaves the binding
/// unresolved until the expression changes.
pub trait MacExpression: Send {
    fn evaluate(&mut self) -> Option<String>;
}

impl<F> MacExpression for F
where
    F: FnMut() -> Option<String> + Send,
{
    fn evaluate(&mut self) -> Option<String> {
        self()
    }
}

/// How a new binding finds its device.
pub enum BindingTarget {
    /// Configured device name, or a MAC string
    Keyed(String),
    /// Fixed device
    Exact(MacAddress),
    /// Expression re-evaluated on every resolve pass
    Dynamic(Box<dyn MacExpression>),
}

impl fmt::Debug for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingTarget::Keyed(key) => f.debug_tuple("Keyed").field(key).finish(),
            BindingTarget::Exact(mac) => f.debug_tuple("Exact").field(mac).finish(),
            BindingTarget::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Errors returned when registering a binding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("no configured device named '{0}' and it is not a MAC address")]
    UnknownDevice(String),
}

struct DynamicState {
    expression: Box<dyn MacExpression>,
    last_output: Option<String>,
    dirty: bool,
}

enum Mode {
    Keyed,
    Exact,
    Dynamic(DynamicState),
}

struct Binding {
    kind: MetricKind,
    channel: ChannelRef,
    mode: Mode,
    resolved: Option<MacAddress>,
}

/// Per-device binding lists, one per metric kind.
#[derive(Debug, Default)]
struct DeviceBindings([Vec<BindingId>; MetricKind::COUNT]);

impl DeviceBindings {
    fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }
}

/// A dynamic binding whose resolved device changed during a resolve pass.
#[derive(Debug, Clone)]
pub struct Rebind {
    pub binding: BindingId,
    pub kind: MetricKind,
    pub channel: ChannelRef,
    pub previous: Option<MacAddress>,
    pub current: Option<MacAddress>,
}

/// Outcome of [`Registry::resolve_dynamic`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub rebinds: Vec<Rebind>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.rebinds.is_empty()
    }

    /// Every identity that gained or lost a binding.
    pub fn changed(&self) -> HashSet<MacAddress> {
        self.rebinds
            .iter()
            .flat_map(|r| [r.previous, r.current])
            .flatten()
            .collect()
    }
}

/// Maps device identities to the channels bound to them.
pub struct Registry {
    bindings: BTreeMap<BindingId, Binding>,
    next_id: usize,
    index: HashMap<MacAddress, DeviceBindings>,
    resolve_interval: Duration,
    last_resolved: Option<Instant>,
}

impl Registry {
    /// Create an empty registry that re-resolves dynamic bindings at most once
    /// per `resolve_interval`.
    pub fn new(resolve_interval: Duration) -> Self {
        Self {
            bindings: BTreeMap::new(),
            next_id: 0,
            index: HashMap::new(),
            resolve_interval,
            last_resolved: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Register a binding of `kind` to `channel`.
    ///
    /// Keyed targets are matched against device names in `devices` first and
    /// then parsed as a MAC address. Dynamic targets are evaluated once right
    /// away so they are usable before the next resolve pass.
    pub fn bind(
        &mut self,
        kind: MetricKind,
        target: BindingTarget,
        channel: ChannelRef,
        devices: &DeviceMap,
    ) -> Result<BindingId, BindError> {
        let (mode, resolved) = match target {
            BindingTarget::Keyed(key) => {
                let mac = resolve_key(&key, devices).ok_or(BindError::UnknownDevice(key))?;
                (Mode::Keyed, Some(mac))
            }
            BindingTarget::Exact(mac) => (Mode::Exact, Some(mac)),
            BindingTarget::Dynamic(mut expression) => {
                let output = expression.evaluate();
                let resolved = parse_output(output.as_deref());
                let state = DynamicState {
                    expression,
                    last_output: output,
                    dirty: false,
                };
                (Mode::Dynamic(state), resolved)
            }
        };

        Ok(self.insert(kind, channel, mode, resolved))
    }

    pub fn bind_exact(
        &mut self,
        kind: MetricKind,
        mac: MacAddress,
        channel: ChannelRef,
    ) -> BindingId {
        self.insert(kind, channel, Mode::Exact, Some(mac))
    }

    /// Remove a binding. Returns whether it existed.
    pub fn unbind(&mut self, id: BindingId) -> bool {
        if !self.bindings.contains_key(&id) {
            return false;
        }
        self.attach(id, None);
        self.bindings.remove(&id);
        true
    }

    /// The device a binding currently follows.
    pub fn resolved(&self, id: BindingId) -> Option<MacAddress> {
        self.bindings.get(&id).and_then(|b| b.resolved)
    }

    /// Force a dynamic binding to re-parse its expression on the next pass,
    /// even when the expression output is unchanged.
    pub fn invalidate(&mut self, id: BindingId) {
        if let Some(Binding {
            mode: Mode::Dynamic(state),
            ..
        }) = self.bindings.get_mut(&id)
        {
            state.dirty = true;
        }
    }

    /// Channels bound to `mac` for `kind`.
    pub fn bindings_for(
        &self,
        mac: MacAddress,
        kind: MetricKind,
    ) -> impl Iterator<Item = &ChannelRef> {
        self.index
            .get(&mac)
            .map(|entry| entry.0[kind.index()].as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.bindings.get(id))
            .map(|binding| &binding.channel)
    }

    /// Whether any binding of any kind currently resolves to `mac`.
    pub fn has_bindings(&self, mac: MacAddress) -> bool {
        self.index.get(&mac).is_some_and(|entry| !entry.is_empty())
    }

    /// Re-evaluate dynamic bindings.
    ///
    /// Does nothing when called again within the resolve interval. A binding
    /// whose expression output is unchanged is skipped without parsing.
    pub fn resolve_dynamic(&mut self, now: Instant) -> Resolution {
        if let Some(last) = self.last_resolved
            && now.saturating_duration_since(last) < self.resolve_interval
        {
            return Resolution::default();
        }
        self.last_resolved = Some(now);

        let mut updates = Vec::new();
        for (&id, binding) in self.bindings.iter_mut() {
            let Mode::Dynamic(state) = &mut binding.mode else {
                continue;
            };
            let output = state.expression.evaluate();
            if output == state.last_output && !state.dirty {
                continue;
            }
            state.dirty = false;
            let current = parse_output(output.as_deref());
            state.last_output = output;
            if current != binding.resolved {
                updates.push((id, current));
            }
        }

        let mut resolution = Resolution::default();
        for (id, current) in updates {
            let Some(previous) = self.bindings.get(&id).map(|b| b.resolved) else {
                continue;
            };
            self.attach(id, current);
            let Some(binding) = self.bindings.get(&id) else {
                continue;
            };
            debug!(
                "{} binding {:?} moved from {:?} to {:?}",
                binding.kind, id, previous, current
            );
            resolution.rebinds.push(Rebind {
                binding: id,
                kind: binding.kind,
                channel: binding.channel.clone(),
                previous,
                current,
            });
        }
        resolution
    }

    fn insert(
        &mut self,
        kind: MetricKind,
        channel: ChannelRef,
        mode: Mode,
        resolved: Option<MacAddress>,
    ) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.bindings.insert(
            id,
            Binding {
                kind,
                channel,
                mode,
                resolved: None,
            },
        );
        self.attach(id, resolved);
        id
    }

    /// Move binding `id` to `mac` in the index.
    fn attach(&mut self, id: BindingId, mac: Option<MacAddress>) {
        let Some(binding) = self.bindings.get_mut(&id) else {
            return;
        };
        let kind = binding.kind.index();
        if let Some(old) = binding.resolved.take()
            && let Some(entry) = self.index.get_mut(&old)
        {
            entry.0[kind].retain(|b| *b != id);
            if entry.is_empty() {
                self.index.remove(&old);
            }
        }
        binding.resolved = mac;
        if let Some(mac) = mac {
            self.index.entry(mac).or_default().0[kind].push(id);
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dynamic = self
            .bindings
            .values()
            .filter(|b| matches!(b.mode, Mode::Dynamic(_)))
            .count();
        let keyed = self
            .bindings
            .values()
            .filter(|b| matches!(b.mode, Mode::Keyed))
            .count();
        f.debug_struct("Registry")
            .field("bindings", &self.bindings.len())
            .field("keyed", &keyed)
            .field("dynamic", &dynamic)
            .field("devices", &self.index.len())
            .finish()
    }
}

fn resolve_key(key: &str, devices: &DeviceMap) -> Option<MacAddress> {
    devices
        .values()
        .find(|d| d.name.as_deref() == Some(key))
        .map(|d| d.mac)
        .or_else(|| key.parse().ok())
}

fn parse_output(output: Option<&str>) -> Option<MacAddress> {
    output.and_then(|s| s.parse().ok())
}
