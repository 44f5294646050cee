//! Output channels and the metrics they carry.
//!
//! A channel is an opaque sink owned by the host. Bindings only keep a weak
//! reference to it, so a channel dropped by its owner silently turns into a
//! no-op sink.

use crate::reading::DecodedReading;
use std::fmt;
use std::sync::{Arc, Weak};

/// A value published to a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Numeric(f64),
    Boolean(bool),
}

/// The kind of values a metric carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Boolean,
}

impl ValueKind {
    /// The "unavailable" sentinel for this kind.
    pub fn unavailable(self) -> Value {
        match self {
            ValueKind::Numeric => Value::Numeric(f64::NAN),
            ValueKind::Boolean => Value::Boolean(false),
        }
    }
}

/// A metric that can be bound to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Temperature,
    Humidity,
    MovementCount,
    Pitch,
    Roll,
    BatteryVoltage,
    BatteryLevel,
    Rssi,
    Movement,
    Magnetic,
    LowBattery,
}

impl MetricKind {
    pub const COUNT: usize = 11;

    pub const ALL: [MetricKind; MetricKind::COUNT] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::MovementCount,
        MetricKind::Pitch,
        MetricKind::Roll,
        MetricKind::BatteryVoltage,
        MetricKind::BatteryLevel,
        MetricKind::Rssi,
        MetricKind::Movement,
        MetricKind::Magnetic,
        MetricKind::LowBattery,
    ];

    /// Position in [`MetricKind::ALL`], used for fixed-size per-kind tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            MetricKind::Movement | MetricKind::Magnetic | MetricKind::LowBattery => {
                ValueKind::Boolean
            }
            _ => ValueKind::Numeric,
        }
    }

    /// Field name used by line-oriented outputs.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
            MetricKind::MovementCount => "movement_count",
            MetricKind::Pitch => "pitch",
            MetricKind::Roll => "roll",
            MetricKind::BatteryVoltage => "battery_voltage",
            MetricKind::BatteryLevel => "battery_level",
            MetricKind::Rssi => "rssi",
            MetricKind::Movement => "movement",
            MetricKind::Magnetic => "magnetic",
            MetricKind::LowBattery => "low_battery",
        }
    }

    /// The value this metric takes in `reading`, or `None` when the field was
    /// not transmitted and must not be published.
    pub fn extract(self, reading: &DecodedReading) -> Option<Value> {
        let num = |v: f64| Value::Numeric(v);
        match self {
            MetricKind::Temperature => reading.temperature_c.map(num),
            MetricKind::Humidity => reading.humidity_pct.map(num),
            MetricKind::MovementCount => reading.movement().map(|(c, _)| num(f64::from(c))),
            MetricKind::Pitch => reading.pitch_deg.map(|p| num(f64::from(p))),
            MetricKind::Roll => reading.roll_deg.map(|r| num(f64::from(r))),
            MetricKind::BatteryVoltage => reading.battery_voltage_v.map(num),
            MetricKind::BatteryLevel => reading.battery_level_pct.map(num),
            MetricKind::Rssi => Some(num(f64::from(reading.rssi_dbm))),
            MetricKind::Movement => reading.movement().map(|(_, a)| Value::Boolean(a)),
            MetricKind::Magnetic => reading.magnetic().map(Value::Boolean),
            MetricKind::LowBattery => reading.low_battery().map(Value::Boolean),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sink that accepts published values.
pub trait Channel: Send + Sync {
    fn publish(&self, value: Value);
}

/// A non-owning, possibly unset, reference to a [`Channel`].
#[derive(Clone, Default)]
pub struct ChannelRef(Option<Weak<dyn Channel>>);

impl ChannelRef {
    /// A reference to no channel; publishing to it does nothing.
    pub fn unset() -> Self {
        Self(None)
    }

    pub fn to<C: Channel + 'static>(channel: &Arc<C>) -> Self {
        let weak = Arc::downgrade(channel);
        Self(Some(weak))
    }

    /// Whether the referenced channel is still alive.
    pub fn is_live(&self) -> bool {
        self.0.as_ref().is_some_and(|w| w.strong_count() > 0)
    }

    /// Publish `value`, returning whether a live channel received it.
    pub fn publish(&self, value: Value) -> bool {
        match self.0.as_ref().and_then(Weak::upgrade) {
            Some(channel) => {
                channel.publish(value);
                true
            }
            None => false,
        }
    }
}

impl From<&Arc<dyn Channel>> for ChannelRef {
    fn from(channel: &Arc<dyn Channel>) -> Self {
        Self(Some(Arc::downgrade(channel)))
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("ChannelRef(unset)"),
            Some(_) if self.is_live() => f.write_str("ChannelRef(live)"),
            Some(_) => f.write_str("ChannelRef(dropped)"),
        }
    }
}
