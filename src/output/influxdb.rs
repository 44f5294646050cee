//! InfluxDB line protocol output channel.

use crate::channel::{Channel, MetricKind, Value};
use crate::device::{DeviceConfig, device_name};
use crate::mac_address::MacAddress;
use crate::output::LineSink;
use log::trace;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl FieldValue {
    /// Line protocol has no representation for NaN or infinities.
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Numeric(v) if v.is_finite() => Some(FieldValue::Float(v)),
            Value::Numeric(_) => None,
            Value::Boolean(b) => Some(FieldValue::Boolean(b)),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape commas, equals signs and spaces in tag keys and values.
fn escape_tag(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", escape_tag(key), escape_tag(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", key, value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    if let Some(time) = data_point.timestamp
        && let Ok(since_epoch) = time.duration_since(SystemTime::UNIX_EPOCH)
    {
        write!(fmt, " {}", since_epoch.as_nanos())?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// A channel writing each published value as one line protocol point.
///
/// Points carry the device's `mac` and `name` as tags and a single field
/// named after the metric. Unavailable numeric values are not representable
/// and are skipped.
pub struct LineChannel {
    sink: LineSink,
    measurement: String,
    tags: BTreeMap<String, String>,
    kind: MetricKind,
}

impl LineChannel {
    pub fn new(
        sink: LineSink,
        measurement: impl Into<String>,
        mac: MacAddress,
        config: Option<&DeviceConfig>,
        kind: MetricKind,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("mac".to_string(), mac.to_string());
        tags.insert("name".to_string(), device_name(mac, config));
        Self {
            sink,
            measurement: measurement.into(),
            tags,
            kind,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    fn to_data_point(&self, field: FieldValue, timestamp: SystemTime) -> DataPoint {
        let mut field_set = BTreeMap::new();
        field_set.insert(self.kind.name().to_string(), field);
        DataPoint {
            measurement: self.measurement.clone(),
            tag_set: self.tags.clone(),
            field_set,
            timestamp: Some(timestamp),
        }
    }
}

impl Channel for LineChannel {
    fn publish(&self, value: Value) {
        let Some(field) = FieldValue::from_value(value) else {
            trace!("{} {}: skipping unrepresentable {value:?}", self.tags["mac"], self.kind);
            return;
        };
        let point = self.to_data_point(field, SystemTime::now());
        self.sink.push(point.to_string());
    }
}
