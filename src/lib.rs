//! `teltonika-eye-listener` library.
//!
//! Decodes Teltonika EYE sensor advertisements and fans the readings out to
//! bound output channels, marking sensors unavailable once they go silent.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The run loop lives in [`crate::app`]; the advertisement-processing core is
//! [`crate::dispatcher::Dispatcher`], which takes time as an argument and can
//! be driven without Bluetooth hardware or a runtime.

pub mod advertisement;
pub mod app;
pub mod cache;
pub mod channel;
pub mod config;
pub mod decoder;
pub mod device;
pub mod dispatcher;
pub mod mac_address;
pub mod output;
pub mod reading;
pub mod registry;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{AdvertisementRecord, ManufacturerData, VendorMatch};
pub use cache::{CachedState, FreshnessCache};
pub use channel::{Channel, ChannelRef, MetricKind, Value, ValueKind};
pub use config::{Settings, parse_duration};
pub use decoder::{DecodeError, decode};
pub use device::{DeviceConfig, DeviceMap, parse_device};
pub use dispatcher::{DispatchError, Dispatched, Dispatcher, Provisioner, TickReport};
pub use mac_address::MacAddress;
pub use output::LineSink;
pub use output::influxdb::LineChannel;
pub use reading::{DecodedReading, Flags};
pub use registry::{BindError, BindingId, BindingTarget, MacExpression, Registry};
pub use scanner::{Backend, ScanError};
