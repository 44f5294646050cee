//! Core application runner for `teltonika-eye-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::advertisement::{AdvertisementRecord, VendorMatch};
use crate::channel::{ChannelRef, MetricKind};
use crate::config::{Settings, parse_duration};
use crate::decoder::TELTONIKA_COMPANY_ID;
use crate::device::{DeviceConfig, parse_device, to_map};
use crate::dispatcher::{Dispatcher, Provisioner};
use crate::mac_address::MacAddress;
use crate::output::LineSink;
use crate::output::influxdb::LineChannel;
use crate::scanner::{Backend, ScanError};
use clap::Parser;
use log::{debug, info, log};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "teltonika_eye")]
    pub influxdb_measurement: String,

    /// Configure a known sensor, optionally with a name and its own timeout.
    /// Format: --device 7C:D9:F4:00:00:01=Freezer@10m
    #[arg(long = "device", value_parser = parse_device, value_name = "DEVICE")]
    pub devices: Vec<DeviceConfig>,

    /// Report every Teltonika EYE sensor in range, not only configured ones
    #[arg(long)]
    pub discover: bool,

    /// Mark a sensor unavailable when it has not been heard from for this long.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "300s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Interval of the housekeeping tick (timeouts and binding resolution)
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub tick: Duration,

    /// Minimum interval between re-resolutions of dynamic bindings
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub resolve_interval: Duration,

    /// Do not report RSSI for sensors without their own configuration
    #[arg(long)]
    pub no_rssi: bool,

    /// Do not report battery level for sensors without their own configuration
    #[arg(long)]
    pub no_battery_level: bool,

    /// Recognise sensors by protocol version byte instead of company id
    #[arg(long)]
    pub match_protocol_byte: bool,

    /// Verbose output, log rejected and unrecognized advertisements
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Advertisement source to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    /// Dispatcher settings described by these options.
    pub fn settings(&self) -> Settings {
        Settings {
            discover: self.discover,
            timeout: self.timeout,
            resolve_interval: self.resolve_interval,
            rssi: !self.no_rssi,
            battery_level: !self.no_battery_level,
            vendor: if self.match_protocol_byte {
                VendorMatch::ProtocolByte
            } else {
                VendorMatch::CompanyId(TELTONIKA_COMPANY_ID)
            },
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("tick interval must be greater than zero")]
    ZeroTick,
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        vendor: VendorMatch,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementRecord>, ScanError>>
                + Send
                + '_,
        >,
    >;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        vendor: VendorMatch,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementRecord>, ScanError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move { crate::scanner::start_scan(backend, vendor).await })
    }
}

/// Creates one [`LineChannel`] per enabled metric for every device the
/// dispatcher admits, and keeps them alive until the device is released.
struct LineProvisioner {
    sink: LineSink,
    measurement: String,
    settings: Settings,
    channels: HashMap<MacAddress, Vec<Arc<LineChannel>>>,
}

impl Provisioner for LineProvisioner {
    fn provision(
        &mut self,
        mac: MacAddress,
        config: Option<&DeviceConfig>,
    ) -> Vec<(MetricKind, ChannelRef)> {
        let Self {
            sink,
            measurement,
            settings,
            channels,
        } = self;
        let owned = channels.entry(mac).or_default();
        MetricKind::ALL
            .into_iter()
            .filter(|&kind| settings.metric_enabled(config, kind))
            .map(|kind| {
                let channel = Arc::new(LineChannel::new(
                    sink.clone(),
                    measurement.as_str(),
                    mac,
                    config,
                    kind,
                ));
                let channel_ref = ChannelRef::to(&channel);
                owned.push(channel);
                (kind, channel_ref)
            })
            .collect()
    }

    fn release(&mut self, mac: MacAddress) {
        self.channels.remove(&mac);
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Run the core processing loop, writing line protocol output to `out`.
///
/// Advertisements are dispatched as they arrive; every `options.tick` the
/// dispatcher re-resolves bindings and times out silent sensors. Returns when
/// the scanner stream ends.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    if options.tick.is_zero() {
        return Err(RunError::ZeroTick);
    }

    let settings = options.settings();
    let sink = LineSink::new();
    let provisioner = LineProvisioner {
        sink: sink.clone(),
        measurement: options.influxdb_measurement.clone(),
        settings: settings.clone(),
        channels: HashMap::new(),
    };
    let mut dispatcher =
        Dispatcher::new(settings.clone(), to_map(&options.devices)).with_provisioner(provisioner);
    dispatcher.log_config();

    let mut records = scanner.start_scan(options.backend, settings.vendor).await?;
    info!("Listening for Teltonika EYE sensors using {}", options.backend);

    let mut ticker = tokio::time::interval(options.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else {
                    break;
                };
                if let Err(e) = dispatcher.handle_advertisement(&record, now()) {
                    log!(e.level(), "{e}");
                }
            }
            _ = ticker.tick() => {
                let report = dispatcher.tick(now());
                if report.rebinds > 0 {
                    debug!("{} bindings moved", report.rebinds);
                }
            }
        }
        sink.drain_into(out)?;
    }

    info!(
        "Advertisement stream ended; {} sensors cached, {} discovered",
        dispatcher.cache().len(),
        dispatcher.discovered_devices().count()
    );
    Ok(())
}
