//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, MANUFACTURER_DATA_TYPE, ScanError};
use crate::advertisement::{AdvertisementRecord, ManufacturerData, VendorMatch};
use crate::decoder::PROTOCOL_VERSION;
use crate::mac_address::MacAddress;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Advertisement monitor pattern for `vendor`.
///
/// The manufacturer data AD structure starts with the little-endian company
/// id, followed by the payload.
fn monitor_pattern(vendor: VendorMatch) -> Pattern {
    match vendor {
        VendorMatch::CompanyId(id) => Pattern {
            data_type: MANUFACTURER_DATA_TYPE,
            start_position: 0,
            content: id.to_le_bytes().to_vec(),
        },
        VendorMatch::ProtocolByte => Pattern {
            data_type: MANUFACTURER_DATA_TYPE,
            start_position: 2,
            content: vec![PROTOCOL_VERSION],
        },
    }
}

/// Start a passive scan through BlueZ.
///
/// Every advertisement the monitor reports is forwarded as a record carrying
/// all of the device's manufacturer data. Runs until the receiver is dropped.
pub async fn start_scan(
    vendor: VendorMatch,
) -> Result<mpsc::Receiver<AdvertisementRecord>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![monitor_pattern(vendor)]),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            let MonitorEvent::DeviceFound(device_id) = event else {
                continue;
            };
            match read_record(&adapter, device_id.device).await {
                Ok(Some(record)) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("[{}] {e}", device_id.device),
            }
        }
    });

    Ok(rx)
}

/// Read the current RSSI and manufacturer data of a device.
async fn read_record(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<AdvertisementRecord>, ScanError> {
    let device = adapter.device(address)?;

    let Some(manufacturer_data) = device.manufacturer_data().await? else {
        return Ok(None);
    };
    let rssi_dbm = device.rssi().await?.unwrap_or_default();

    Ok(Some(AdvertisementRecord {
        mac: MacAddress::from(address),
        rssi_dbm,
        manufacturer_data: manufacturer_data
            .into_iter()
            .map(|(id, data)| ManufacturerData::new(id, data))
            .collect(),
    }))
}
