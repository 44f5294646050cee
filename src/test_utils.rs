use crate::advertisement::{AdvertisementRecord, ManufacturerData};
use crate::channel::{Channel, Value};
use crate::decoder::TELTONIKA_COMPANY_ID;
use crate::mac_address::MacAddress;
use std::sync::Mutex;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0x7C, 0xD9, 0xF4, 0x00, 0x00, 0x01]);

/// A second device for multi-device tests.
pub const OTHER_MAC: MacAddress = MacAddress([0x7C, 0xD9, 0xF4, 0x00, 0x00, 0x02]);

/// A payload with every flag set:
/// 21.50 °C, 40 %, magnet detected, moving with count 12, pitch 10,
/// roll -20, low battery, 2.9 V.
pub fn full_payload() -> Vec<u8> {
    vec![
        0x01, // protocol version
        0xFF, // flags
        0x08, 0x66, // temperature: 2150
        0x28, // humidity: 40
        0x80, 0x0C, // movement: moving, count 12
        0x0A, // pitch: 10
        0xFF, 0xEC, // roll: -20
        0x5A, // battery: 2000 + 90 * 10 mV
    ]
}

/// An advertisement carrying `payload` under Teltonika's company id.
pub fn eye_record(mac: MacAddress, rssi_dbm: i16, payload: &[u8]) -> AdvertisementRecord {
    AdvertisementRecord {
        mac,
        rssi_dbm,
        manufacturer_data: vec![ManufacturerData::new(TELTONIKA_COMPANY_ID, payload)],
    }
}

/// A channel that remembers everything published to it.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    values: Mutex<Vec<Value>>,
}

impl RecordingChannel {
    pub fn values(&self) -> Vec<Value> {
        self.values.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Value> {
        self.values.lock().unwrap().last().copied()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }
}

impl Channel for RecordingChannel {
    fn publish(&self, value: Value) {
        self.values.lock().unwrap().push(value);
    }
}
