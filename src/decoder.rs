//! Teltonika EYE advertisement payload decoder.
//!
//! Payload layout (manufacturer data, company id already stripped):
//!
//! | offset | size | content                                   |
//! |--------|------|-------------------------------------------|
//! | 0      | 1    | protocol version, always `0x01`           |
//! | 1      | 1    | flag byte                                 |
//! | 2..    | var  | flagged fields, in bit order, big-endian  |
//!
//! Fields per flag bit: 0 temperature (u16, 0.01 °C), 1 humidity (u8, %),
//! 2 magnetic sensor present, 3 magnetic field detected, 4 movement
//! (u16, top bit = moving, low 15 bits = count), 5 orientation (i8 pitch,
//! i16 roll), 6 low battery, 7 battery voltage (u8, 10 mV steps above 2 V).
//! Bits 2, 3 and 6 carry no bytes.

use crate::reading::{DecodedReading, Flags};
use std::time::Instant;
use thiserror::Error;

/// Teltonika's Bluetooth SIG company identifier.
pub const TELTONIKA_COMPANY_ID: u16 = 0x089A;

/// The only protocol version this decoder understands.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Version byte plus flag byte.
pub const HEADER_LEN: usize = 2;

const BATTERY_BASE_MV: f64 = 2000.0;
const BATTERY_STEP_MV: f64 = 10.0;
const BATTERY_FULL_MV: f64 = 3200.0;

/// Error types for decoding EYE payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Fewer than two header bytes
    #[error("payload too short: {0} bytes")]
    PayloadTooShort(usize),
    /// Leading byte is not a known protocol version
    #[error("unsupported protocol version 0x{0:02X}")]
    UnsupportedProtocol(u8),
    /// A flagged field runs past the end of the payload
    #[error("truncated {field}: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Bounds-checked big-endian reader over a payload.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let available = self.data.len().saturating_sub(self.offset);
        let bytes = self
            .data
            .get(self.offset..self.offset + N)
            .ok_or(DecodeError::Truncated {
                field,
                offset: self.offset,
                needed: N,
                available,
            })?;
        self.offset += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.take::<1>(field).map(|[b]| b)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.take::<2>(field).map(u16::from_be_bytes)
    }
}

/// Battery voltage (V) and level (%) from the raw battery byte.
pub fn battery_from_raw(raw: u8) -> (f64, f64) {
    let mv = BATTERY_BASE_MV + f64::from(raw) * BATTERY_STEP_MV;
    let level = ((mv - BATTERY_BASE_MV) / (BATTERY_FULL_MV - BATTERY_BASE_MV) * 100.0)
        .clamp(0.0, 100.0);
    (mv / 1000.0, level)
}

/// Decode an EYE payload into a [`DecodedReading`].
///
/// `rssi_dbm` and `observed_at` come from the advertisement envelope and are
/// attached unchanged. Fields are read strictly in flag-bit order and a flagged
/// field that does not fit in `payload` fails the whole decode.
pub fn decode(
    payload: &[u8],
    rssi_dbm: i16,
    observed_at: Instant,
) -> Result<DecodedReading, DecodeError> {
    let [version, flag_byte] = match payload {
        [version, flag_byte, ..] => [*version, *flag_byte],
        _ => return Err(DecodeError::PayloadTooShort(payload.len())),
    };
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedProtocol(version));
    }

    let flags = Flags(flag_byte);
    let mut cursor = Cursor::new(payload, HEADER_LEN);
    let mut reading = DecodedReading::empty(rssi_dbm, observed_at);
    reading.flags = flags;

    if flags.has(Flags::TEMPERATURE) {
        reading.temperature_c = Some(f64::from(cursor.u16("temperature")?) / 100.0);
    }

    if flags.has(Flags::HUMIDITY) {
        reading.humidity_pct = Some(f64::from(cursor.u8("humidity")?));
    }

    reading.magnetic_detected = flags.has(Flags::MAGNETIC_STATE);

    if flags.has(Flags::MOVEMENT) {
        let raw = cursor.u16("movement")?;
        reading.movement_active = raw & 0x8000 != 0;
        reading.movement_count = raw & 0x7FFF;
    }

    if flags.has(Flags::ORIENTATION) {
        let [pitch, r0, r1] = cursor.take::<3>("orientation")?;
        reading.pitch_deg = Some(pitch as i8);
        reading.roll_deg = Some(i16::from_be_bytes([r0, r1]));
    }

    reading.low_battery = flags.has(Flags::LOW_BATTERY);

    if flags.has(Flags::BATTERY) {
        let (voltage, level) = battery_from_raw(cursor.u8("battery")?);
        reading.battery_voltage_v = Some(voltage);
        reading.battery_level_pct = Some(level);
    }

    Ok(reading)
}
