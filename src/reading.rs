//! Decoded Teltonika EYE sensor reading.

use std::time::Instant;

/// The flag byte of an EYE payload.
///
/// Each bit gates one field; see [`crate::decoder`] for the field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u8);

impl Flags {
    pub const TEMPERATURE: u8 = 1 << 0;
    pub const HUMIDITY: u8 = 1 << 1;
    pub const MAGNETIC_PRESENT: u8 = 1 << 2;
    pub const MAGNETIC_STATE: u8 = 1 << 3;
    pub const MOVEMENT: u8 = 1 << 4;
    pub const ORIENTATION: u8 = 1 << 5;
    pub const LOW_BATTERY: u8 = 1 << 6;
    pub const BATTERY: u8 = 1 << 7;

    #[inline]
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// A reading decoded from one advertisement payload.
///
/// Units:
/// - Temperature in Celsius
/// - Humidity in percent (0-255 as transmitted)
/// - Pitch and roll in degrees
/// - Battery voltage in Volts, battery level in percent (0-100)
/// - RSSI in dBm
///
/// Optional fields are `None` when their flag bit was clear, which is not the
/// same as a transmitted zero. `movement_count`, `movement_active`,
/// `magnetic_detected` and `low_battery` have no optional form; use
/// [`DecodedReading::flags`] to tell whether they were transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    /// Raw flag byte of the payload
    pub flags: Flags,
    /// Temperature in Celsius
    pub temperature_c: Option<f64>,
    /// Relative humidity in percent
    pub humidity_pct: Option<f64>,
    /// Movement counter (0 when not transmitted)
    pub movement_count: u16,
    /// Whether the sensor reported that it is currently moving
    pub movement_active: bool,
    /// Pitch angle in degrees
    pub pitch_deg: Option<i8>,
    /// Roll angle in degrees
    pub roll_deg: Option<i16>,
    /// Magnetic field detected by the contact sensor
    pub magnetic_detected: bool,
    /// Low battery indication
    pub low_battery: bool,
    /// Battery voltage in Volts
    pub battery_voltage_v: Option<f64>,
    /// Battery level in percent, derived from voltage
    pub battery_level_pct: Option<f64>,
    /// Signal strength of the advertisement in dBm
    pub rssi_dbm: i16,
    /// When the advertisement was received
    pub observed_at: Instant,
}

impl DecodedReading {
    /// A reading with every optional field absent.
    pub fn empty(rssi_dbm: i16, observed_at: Instant) -> Self {
        Self {
            flags: Flags::default(),
            temperature_c: None,
            humidity_pct: None,
            movement_count: 0,
            movement_active: false,
            pitch_deg: None,
            roll_deg: None,
            magnetic_detected: false,
            low_battery: false,
            battery_voltage_v: None,
            battery_level_pct: None,
            rssi_dbm,
            observed_at,
        }
    }

    /// Movement counter and state, when transmitted.
    pub fn movement(&self) -> Option<(u16, bool)> {
        self.flags
            .has(Flags::MOVEMENT)
            .then_some((self.movement_count, self.movement_active))
    }

    /// Whether the payload carried a magnetic contact sensor state.
    ///
    /// A payload that sets the state bit without the presence bit still
    /// counts as reporting a detected field.
    pub fn magnetic(&self) -> Option<bool> {
        if self.flags.has(Flags::MAGNETIC_PRESENT) || self.magnetic_detected {
            Some(self.magnetic_detected)
        } else {
            None
        }
    }

    /// Low battery indication, when raised.
    pub fn low_battery(&self) -> Option<bool> {
        self.low_battery.then_some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_has() {
        let flags = Flags(Flags::TEMPERATURE | Flags::BATTERY);
        assert!(flags.has(Flags::TEMPERATURE));
        assert!(flags.has(Flags::BATTERY));
        assert!(!flags.has(Flags::HUMIDITY));
    }

    #[test]
    fn test_empty_reading_reports_nothing() {
        let r = DecodedReading::empty(-70, Instant::now());
        assert_eq!(r.movement(), None);
        assert_eq!(r.magnetic(), None);
        assert_eq!(r.low_battery(), None);
        assert_eq!(r.rssi_dbm, -70);
    }

    #[test]
    fn test_magnetic_open_contact_is_reported_when_sensor_present() {
        let mut r = DecodedReading::empty(-70, Instant::now());
        r.flags = Flags(Flags::MAGNETIC_PRESENT);
        assert_eq!(r.magnetic(), Some(false));
    }

    #[test]
    fn test_movement_reported_only_with_flag() {
        let mut r = DecodedReading::empty(-70, Instant::now());
        r.movement_count = 3;
        assert_eq!(r.movement(), None);
        r.flags = Flags(Flags::MOVEMENT);
        assert_eq!(r.movement(), Some((3, false)));
    }
}
