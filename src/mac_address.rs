//! Device identity for Bluetooth beacons.
//!
//! A compact 6-byte MAC address that doubles as the 48-bit key used by the
//! registry and the freshness cache. It is decoupled from any specific
//! Bluetooth library.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
///
/// Equality is exact bitwise equality; the first octet is the most significant
/// one when the address is viewed as a 48-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Largest value representable in 48 bits.
    pub const MAX_RAW: u64 = 0xFFFF_FFFF_FFFF;

    /// The address as a 48-bit unsigned integer.
    pub fn as_u64(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// Build an address from the low 48 bits of `raw`.
    ///
    /// Returns `None` when any of the upper 16 bits is set.
    pub fn from_u64(raw: u64) -> Option<Self> {
        if raw > Self::MAX_RAW {
            return None;
        }
        let b = raw.to_be_bytes();
        Some(Self([b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Underscore-separated form used in generated device names.
    pub fn to_underscored(&self) -> String {
        self.to_string().replace(':', "_")
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex((*part).to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl From<MacAddress> for u64 {
    fn from(mac: MacAddress) -> Self {
        mac.as_u64()
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}
