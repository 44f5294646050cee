//! Advertisement sources.
//!
//! Every backend produces [`AdvertisementRecord`]s on an mpsc channel and
//! leaves decoding to the dispatcher.

#[cfg(feature = "bluer")]
pub mod bluer;

pub mod replay;

use crate::advertisement::{AdvertisementRecord, VendorMatch};
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
#[cfg(feature = "bluer")]
pub const MANUFACTURER_DATA_TYPE: u8 = 0xff;

/// Channel buffer size for advertisement records.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Read recorded advertisements from stdin, one per line
    Replay,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        return Backend::Replay;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            Backend::Replay => write!(f, "replay"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            "replay" | "stdin" => Ok(Backend::Replay),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start receiving advertisements from the specified backend.
///
/// `vendor` lets backends that filter in hardware or in the daemon narrow
/// down what they forward. Records are still matched by the dispatcher.
pub async fn start_scan(
    backend: Backend,
    vendor: VendorMatch,
) -> Result<mpsc::Receiver<AdvertisementRecord>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(vendor).await,
        Backend::Replay => {
            let _ = vendor;
            Ok(replay::start_scan())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_backend_from_str() {
        #[cfg(feature = "bluer")]
        {
            assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
            assert_eq!(Backend::from_str("BlueZ").unwrap(), Backend::Bluer);
        }
        assert_eq!(Backend::from_str("replay").unwrap(), Backend::Replay);
        assert_eq!(Backend::from_str("stdin").unwrap(), Backend::Replay);
        assert!(Backend::from_str("hci").is_err());
    }

    #[test]
    fn test_backend_display() {
        #[cfg(feature = "bluer")]
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        assert_eq!(format!("{}", Backend::Replay), "replay");
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter not found");
    }
}
