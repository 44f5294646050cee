//! Advertisement records handed over by a scanner backend.

use crate::decoder::{PROTOCOL_VERSION, TELTONIKA_COMPANY_ID};
use crate::mac_address::MacAddress;

/// One manufacturer-specific data blob from an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    /// Company identifier, when the backend surfaces it separately
    pub company_id: Option<u16>,
    /// Payload bytes, company identifier stripped
    pub data: Vec<u8>,
}

impl ManufacturerData {
    pub fn new(company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            company_id: Some(company_id),
            data: data.into(),
        }
    }

    /// A blob whose company identifier is unknown.
    pub fn untagged(data: impl Into<Vec<u8>>) -> Self {
        Self {
            company_id: None,
            data: data.into(),
        }
    }
}

/// A parsed advertisement envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRecord {
    pub mac: MacAddress,
    pub rssi_dbm: i16,
    pub manufacturer_data: Vec<ManufacturerData>,
}

/// How a manufacturer blob is recognised as an EYE payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorMatch {
    /// Blob tagged with this company identifier
    CompanyId(u16),
    /// Blob whose first byte is the protocol version
    ProtocolByte,
}

impl Default for VendorMatch {
    fn default() -> Self {
        VendorMatch::CompanyId(TELTONIKA_COMPANY_ID)
    }
}

impl VendorMatch {
    pub fn matches(&self, blob: &ManufacturerData) -> bool {
        match self {
            VendorMatch::CompanyId(id) => blob.company_id == Some(*id),
            VendorMatch::ProtocolByte => blob.data.first() == Some(&PROTOCOL_VERSION),
        }
    }
}

impl AdvertisementRecord {
    /// The first blob that matches `vendor`. Later matches are never consulted.
    pub fn vendor_payload(&self, vendor: VendorMatch) -> Option<&[u8]> {
        self.manufacturer_data
            .iter()
            .find(|blob| vendor.matches(blob))
            .map(|blob| blob.data.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;

    fn record(blobs: Vec<ManufacturerData>) -> AdvertisementRecord {
        AdvertisementRecord {
            mac: TEST_MAC,
            rssi_dbm: -70,
            manufacturer_data: blobs,
        }
    }

    #[test]
    fn test_company_id_match_picks_first() {
        let r = record(vec![
            ManufacturerData::new(0x004C, [0x01u8, 0x00]),
            ManufacturerData::new(TELTONIKA_COMPANY_ID, [0x01u8, 0x01, 0x00, 0x10]),
            ManufacturerData::new(TELTONIKA_COMPANY_ID, [0x01u8, 0x02, 0x20]),
        ]);
        assert_eq!(
            r.vendor_payload(VendorMatch::default()),
            Some(&[0x01, 0x01, 0x00, 0x10][..])
        );
    }

    #[test]
    fn test_company_id_ignores_untagged() {
        let r = record(vec![ManufacturerData::untagged([0x01u8, 0x00])]);
        assert_eq!(r.vendor_payload(VendorMatch::default()), None);
    }

    #[test]
    fn test_protocol_byte_match() {
        let r = record(vec![
            ManufacturerData::untagged([0x02u8, 0x00]),
            ManufacturerData::untagged([0x01u8, 0x02, 0x33]),
        ]);
        assert_eq!(
            r.vendor_payload(VendorMatch::ProtocolByte),
            Some(&[0x01, 0x02, 0x33][..])
        );
    }

    #[test]
    fn test_no_blobs() {
        let r = record(vec![]);
        assert_eq!(r.vendor_payload(VendorMatch::ProtocolByte), None);
    }
}
