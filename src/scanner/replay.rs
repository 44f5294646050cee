//! Replay backend: advertisements read as text lines.
//!
//! Each line holds one advertisement:
//!
//! ```text
//! 7C:D9:F4:00:00:01 -62 089A:0101099C
//! ```
//!
//! that is a MAC address, the RSSI in dBm and one or more manufacturer data
//! blobs in hex, each optionally prefixed by a 4-digit hex company id and a
//! colon. Empty lines and lines starting with `#` are skipped.

use super::ADVERTISEMENT_CHANNEL_BUFFER_SIZE;
use crate::advertisement::{AdvertisementRecord, ManufacturerData};
use crate::mac_address::{MacAddress, ParseMacError};
use log::{debug, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Errors for a single replay line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseRecordError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid MAC address: {0}")]
    Mac(#[from] ParseMacError),
    #[error("invalid RSSI: {0}")]
    Rssi(String),
    #[error("invalid company id: {0}")]
    CompanyId(String),
    #[error("invalid hex payload: {0}")]
    Hex(String),
}

/// Parse one replay line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_record_line(line: &str) -> Result<Option<AdvertisementRecord>, ParseRecordError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let mac: MacAddress = parts.next().ok_or(ParseRecordError::Missing("MAC address"))?.parse()?;
    let rssi = parts.next().ok_or(ParseRecordError::Missing("RSSI"))?;
    let rssi_dbm: i16 = rssi
        .parse()
        .map_err(|_| ParseRecordError::Rssi(rssi.to_string()))?;

    let manufacturer_data = parts
        .map(parse_blob)
        .collect::<Result<Vec<_>, _>>()?;
    if manufacturer_data.is_empty() {
        return Err(ParseRecordError::Missing("manufacturer data"));
    }

    Ok(Some(AdvertisementRecord {
        mac,
        rssi_dbm,
        manufacturer_data,
    }))
}

fn parse_blob(src: &str) -> Result<ManufacturerData, ParseRecordError> {
    match src.split_once(':') {
        Some((id, hex)) => {
            if id.len() != 4 {
                return Err(ParseRecordError::CompanyId(id.to_string()));
            }
            let id = u16::from_str_radix(id, 16)
                .map_err(|_| ParseRecordError::CompanyId(id.to_string()))?;
            Ok(ManufacturerData::new(id, parse_hex(hex)?))
        }
        None => Ok(ManufacturerData::untagged(parse_hex(src)?)),
    }
}

fn parse_hex(src: &str) -> Result<Vec<u8>, ParseRecordError> {
    if src.len() % 2 != 0 || !src.is_ascii() {
        return Err(ParseRecordError::Hex(src.to_string()));
    }
    (0..src.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&src[i..i + 2], 16)
                .map_err(|_| ParseRecordError::Hex(src.to_string()))
        })
        .collect()
}

/// Replay advertisements from stdin.
pub fn start_scan() -> mpsc::Receiver<AdvertisementRecord> {
    spawn_reader(tokio::io::stdin())
}

/// Replay advertisements from `reader` until it is exhausted.
///
/// Lines that fail to parse are logged and skipped.
pub fn spawn_reader<R>(reader: R) -> mpsc::Receiver<AdvertisementRecord>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut line_no = 0usize;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Replay input error: {e}");
                    break;
                }
            };
            line_no += 1;
            match parse_record_line(&line) {
                Ok(Some(record)) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Replay line {line_no}: {e}"),
            }
        }
        debug!("Replay input exhausted after {line_no} lines");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::TELTONIKA_COMPANY_ID;
    use crate::test_utils::{OTHER_MAC, TEST_MAC};

    #[test]
    fn test_parse_line_with_company_id() {
        let record = parse_record_line("7C:D9:F4:00:00:01 -62 089A:0101099C")
            .unwrap()
            .unwrap();
        assert_eq!(record.mac, TEST_MAC);
        assert_eq!(record.rssi_dbm, -62);
        assert_eq!(
            record.manufacturer_data,
            vec![ManufacturerData::new(
                TELTONIKA_COMPANY_ID,
                [0x01u8, 0x01, 0x09, 0x9C]
            )]
        );
    }

    #[test]
    fn test_parse_line_with_several_blobs() {
        let record = parse_record_line("  7c:d9:f4:00:00:02\t-80  004C:0215 0100  ")
            .unwrap()
            .unwrap();
        assert_eq!(record.mac, OTHER_MAC);
        assert_eq!(
            record.manufacturer_data,
            vec![
                ManufacturerData::new(0x004C, [0x02u8, 0x15]),
                ManufacturerData::untagged([0x01u8, 0x00]),
            ]
        );
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        assert_eq!(parse_record_line(""), Ok(None));
        assert_eq!(parse_record_line("   "), Ok(None));
        assert_eq!(parse_record_line("# recorded in the garage"), Ok(None));
    }

    #[test]
    fn test_parse_invalid_lines() {
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01"),
            Err(ParseRecordError::Missing("RSSI"))
        );
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01 -60"),
            Err(ParseRecordError::Missing("manufacturer data"))
        );
        assert!(matches!(
            parse_record_line("7C:D9:F4:00:00 -60 0100"),
            Err(ParseRecordError::Mac(_))
        ));
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01 loud 0100"),
            Err(ParseRecordError::Rssi("loud".into()))
        );
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01 -60 89A:0100"),
            Err(ParseRecordError::CompanyId("89A".into()))
        );
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01 -60 089A:010"),
            Err(ParseRecordError::Hex("010".into()))
        );
        assert_eq!(
            parse_record_line("7C:D9:F4:00:00:01 -60 zz"),
            Err(ParseRecordError::Hex("zz".into()))
        );
    }

    #[test]
    fn test_reader_forwards_valid_lines() {
        let input: &'static [u8] = b"# header\n\
            7C:D9:F4:00:00:01 -60 089A:0100\n\
            garbage\n\
            7C:D9:F4:00:00:02 -70 089A:0100\n";

        tokio_test::block_on(async {
            let mut rx = spawn_reader(input);
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            assert_eq!(first.mac, TEST_MAC);
            assert_eq!(second.mac, OTHER_MAC);
            assert_eq!(second.rssi_dbm, -70);
            assert!(rx.recv().await.is_none());
        });
    }
}
