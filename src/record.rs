//! The on-disk record format and its encode/decode/verify path (spec §4.1).
//!
//! Wire layout, all integers little-endian:
//!
//! ```text
//! | crc (4) | position (8) | timestamp (8) | key_size (4) | value_size (4) | flag (1) | key | value |
//! ```
//!
//! `position` is a reserved/auxiliary slot, always zero. `value` is present
//! only when `flag == FLAG_LIVE`; tombstones still carry their key so
//! recovery can remove the matching key-directory entry.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::RecordError;

/// CRC-32 (IEEE polynomial, 0xEDB88320 reflected), matching `crc32.ChecksumIEEE`.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 29;

pub const FLAG_LIVE: u8 = 0;
pub const FLAG_TOMBSTONE: u8 = 1;

/// The six fixed-width fields every record starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub crc: u32,
    pub position: u64,
    pub timestamp: u64,
    pub key_size: u32,
    pub value_size: u32,
    pub flag: u8,
}

impl Header {
    pub fn is_tombstone(&self) -> bool {
        self.flag == FLAG_TOMBSTONE
    }

    /// Total on-disk size of the record this header belongs to: the header
    /// plus the key plus the value (omitted for tombstones).
    pub fn total_size(&self) -> usize {
        let value_len = if self.is_tombstone() {
            0
        } else {
            self.value_size as usize
        };
        HEADER_SIZE + self.key_size as usize + value_len
    }
}

/// A decoded (or about-to-be-encoded) record: a key, an optional value, a
/// write timestamp, and a live/tombstone flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub flag: u8,
}

impl Record {
    /// Builds a live record.
    pub fn new(key: Vec<u8>, value: Vec<u8>, timestamp: u64) -> Self {
        Self {
            key,
            value,
            timestamp,
            flag: FLAG_LIVE,
        }
    }

    /// Builds a tombstone (delete marker) for `key`.
    pub fn tombstone(key: Vec<u8>, timestamp: u64) -> Self {
        Self {
            key,
            value: Vec::new(),
            timestamp,
            flag: FLAG_TOMBSTONE,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flag == FLAG_TOMBSTONE
    }

    /// Encodes this record to its exact on-disk byte representation,
    /// including the trailing CRC over everything from `position` onward.
    pub fn encode(&self) -> Vec<u8> {
        let value_len = if self.is_tombstone() { 0 } else { self.value.len() };
        let size = HEADER_SIZE + self.key.len() + value_len;
        let mut buf = vec![0u8; size];

        buf[4..12].copy_from_slice(&0u64.to_le_bytes()); // position, reserved
        buf[12..20].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[20..24].copy_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf[24..28].copy_from_slice(&(value_len as u32).to_le_bytes());
        buf[28] = self.flag;

        let key_end = HEADER_SIZE + self.key.len();
        buf[HEADER_SIZE..key_end].copy_from_slice(&self.key);
        if !self.is_tombstone() {
            buf[key_end..key_end + value_len].copy_from_slice(&self.value);
        }

        let crc = CRC32.checksum(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf
    }
}

/// Decodes the fixed 29-byte header from the start of `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<Header, RecordError> {
    if bytes.len() < HEADER_SIZE {
        return Err(RecordError::ShortRead {
            expected: HEADER_SIZE,
            got: bytes.len(),
        });
    }

    let crc = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let position = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
    let timestamp = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
    let key_size = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
    let value_size = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
    let flag = bytes[28];

    Ok(Header {
        crc,
        position,
        timestamp,
        key_size,
        value_size,
        flag,
    })
}

/// Slices the key and value payloads out of `bytes` (the full record,
/// header included) according to `header`'s sizes. Does not verify CRC.
pub fn decode_payload<'a>(bytes: &'a [u8], header: &Header) -> (&'a [u8], &'a [u8]) {
    let key_end = HEADER_SIZE + header.key_size as usize;
    let key = &bytes[HEADER_SIZE..key_end];
    let value = if header.is_tombstone() {
        &bytes[key_end..key_end]
    } else {
        let value_end = key_end + header.value_size as usize;
        &bytes[key_end..value_end]
    };
    (key, value)
}

/// Decodes and CRC-verifies a complete record from `bytes`, which must
/// contain at least `header.total_size()` bytes starting at offset 0.
///
/// This is the single canonical read path described in spec §4.1; it
/// recomputes the CRC over the 25 post-CRC header bytes, the key, and the
/// value, exactly matching what [`Record::encode`] produced.
pub fn decode(bytes: &[u8]) -> Result<(Header, Record), RecordError> {
    let header = decode_header(bytes)?;
    let expected = header.total_size();
    if bytes.len() < expected {
        return Err(RecordError::ShortRead {
            expected,
            got: bytes.len(),
        });
    }

    let computed = CRC32.checksum(&bytes[4..expected]);
    if computed != header.crc {
        return Err(RecordError::CrcMismatch {
            stored: header.crc,
            computed,
        });
    }

    let (key, value) = decode_payload(&bytes[..expected], &header);
    let record = Record {
        key: key.to_vec(),
        value: value.to_vec(),
        timestamp: header.timestamp,
        flag: header.flag,
    };
    Ok((header, record))
}
