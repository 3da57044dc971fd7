//! Binary upload header and connection sniffing.
//!
//! An upload is one header followed by the JPEG byte stream. The header
//! carries three fields in this order: `device_id` (u32), `capture_time`
//! (f64 seconds since epoch) and `payload_size` (u32, advisory).
//!
//! Two byte layouts exist in the field, see [`HeaderLayout`].

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, RelayError};

/// Bytes an HTTP connection starts with. Only `GET` is served.
pub const HTTP_GET_PREFIX: &[u8; 3] = b"GET";

/// Byte layout of the upload header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// Little-endian, unpadded: `id[0..4] time[4..12] size[12..16]`.
    #[default]
    Packed,
    /// Native C struct packing on 64-bit little-endian devices, where the
    /// f64 is aligned to 8 bytes: `id[0..4] pad[4..8] time[8..16] size[16..20]`.
    Native,
}

impl HeaderLayout {
    /// Total header length on the wire.
    pub const fn size(self) -> usize {
        match self {
            HeaderLayout::Packed => 16,
            HeaderLayout::Native => 20,
        }
    }

    const fn time_offset(self) -> usize {
        match self {
            HeaderLayout::Packed => 4,
            HeaderLayout::Native => 8,
        }
    }

    const fn size_offset(self) -> usize {
        self.time_offset() + 8
    }
}

impl std::str::FromStr for HeaderLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "packed" => Ok(HeaderLayout::Packed),
            "native" => Ok(HeaderLayout::Native),
            other => Err(format!(
                "Invalid header layout '{}'. Must be one of: packed, native",
                other
            )),
        }
    }
}

/// Header preceding every uploaded frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UploadHeader {
    /// Uploading device
    pub device_id: u32,
    /// Capture time in seconds since the epoch
    pub capture_time: f64,
    /// Declared JPEG length (0 = until the peer closes)
    pub payload_size: u32,
}

impl UploadHeader {
    /// Header for one upload.
    pub fn new(device_id: u32, capture_time: f64, payload_size: u32) -> Self {
        Self {
            device_id,
            capture_time,
            payload_size,
        }
    }

    /// Serialize in `layout`; padding bytes are zero.
    pub fn encode(&self, layout: HeaderLayout) -> Vec<u8> {
        let mut buf = vec![0u8; layout.size()];
        let time_at = layout.time_offset();
        let size_at = layout.size_offset();

        buf[0..4].copy_from_slice(&self.device_id.to_le_bytes());
        buf[time_at..time_at + 8].copy_from_slice(&self.capture_time.to_le_bytes());
        buf[size_at..size_at + 4].copy_from_slice(&self.payload_size.to_le_bytes());

        buf
    }

    /// Decode a header from the front of `data`. Trailing bytes are ignored.
    pub fn decode(data: &[u8], layout: HeaderLayout) -> AppResult<Self> {
        let expected = layout.size();
        if data.len() < expected {
            return Err(RelayError::ShortHeader {
                expected,
                received: data.len(),
            });
        }

        let time_at = layout.time_offset();
        let size_at = layout.size_offset();

        let device_id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let mut time_bytes = [0u8; 8];
        time_bytes.copy_from_slice(&data[time_at..time_at + 8]);
        let capture_time = f64::from_le_bytes(time_bytes);
        let payload_size = u32::from_le_bytes([
            data[size_at],
            data[size_at + 1],
            data[size_at + 2],
            data[size_at + 3],
        ]);

        Ok(UploadHeader {
            device_id,
            capture_time,
            payload_size,
        })
    }
}

/// True when the probe is the start of an HTTP GET.
///
/// Only the first three bytes are compared. A binary header whose device id
/// begins with `G`,`E`,`T` is routed to HTTP; deployed devices depend on this
/// exact rule.
pub fn is_http_request(probe: &[u8]) -> bool {
    probe.starts_with(HTTP_GET_PREFIX)
}
