//! Upload header wire format and connection sniffing.

use frame_relay::error::RelayError;
use frame_relay::network::protocol::{is_http_request, HeaderLayout, UploadHeader};

#[test]
fn test_packed_header_matches_device_bytes() {
    // id=7, t=1700000000.5, size=12345 as written by a little-endian device
    let mut wire = Vec::new();
    wire.extend_from_slice(&7u32.to_le_bytes());
    wire.extend_from_slice(&1_700_000_000.5f64.to_le_bytes());
    wire.extend_from_slice(&12_345u32.to_le_bytes());

    let header = UploadHeader::decode(&wire, HeaderLayout::Packed).expect("Failed to decode");
    assert_eq!(header, UploadHeader::new(7, 1_700_000_000.5, 12_345));
    assert_eq!(header.encode(HeaderLayout::Packed), wire);
}

#[test]
fn test_native_header_skips_padding() {
    let mut wire = Vec::new();
    wire.extend_from_slice(&3u32.to_le_bytes());
    wire.extend_from_slice(&[0xAA; 4]);
    wire.extend_from_slice(&42.25f64.to_le_bytes());
    wire.extend_from_slice(&99u32.to_le_bytes());
    assert_eq!(wire.len(), HeaderLayout::Native.size());

    let header = UploadHeader::decode(&wire, HeaderLayout::Native).expect("Failed to decode");
    assert_eq!(header.device_id, 3);
    assert_eq!(header.capture_time, 42.25);
    assert_eq!(header.payload_size, 99);
}

#[test]
fn test_extra_bytes_after_header_are_ignored() {
    let mut wire = UploadHeader::new(1, 2.0, 3).encode(HeaderLayout::Packed);
    wire.extend_from_slice(b"\xff\xd8");

    let header = UploadHeader::decode(&wire, HeaderLayout::Packed).expect("Failed to decode");
    assert_eq!(header.payload_size, 3);
}

#[test]
fn test_short_header_is_rejected() {
    let wire = UploadHeader::new(1, 2.0, 3).encode(HeaderLayout::Packed);

    match UploadHeader::decode(&wire[..10], HeaderLayout::Packed) {
        Err(RelayError::ShortHeader { expected, received }) => {
            assert_eq!(expected, 16);
            assert_eq!(received, 10);
        }
        other => panic!("expected ShortHeader, got {:?}", other),
    }
}

#[test]
fn test_http_sniffing() {
    assert!(is_http_request(b"GET / HTTP/1.1\r\n"));
    assert!(is_http_request(b"GET"));
    assert!(!is_http_request(b"POST / HTTP/1.1"));
    assert!(!is_http_request(b"GE"));
    assert!(!is_http_request(&UploadHeader::new(1, 1.0, 1).encode(HeaderLayout::Packed)));
}
