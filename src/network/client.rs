//! Minimal device-side and viewer-side helpers.
//!
//! [`send_frame`] speaks the upload protocol the way a camera does;
//! [`fetch`] issues one GET against the read server. Both are used by the
//! `relay_client` tool and the integration tests.

use bytes::Bytes;
use std::io::ErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{AppResult, RelayError};
use crate::network::protocol::{HeaderLayout, UploadHeader};

/// Chunk size used when streaming a payload, matching device firmware.
const SEND_CHUNK: usize = 1024;

/// Upload one frame and close the connection.
pub async fn send_frame<A>(
    addr: A,
    device_id: u32,
    capture_time: f64,
    payload: &[u8],
    layout: HeaderLayout,
) -> AppResult<()>
where
    A: ToSocketAddrs,
{
    let header = upload_header(device_id, capture_time, payload.len())?;
    let mut stream = TcpStream::connect(addr).await?;

    stream.write_all(&header.encode(layout)).await?;
    let sent = async {
        for chunk in payload.chunks(SEND_CHUNK) {
            stream.write_all(chunk).await?;
        }
        stream.shutdown().await?;

        // Wait for the relay to close its side so the upload is fully
        // handled (accepted or rejected) when this returns.
        let mut sink = [0u8; 64];
        while stream.read(&mut sink).await? > 0 {}
        Ok::<(), std::io::Error>(())
    }
    .await;

    match sent {
        Ok(()) => {}
        // A rejected upload is closed without reading the payload
        Err(err) if closed_by_relay(&err) => {
            debug!(device_id, capture_time, "Relay closed the upload early");
        }
        Err(err) => return Err(err.into()),
    }

    debug!(device_id, capture_time, bytes = payload.len(), "Frame sent");
    Ok(())
}

/// Header for a payload of `len` bytes; the wire field is 32 bits.
fn upload_header(device_id: u32, capture_time: f64, len: usize) -> AppResult<UploadHeader> {
    let payload_size = u32::try_from(len).map_err(|_| RelayError::PayloadTooLarge {
        limit: u32::MAX as usize,
    })?;
    Ok(UploadHeader::new(device_id, capture_time, payload_size))
}

fn closed_by_relay(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::NotConnected
    )
}

/// A parsed HTTP reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResponse {
    /// HTTP status code
    pub status: u16,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl FetchedResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// `GET path` and read the reply until the server closes.
pub async fn fetch<A>(addr: A, path: &str) -> AppResult<FetchedResponse>
where
    A: ToSocketAddrs,
{
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {} HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    parse_response(&reply)
}

fn parse_response(reply: &[u8]) -> AppResult<FetchedResponse> {
    let split = reply
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| RelayError::MalformedRequest("response head not terminated".to_string()))?;

    let head = String::from_utf8_lossy(&reply[..split]);
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| RelayError::MalformedRequest("missing status line".to_string()))?;

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    Ok(FetchedResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(&reply[split + 4..]),
    })
}
