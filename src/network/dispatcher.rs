//! Per-connection routing.
//!
//! Every accepted connection carries exactly one of:
//! - an HTTP GET (first three bytes `GET`), answered once and closed
//! - a binary upload: header followed by the JPEG stream
//!
//! The dispatcher reads a probe the size of the upload header, sniffs it and
//! hands the connection to [`http::serve`] or [`upload::receive`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::detection::{build_detector, DetectionCapability};
use crate::error::{AppResult, RelayError};
use crate::network::protocol::{is_http_request, HeaderLayout, HTTP_GET_PREFIX};
use crate::network::{http, upload};
use crate::storage::UploadArchive;
use crate::store::DeviceStateStore;

/// Everything a connection task needs. Cheap to clone.
#[derive(Clone)]
pub struct RelayContext {
    /// Shared freshness gate and publish slot
    pub store: Arc<DeviceStateStore>,
    /// Backend run on every accepted upload
    pub detector: Arc<dyn DetectionCapability>,
    /// Per-device upload files
    pub archive: Arc<UploadArchive>,
    /// Header layout devices send
    pub layout: HeaderLayout,
    /// Socket read chunk size
    pub buffer_size: usize,
    /// Uploads larger than this are dropped
    pub max_payload_bytes: usize,
    /// Deadline for each socket read (`None` waits forever)
    pub read_timeout: Option<Duration>,
}

impl RelayContext {
    /// Build a context with a fresh store from configuration.
    pub async fn from_config(config: &RelayConfig) -> AppResult<Self> {
        let archive = UploadArchive::create(&config.upload.dir).await?;
        let read_timeout = match config.server.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            store: Arc::new(DeviceStateStore::new()),
            detector: build_detector(&config.detection),
            archive: Arc::new(archive),
            layout: config.protocol.header_layout,
            buffer_size: config.upload.buffer_size,
            max_payload_bytes: config.upload.max_payload_bytes,
            read_timeout,
        })
    }
}

/// What a connection turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Peer closed before sending anything
    Empty,
    /// An HTTP GET was answered
    Http,
    /// A binary upload ran to completion
    Upload(upload::UploadOutcome),
}

/// Sniff and serve one connection.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: RelayContext,
) -> AppResult<ConnectionKind>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Client connected: {}", peer);

    let mut probe = vec![0u8; ctx.layout.size()];
    let filled = read_probe(&mut stream, &mut probe, ctx.read_timeout).await?;
    if filled == 0 {
        debug!("Client {} disconnected without data", peer);
        return Ok(ConnectionKind::Empty);
    }
    let probe = &probe[..filled];

    if is_http_request(probe) {
        info!("HTTP request from {}", peer);
        http::serve(&mut stream, probe, &ctx.store, ctx.read_timeout).await?;
        Ok(ConnectionKind::Http)
    } else {
        let outcome = upload::receive(&mut stream, probe, &ctx).await?;
        Ok(ConnectionKind::Upload(outcome))
    }
}

/// Fill `probe` until it is full, the peer closes, or the bytes so far
/// already identify an HTTP request. Returns the number of bytes read.
async fn read_probe<S>(
    stream: &mut S,
    probe: &mut [u8],
    deadline: Option<Duration>,
) -> AppResult<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < probe.len() {
        if filled >= HTTP_GET_PREFIX.len() && is_http_request(&probe[..filled]) {
            break;
        }
        let n = read_some(stream, &mut probe[filled..], deadline).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// One `read` call, bounded by `deadline` when set.
pub(crate) async fn read_some<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Option<Duration>,
) -> AppResult<usize>
where
    S: AsyncRead + Unpin,
{
    match deadline {
        Some(limit) => match timeout(limit, stream.read(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RelayError::ReadTimeout(limit.as_millis() as u64)),
        },
        None => Ok(stream.read(buf).await?),
    }
}
