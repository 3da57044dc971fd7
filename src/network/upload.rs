//! Upload pipeline: header → claim device → drain payload → persist →
//! detect → publish.
//!
//! The device is claimed through a [`WriteLease`](crate::store::WriteLease).
//! Every early return after the claim drops the lease, which releases the
//! device without publishing, so a failed upload never locks its device out.

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::error::{AppResult, RelayError};
use crate::network::dispatcher::{read_some, RelayContext};
use crate::network::protocol::UploadHeader;

/// Upper bound on the buffer reserved up front from the declared size.
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Result of a well-formed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Frame processed and published
    Published {
        /// Uploading device
        device_id: u32,
        /// Payload bytes received
        bytes: usize,
    },
    /// Stale timestamp, or another upload for the device is in flight
    Rejected {
        /// Uploading device
        device_id: u32,
    },
}

/// Run the pipeline for a connection whose probe held an upload header.
pub async fn receive<S>(stream: &mut S, probe: &[u8], ctx: &RelayContext) -> AppResult<UploadOutcome>
where
    S: AsyncRead + Unpin,
{
    let header = UploadHeader::decode(probe, ctx.layout)?;
    if !header.capture_time.is_finite() {
        return Err(RelayError::InvalidHeader(format!(
            "capture time {} is not finite",
            header.capture_time
        )));
    }

    info!(
        device_id = header.device_id,
        capture_time = header.capture_time,
        payload_size = header.payload_size,
        "Upload header received"
    );

    let Some(lease) = ctx.store.begin_write(header.device_id, header.capture_time) else {
        info!(
            device_id = header.device_id,
            capture_time = header.capture_time,
            "Upload rejected: stale timestamp or write in progress"
        );
        return Ok(UploadOutcome::Rejected {
            device_id: header.device_id,
        });
    };

    let payload = drain_payload(stream, &header, ctx).await?;
    let received = payload.len();

    if let Err(err) = ctx.archive.store(header.device_id, &payload).await {
        warn!(device_id = header.device_id, error = %err, "Failed to persist upload");
    }

    let detector = ctx.detector.clone();
    let processed = tokio::task::spawn_blocking(move || detector.process(payload))
        .await
        .map_err(|err| RelayError::Detection(err.to_string()))?;

    lease.publish(processed.raw, processed.annotated, processed.detection_json);
    info!(
        device_id = header.device_id,
        bytes = received,
        detector = ctx.detector.name(),
        "Upload published"
    );

    Ok(UploadOutcome::Published {
        device_id: header.device_id,
        bytes: received,
    })
}

/// Read the payload until `payload_size` bytes arrive or the peer closes.
///
/// A zero `payload_size` means "until the peer closes". Bytes sent beyond the
/// declared size are left unread.
async fn drain_payload<S>(
    stream: &mut S,
    header: &UploadHeader,
    ctx: &RelayContext,
) -> AppResult<Bytes>
where
    S: AsyncRead + Unpin,
{
    let declared = header.payload_size as usize;
    let mut payload = BytesMut::with_capacity(declared.min(MAX_PREALLOCATION));
    let mut chunk = vec![0u8; ctx.buffer_size];

    loop {
        let want = if declared > 0 {
            (declared - payload.len()).min(chunk.len())
        } else {
            chunk.len()
        };
        if want == 0 {
            break;
        }

        let n = read_some(stream, &mut chunk[..want], ctx.read_timeout).await?;
        if n == 0 {
            break;
        }
        if payload.len() + n > ctx.max_payload_bytes {
            return Err(RelayError::PayloadTooLarge {
                limit: ctx.max_payload_bytes,
            });
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    if payload.is_empty() {
        return Err(RelayError::EmptyPayload);
    }
    if declared > 0 && payload.len() < declared {
        debug!(
            device_id = header.device_id,
            declared,
            received = payload.len(),
            "Peer closed before declared payload size"
        );
    }

    Ok(payload.freeze())
}
