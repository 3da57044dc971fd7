//! Read server: a single HTTP/1.1 GET per connection.
//!
//! | path prefix    | body                     |
//! |----------------|--------------------------|
//! | `/raw`         | raw JPEG                 |
//! | `/detection`   | detection summary JSON   |
//! | anything else  | annotated JPEG           |
//!
//! Responses are `Connection: close` and allow any origin. An empty publish
//! slot answers 404.

use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{AppResult, RelayError};
use crate::network::dispatcher::read_some;
use crate::store::{DeviceStateStore, PublishedResult};

/// Request heads longer than this are cut off; the request line is all we use.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

const HEAD_TERMINATORS: [&[u8]; 2] = [b"\r\n\r\n", b"\n\n"];

/// Which part of the published result a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/raw...`: the frame as uploaded
    Raw,
    /// `/detection...`: the JSON summary
    Detection,
    /// Any other path: the annotated frame
    Annotated,
}

impl Route {
    /// Route by path prefix.
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/raw") {
            Route::Raw
        } else if path.starts_with("/detection") {
            Route::Detection
        } else {
            Route::Annotated
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Route::Raw | Route::Annotated => "image/jpeg",
            Route::Detection => "application/json",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            Route::Raw | Route::Annotated => "No image available",
            Route::Detection => "No detection available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The parts of an HTTP request line.
pub struct RequestLine {
    /// Request method
    pub method: String,
    /// Request target, including any query string
    pub path: String,
    /// `HTTP/1.0` when the client omitted it
    pub version: String,
}

/// Parse the first line of a request head.
pub fn parse_request_line(head: &[u8]) -> AppResult<RequestLine> {
    let end = head
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(head.len());
    let line = String::from_utf8_lossy(&head[..end]);
    let mut parts = line.trim_end_matches('\r').split_whitespace();

    let method = parts
        .next()
        .ok_or_else(|| RelayError::MalformedRequest("empty request line".to_string()))?;
    let path = parts
        .next()
        .ok_or_else(|| RelayError::MalformedRequest(format!("missing path in '{}'", line.trim())))?;
    let version = parts.next().unwrap_or("HTTP/1.0");

    if !path.starts_with('/') {
        return Err(RelayError::MalformedRequest(format!(
            "path must start with '/': '{}'",
            path
        )));
    }

    Ok(RequestLine {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
    })
}

/// A complete response, written in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase for the status line
    pub reason: &'static str,
    /// `Content-Type` header value
    pub content_type: &'static str,
    /// Headers beyond the ones every response carries
    pub headers: Vec<(&'static str, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// 200 with the given body.
    pub fn ok(content_type: &'static str, body: Bytes) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type,
            headers: Vec::new(),
            body,
        }
    }

    /// 404 with a plain-text message.
    pub fn not_found(message: &str) -> Self {
        Self::text(404, "Not Found", message)
    }

    /// 400 with a plain-text message.
    pub fn bad_request(message: &str) -> Self {
        Self::text(400, "Bad Request", message)
    }

    fn text(status: u16, reason: &'static str, message: &str) -> Self {
        Self {
            status,
            reason,
            content_type: "text/plain; charset=utf-8",
            headers: Vec::new(),
            body: Bytes::from(message.to_string()),
        }
    }

    /// Append an extra header.
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Status line and headers, including the blank line.
    pub fn head(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\nAccess-Control-Allow-Origin: *\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }

    /// Write head and body, then flush.
    pub async fn write_to<S>(&self, stream: &mut S) -> AppResult<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.head()).await?;
        stream.write_all(&self.body).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Build the response for `route` from the current publish slot.
pub fn respond(route: Route, latest: Option<&PublishedResult>) -> HttpResponse {
    let Some(result) = latest else {
        return HttpResponse::not_found(route.missing_message());
    };

    let body = match route {
        Route::Raw => result.raw.clone(),
        Route::Annotated => result.annotated.clone(),
        Route::Detection => Bytes::from(result.detection_json.clone()),
    };

    HttpResponse::ok(route.content_type(), body)
        .with_header("Cache-Control", "no-cache")
        .with_header("X-Device-Id", result.device_id.to_string())
}

/// Finish reading the request head that starts with `probe`, answer it and
/// close the write side.
pub async fn serve<S>(
    stream: &mut S,
    probe: &[u8],
    store: &DeviceStateStore,
    deadline: Option<Duration>,
) -> AppResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(stream, probe, deadline).await?;

    let response = match parse_request_line(&head) {
        Ok(line) => {
            let route = Route::from_path(&line.path);
            let latest = store.latest();
            let response = respond(route, latest.as_deref());
            debug!(
                method = %line.method,
                path = %line.path,
                ?route,
                status = response.status,
                bytes = response.body.len(),
                "HTTP response"
            );
            response
        }
        Err(err) => {
            warn!(error = %err, "Rejecting malformed HTTP request");
            HttpResponse::bad_request("Malformed request")
        }
    };

    response.write_to(stream).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_request_head<S>(
    stream: &mut S,
    probe: &[u8],
    deadline: Option<Duration>,
) -> AppResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut head = probe.to_vec();
    let mut chunk = [0u8; 1024];

    while !head_complete(&head) && head.len() < MAX_REQUEST_HEAD {
        let n = read_some(stream, &mut chunk, deadline).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    Ok(head)
}

fn head_complete(head: &[u8]) -> bool {
    HEAD_TERMINATORS
        .iter()
        .any(|end| head.windows(end.len()).any(|w| w == *end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn published() -> PublishedResult {
        PublishedResult {
            device_id: 12,
            capture_time: 1.0,
            raw: Bytes::from_static(b"RAW"),
            annotated: Bytes::from_static(b"ANNOTATED"),
            detection_json: r#"{"count":0}"#.to_string(),
        }
    }

    #[test]
    fn routes_by_prefix() {
        assert_eq!(Route::from_path("/raw"), Route::Raw);
        assert_eq!(Route::from_path("/raw.jpg?t=1"), Route::Raw);
        assert_eq!(Route::from_path("/detection"), Route::Detection);
        assert_eq!(Route::from_path("/detections.json"), Route::Detection);
        assert_eq!(Route::from_path("/"), Route::Annotated);
        assert_eq!(Route::from_path("/latest.jpg"), Route::Annotated);
        assert_eq!(Route::from_path("/camera/raw"), Route::Annotated);
    }

    #[test]
    fn parses_request_line() {
        let line = parse_request_line(b"GET /raw HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.path, "/raw");
        assert_eq!(line.version, "HTTP/1.1");

        let line = parse_request_line(b"GET /\r\n").unwrap();
        assert_eq!(line.path, "/");
        assert_eq!(line.version, "HTTP/1.0");

        assert!(parse_request_line(b"GET\r\n\r\n").is_err());
        assert!(parse_request_line(b"GETX garbage").is_err());
    }

    #[test]
    fn empty_slot_is_404() {
        let response = respond(Route::Detection, None);
        assert_eq!(response.status, 404);
        assert_eq!(response.body, Bytes::from_static(b"No detection available"));

        let head = String::from_utf8(response.head()).unwrap();
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains("Connection: close\r\n"));
        assert!(head.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(head.contains("Content-Length: 22\r\n"));
    }

    #[test]
    fn serves_each_part_of_the_result() {
        let result = published();

        let raw = respond(Route::Raw, Some(&result));
        assert_eq!(raw.status, 200);
        assert_eq!(raw.content_type, "image/jpeg");
        assert_eq!(raw.body, Bytes::from_static(b"RAW"));

        let annotated = respond(Route::Annotated, Some(&result));
        assert_eq!(annotated.body, Bytes::from_static(b"ANNOTATED"));

        let detection = respond(Route::Detection, Some(&result));
        assert_eq!(detection.content_type, "application/json");
        assert_eq!(detection.body, Bytes::from_static(br#"{"count":0}"#));

        let head = String::from_utf8(detection.head()).unwrap();
        assert!(head.contains("X-Device-Id: 12\r\n"));
        assert!(head.contains("Content-Type: application/json\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn serve_reads_split_head_and_closes() {
        let store = DeviceStateStore::new();
        assert!(store.try_begin_write(12, 1.0));
        store.finish_write(12, Some(published()));

        let (mut client, mut server) = tokio::io::duplex(4096);
        // The dispatcher already consumed "GET " as the probe
        client.write_all(b"/ra").await.unwrap();
        let request = tokio::spawn(async move {
            client.write_all(b"w HTTP/1.1\r\nHost: relay\r\n\r\n").await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        });

        serve(&mut server, b"GET ", &store, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        drop(server);

        let reply = request.await.unwrap();
        let text = String::from_utf8_lossy(&reply);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\nRAW"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let store = DeviceStateStore::new();
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"GET\r\n\r\n").await.unwrap();

        serve(&mut server, b"", &store, None).await.unwrap();
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    }
}
