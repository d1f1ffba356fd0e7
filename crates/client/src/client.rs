//! Blossom HTTP client for one server.
//!
//! Async HTTP client using `reqwest`. Every call carries its own timeout so a
//! slow server surfaces as [`ClientError::Timeout`] rather than a hang.

use std::sync::Arc;
use std::time::Duration;

use blossom_protocol::constants::{
    CHUNK_CONTENT_TYPE, HEADER_REASON, HEADER_SHA256, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_OFFSET,
    HEADER_UPLOAD_TYPE,
};
use blossom_protocol::{BlobDescriptor, MirrorRequest, ServerEndpoint};
use blossom_transfer::{BlobSource, range_stream};
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, RequestBuilder, Response};
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::types::{BlobUpload, ChunkResponse, ChunkUpload, HeadResponse, Operation};

const USER_AGENT: &str = concat!("blossom-client/", env!("CARGO_PKG_VERSION"));

/// Read window for streamed single-shot bodies.
const BODY_WINDOW: u64 = 1024 * 1024;

/// Per-operation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// HEAD existence/availability probes.
    pub probe: Duration,
    /// OPTIONS capability discovery.
    pub negotiate: Duration,
    /// Chunk, single-shot and mirror transfers. `None` waits indefinitely.
    pub transfer: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            negotiate: Duration::from_secs(10),
            transfer: None,
        }
    }
}

/// HTTP client bound to one server endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: ServerEndpoint,
    timeouts: Timeouts,
}

impl Client {
    /// Creates a client with its own connection pool.
    pub fn new(endpoint: ServerEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        Ok(Self::with_http(http, endpoint))
    }

    /// Creates a client sharing an existing `reqwest` pool.
    pub fn with_http(http: reqwest::Client, endpoint: ServerEndpoint) -> Self {
        Self {
            http,
            endpoint,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Sends `req` with `timeout`, mapping transport failures.
    async fn send(
        &self,
        operation: Operation,
        req: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<Response, ClientError> {
        let req = match timeout {
            Some(t) => req.timeout(t),
            None => req,
        };
        req.send()
            .await
            .map_err(|e| ClientError::from_reqwest(operation, timeout, e))
    }

    /// `OPTIONS {server}/upload`. Returns the headers of a 2xx response, or
    /// `None` when the server answered with any other status.
    pub async fn options_upload(&self) -> Result<Option<HeaderMap>, ClientError> {
        let url = self.endpoint.upload_url();
        trace!(%url, "discovering upload capabilities");
        let resp = self
            .send(
                Operation::Negotiate,
                self.http.request(Method::OPTIONS, &url),
                Some(self.timeouts.negotiate),
            )
            .await?;

        if !resp.status().is_success() {
            debug!(%url, status = resp.status().as_u16(), "capability discovery declined");
            return Ok(None);
        }
        Ok(Some(resp.headers().clone()))
    }

    /// `HEAD {server}/{sha256}[.ext]`. Any HTTP status is a valid answer;
    /// only transport failures and timeouts are errors.
    pub async fn head_blob(
        &self,
        sha256: &str,
        ext: Option<&str>,
    ) -> Result<HeadResponse, ClientError> {
        let url = self.endpoint.blob_url(sha256, ext);
        let resp = self
            .send(
                Operation::Probe,
                self.http.head(&url),
                Some(self.timeouts.probe),
            )
            .await?;

        let content_length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(HeadResponse {
            status: resp.status().as_u16(),
            content_length,
        })
    }

    /// `PATCH {server}/upload` with one chunk.
    pub async fn patch_chunk(
        &self,
        chunk: &ChunkUpload,
        authorization: &str,
        body: Bytes,
    ) -> Result<ChunkResponse, ClientError> {
        let length = body.len();
        let req = self
            .http
            .patch(self.endpoint.upload_url())
            .header(CONTENT_TYPE, CHUNK_CONTENT_TYPE)
            .header(CONTENT_LENGTH, length)
            .header(HEADER_SHA256, &chunk.sha256)
            .header(HEADER_UPLOAD_TYPE, &chunk.mime_type)
            .header(HEADER_UPLOAD_LENGTH, chunk.total_length)
            .header(HEADER_UPLOAD_OFFSET, chunk.offset)
            .header(AUTHORIZATION, authorization)
            .body(body);

        let resp = self
            .send(Operation::ChunkUpload, req, self.timeouts.transfer)
            .await?;
        let resp = check_status(Operation::ChunkUpload, resp).await?;
        let status = resp.status().as_u16();

        let body = resp
            .bytes()
            .await
            .map_err(|e| ClientError::from_reqwest(Operation::ChunkUpload, self.timeouts.transfer, e))?;

        // Intermediate chunks usually answer with an empty body or a status
        // object; only a full descriptor counts as completion.
        let descriptor = if body.is_empty() {
            None
        } else {
            match serde_json::from_slice::<BlobDescriptor>(&body) {
                Ok(desc) => Some(desc),
                Err(e) => {
                    trace!(offset = chunk.offset, error = %e, "chunk response is not a descriptor");
                    None
                }
            }
        };

        debug!(
            server = %self.endpoint,
            offset = chunk.offset,
            bytes = length,
            status,
            complete = descriptor.is_some(),
            "chunk accepted"
        );
        Ok(ChunkResponse { status, descriptor })
    }

    /// `PUT {server}/upload` with the whole blob, streamed from `source`.
    pub async fn put_blob(
        &self,
        blob: &BlobUpload,
        authorization: &str,
        source: Arc<dyn BlobSource>,
    ) -> Result<BlobDescriptor, ClientError> {
        let stream = range_stream(source, BODY_WINDOW).map_err(|e| ClientError::Source(e.to_string()));
        let mut req = self
            .http
            .put(self.endpoint.upload_url())
            .header(CONTENT_LENGTH, blob.length)
            .header(HEADER_SHA256, &blob.sha256)
            .header(AUTHORIZATION, authorization)
            .body(reqwest::Body::wrap_stream(stream));
        if !blob.mime_type.is_empty() {
            req = req.header(CONTENT_TYPE, &blob.mime_type);
        }

        let resp = self.send(Operation::Upload, req, self.timeouts.transfer).await?;
        let resp = check_status(Operation::Upload, resp).await?;
        decode_descriptor(Operation::Upload, resp).await
    }

    /// `PUT {server}/mirror` asking the server to fetch `source_url` itself.
    pub async fn put_mirror(
        &self,
        source_url: &str,
        authorization: &str,
    ) -> Result<BlobDescriptor, ClientError> {
        let req = self
            .http
            .put(self.endpoint.mirror_url())
            .header(AUTHORIZATION, authorization)
            .json(&MirrorRequest {
                url: source_url.to_string(),
            });

        let resp = self.send(Operation::Mirror, req, self.timeouts.transfer).await?;
        let resp = check_status(Operation::Mirror, resp).await?;
        decode_descriptor(Operation::Mirror, resp).await
    }
}

/// Turns a non-2xx response into [`ClientError::Status`], preferring the
/// server's `X-Reason` header over the body text.
async fn check_status(operation: Operation, resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let header_reason = resp
        .headers()
        .get(HEADER_REASON)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let reason = match header_reason {
        Some(reason) => reason,
        None => resp.text().await.unwrap_or_default(),
    };

    Err(ClientError::Status {
        operation,
        status: status.as_u16(),
        reason,
    })
}

async fn decode_descriptor(
    operation: Operation,
    resp: Response,
) -> Result<BlobDescriptor, ClientError> {
    let body = resp.bytes().await.map_err(|e| ClientError::Transport {
        operation,
        message: e.to_string(),
    })?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
        operation,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_protocol::ServerRole;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const HASH: &str = "b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553";

    /// Starts a mock HTTP server that answers one request with `response`.
    async fn mock_server(response: String) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, handle)
    }

    /// Accepts connections but never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        (url, handle)
    }

    fn client_for(url: &str) -> Client {
        Client::new(ServerEndpoint::parse(url, ServerRole::Upload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn head_reports_status_and_length() {
        let (url, handle) = mock_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nContent-Type: video/mp4\r\nConnection: close\r\n\r\n"
                .into(),
        )
        .await;

        let head = client_for(&url).head_blob(HASH, Some("mp4")).await.unwrap();
        assert!(head.is_present());
        assert_eq!(head.content_length, Some(1234));

        handle.abort();
    }

    #[tokio::test]
    async fn probe_timeout_is_distinguishable() {
        let (url, handle) = silent_server().await;

        let client = client_for(&url).with_timeouts(Timeouts {
            probe: Duration::from_millis(200),
            ..Timeouts::default()
        });
        let err = client.head_blob(HASH, None).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(matches!(
            err,
            ClientError::Timeout {
                operation: Operation::Probe,
                ..
            }
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let err = client_for(&format!("http://127.0.0.1:{port}"))
            .head_blob(HASH, None)
            .await
            .unwrap_err();
        assert!(err.is_transport(), "expected transport error, got {err}");
    }

    #[tokio::test]
    async fn error_status_prefers_reason_header() {
        let (url, handle) = mock_server(
            "HTTP/1.1 401 Unauthorized\r\nX-Reason: auth event expired\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope"
                .into(),
        )
        .await;

        let err = client_for(&url)
            .put_mirror("https://a.example.com/x", "Nostr e30=")
            .await
            .unwrap_err();
        match err {
            ClientError::Status {
                operation,
                status,
                reason,
            } => {
                assert_eq!(operation, Operation::Mirror);
                assert_eq!(status, 401);
                assert_eq!(reason, "auth event expired");
            }
            other => panic!("unexpected error: {other}"),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn options_non_success_is_none() {
        let (url, handle) = mock_server(
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".into(),
        )
        .await;

        assert!(client_for(&url).options_upload().await.unwrap().is_none());

        handle.abort();
    }

    #[test]
    fn default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.probe, Duration::from_secs(5));
        assert_eq!(t.negotiate, Duration::from_secs(10));
        assert!(t.transfer.is_none());
    }
}
