//! In-process `BlobServer` and `Signer` doubles for coordinator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blossom_client::{
    BlobServer, BlobUpload, ChunkResponse, ChunkUpload, ClientError, HeadResponse, Operation,
};
use blossom_protocol::{
    BlobDescriptor, ChunkedSupport, ServerEndpoint, ServerRole, SignedEvent, Signer, SignerError,
    UploadCapabilities,
};
use blossom_transfer::BlobSource;
use bytes::Bytes;
use chrono::Utc;
use futures_util::future::BoxFuture;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Negotiate,
    Head,
    ChunkStart { offset: u64 },
    ChunkEnd { offset: u64 },
    Put { length: u64, bytes: u64 },
    Mirror { url: String },
}

type DelayFn = Box<dyn Fn(u64) -> Duration + Send + Sync>;

pub struct MockServer {
    endpoint: ServerEndpoint,
    capabilities: Result<UploadCapabilities, ClientError>,
    present: bool,
    descriptor_on_final: bool,
    wrong_digest: bool,
    chunk_failure: Option<(u64, ClientError)>,
    put_failure: Option<ClientError>,
    mirror_failure: Option<ClientError>,
    chunk_delay: Option<DelayFn>,
    calls: Mutex<Vec<Call>>,
    chunks: Mutex<Vec<(u64, u64)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockServer {
    /// A server that supports chunked uploads and holds nothing.
    pub fn new(url: &str) -> Self {
        Self {
            endpoint: ServerEndpoint::parse(url, ServerRole::Upload).unwrap(),
            capabilities: Ok(UploadCapabilities {
                chunked: ChunkedSupport::Supported,
                max_chunk_size: None,
                discovered_at: Utc::now(),
            }),
            present: false,
            descriptor_on_final: true,
            wrong_digest: false,
            chunk_failure: None,
            put_failure: None,
            mirror_failure: None,
            chunk_delay: None,
            calls: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn present(mut self) -> Self {
        self.present = true;
        self
    }

    pub fn declines_chunked(mut self) -> Self {
        self.capabilities = Ok(UploadCapabilities {
            chunked: ChunkedSupport::Unsupported,
            max_chunk_size: None,
            discovered_at: Utc::now(),
        });
        self
    }

    pub fn unreachable_options(mut self) -> Self {
        self.capabilities = Ok(UploadCapabilities::unknown(
            "capability discovery failed: connection refused",
        ));
        self
    }

    pub fn max_chunk_size(mut self, max: u64) -> Self {
        if let Ok(caps) = &mut self.capabilities {
            caps.max_chunk_size = Some(max);
        }
        self
    }

    pub fn no_descriptor(mut self) -> Self {
        self.descriptor_on_final = false;
        self
    }

    pub fn wrong_digest(mut self) -> Self {
        self.wrong_digest = true;
        self
    }

    pub fn fail_chunk_at(mut self, offset: u64, err: ClientError) -> Self {
        self.chunk_failure = Some((offset, err));
        self
    }

    pub fn fail_put(mut self, err: ClientError) -> Self {
        self.put_failure = Some(err);
        self
    }

    pub fn fail_mirror(mut self, err: ClientError) -> Self {
        self.mirror_failure = Some(err);
        self
    }

    pub fn chunk_delay(mut self, delay: impl Fn(u64) -> Duration + Send + Sync + 'static) -> Self {
        self.chunk_delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `(offset, length)` of every chunk attempted, in start order.
    pub fn chunks(&self) -> Vec<(u64, u64)> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
        self.chunks.lock().unwrap().clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn descriptor(&self, sha256: &str, size: u64, mime_type: &str) -> BlobDescriptor {
        let sha256 = if self.wrong_digest {
            "f".repeat(64)
        } else {
            sha256.to_string()
        };
        BlobDescriptor::synthesize(&self.endpoint, &sha256, size, mime_type)
    }
}

pub fn transport_error(operation: Operation) -> ClientError {
    ClientError::Transport {
        operation,
        message: "connection reset by peer".into(),
    }
}

impl BlobServer for MockServer {
    fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    fn negotiate(&self) -> BoxFuture<'_, Result<UploadCapabilities, ClientError>> {
        self.record(Call::Negotiate);
        let caps = self.capabilities.clone();
        Box::pin(async move { caps })
    }

    fn head_blob<'a>(
        &'a self,
        _sha256: &'a str,
        _ext: Option<&'a str>,
    ) -> BoxFuture<'a, Result<HeadResponse, ClientError>> {
        self.record(Call::Head);
        let status = if self.present { 200 } else { 404 };
        Box::pin(async move {
            Ok(HeadResponse {
                status,
                content_length: None,
            })
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        chunk: ChunkUpload,
        _authorization: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<ChunkResponse, ClientError>> {
        Box::pin(async move {
            let offset = chunk.offset;
            let length = body.len() as u64;
            self.record(Call::ChunkStart { offset });
            self.chunks.lock().unwrap().push((offset, length));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = &self.chunk_delay {
                tokio::time::sleep(delay(offset)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.record(Call::ChunkEnd { offset });

            if let Some((at, err)) = &self.chunk_failure
                && *at == offset
            {
                return Err(err.clone());
            }

            let is_final = offset + length == chunk.total_length;
            let descriptor = (is_final && self.descriptor_on_final)
                .then(|| self.descriptor(&chunk.sha256, chunk.total_length, &chunk.mime_type));
            Ok(ChunkResponse {
                status: if is_final { 200 } else { 204 },
                descriptor,
            })
        })
    }

    fn upload_blob<'a>(
        &'a self,
        blob: BlobUpload,
        _authorization: &'a str,
        source: Arc<dyn BlobSource>,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>> {
        Box::pin(async move {
            let bytes = source
                .read_range(0, source.len())
                .await
                .map_err(|e| ClientError::Source(e.to_string()))?;
            self.record(Call::Put {
                length: blob.length,
                bytes: bytes.len() as u64,
            });
            if let Some(err) = &self.put_failure {
                return Err(err.clone());
            }
            Ok(self.descriptor(&blob.sha256, blob.length, &blob.mime_type))
        })
    }

    fn mirror_blob<'a>(
        &'a self,
        source_url: &'a str,
        _authorization: &'a str,
    ) -> BoxFuture<'a, Result<BlobDescriptor, ClientError>> {
        Box::pin(async move {
            self.record(Call::Mirror {
                url: source_url.to_string(),
            });
            if let Some(err) = &self.mirror_failure {
                return Err(err.clone());
            }
            let addr = blossom_protocol::ContentAddress::from_url(source_url)
                .ok_or_else(|| ClientError::InvalidRequest(source_url.to_string()))?;
            Ok(self.descriptor(&addr.sha256, 0, ""))
        })
    }
}

/// Signs anything, counting requests.
#[derive(Default)]
pub struct StaticSigner {
    pub signed: AtomicUsize,
}

impl Signer for StaticSigner {
    fn create_upload_auth<'a>(
        &'a self,
        sha256: &'a str,
    ) -> BoxFuture<'a, Result<SignedEvent, SignerError>> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(SignedEvent(serde_json::json!({
                "kind": 24242,
                "tags": [["t", "upload"], ["x", sha256]],
            })))
        })
    }
}

pub struct FailingSigner;

impl Signer for FailingSigner {
    fn create_upload_auth<'a>(
        &'a self,
        _sha256: &'a str,
    ) -> BoxFuture<'a, Result<SignedEvent, SignerError>> {
        Box::pin(async { Err(SignerError::Rejected("user declined".into())) })
    }
}
