//! Chunked upload of one blob to one server.
//!
//! The session walks `negotiating → hashing → authorizing → transferring →
//! finalizing` and ends in `complete` or `failed`. It never falls back to a
//! single-shot PUT itself; that decision belongs to the orchestrator.

use std::sync::Arc;
use std::time::Instant;

use blossom_client::{BlobServer, ChunkResponse, ChunkUpload};
use blossom_protocol::{BlobDescriptor, ChunkedSupport, Signer};
use blossom_transfer::{ChunkPlan, ChunkRange, HashEngine, ProgressMeter};
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{UnsupportedReason, UploadError};
use crate::types::{SessionConfig, SessionState, UploadBlob, UploadEvent};
use crate::{authorize, normalize_hash};

/// Drives one chunked upload against one server.
pub struct ChunkedUploadSession {
    server: Arc<dyn BlobServer>,
    signer: Arc<dyn Signer>,
    config: SessionConfig,
    cancel: CancellationToken,
    events_tx: Option<mpsc::Sender<UploadEvent>>,
    state_tx: watch::Sender<SessionState>,
}

impl ChunkedUploadSession {
    pub fn new(server: Arc<dyn BlobServer>, signer: Arc<dyn Signer>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            server,
            signer,
            config,
            cancel: CancellationToken::new(),
            events_tx: None,
            state_tx,
        }
    }

    /// Checks `cancel` between steps and batches.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sends state changes and per-chunk progress to `events_tx`.
    pub fn with_events(mut self, events_tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Runs the session to completion.
    ///
    /// A session runs once; calling this again after a terminal state
    /// starts over from negotiation.
    pub async fn run(&self, blob: &UploadBlob) -> Result<BlobDescriptor, UploadError> {
        let result = self.drive(blob).await;
        match &result {
            Ok(desc) => {
                self.transition(SessionState::Complete);
                info!(
                    server = %self.server.endpoint(),
                    sha256 = %desc.sha256,
                    size = desc.size,
                    "chunked upload complete"
                );
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                warn!(server = %self.server.endpoint(), error = %e, "chunked upload failed");
            }
        }
        result
    }

    async fn drive(&self, blob: &UploadBlob) -> Result<BlobDescriptor, UploadError> {
        let server_name = self.server.endpoint().to_string();
        let size = blob.len();

        // 1. Negotiate
        self.transition(SessionState::Negotiating);
        self.check_cancelled()?;
        if size == 0 {
            return Err(UploadError::Unsupported {
                server: server_name,
                reason: UnsupportedReason::EmptyBlob,
            });
        }

        let caps = match self.server.negotiate().await {
            Ok(caps) => caps,
            Err(e) => {
                return Err(UploadError::Unsupported {
                    server: server_name,
                    reason: UnsupportedReason::Unreachable(e.to_string()),
                });
            }
        };
        match caps.chunked {
            ChunkedSupport::Supported => {}
            ChunkedSupport::Unsupported => {
                return Err(UploadError::Unsupported {
                    server: server_name,
                    reason: UnsupportedReason::Declined,
                });
            }
            ChunkedSupport::Unknown(cause) => {
                return Err(UploadError::Unsupported {
                    server: server_name,
                    reason: UnsupportedReason::Unreachable(cause),
                });
            }
        }
        let chunk_size = self.config.effective_chunk_size(caps.max_chunk_size);

        // 2. Hash
        self.transition(SessionState::Hashing);
        self.check_cancelled()?;
        let sha256 = match &blob.sha256 {
            Some(known) => normalize_hash(known)?,
            None => HashEngine::new(self.config.hash_window)
                .digest(blob.source.as_ref())
                .await
                .map_err(UploadError::HashRead)?,
        };

        // 3. Authorize
        self.transition(SessionState::Authorizing);
        self.check_cancelled()?;
        let authorization = authorize(self.signer.as_ref(), &sha256).await?;

        // 4. Transfer
        self.transition(SessionState::Transferring);
        let plan = ChunkPlan::new(size, chunk_size).map_err(UploadError::Planning)?;
        let meter = ProgressMeter::new(size);
        let template = ChunkUpload {
            sha256: sha256.clone(),
            mime_type: blob.mime_type.clone(),
            total_length: size,
            offset: 0,
        };

        debug!(
            server = %server_name,
            sha256 = %sha256,
            size,
            chunk_size,
            chunks = plan.len(),
            concurrency = self.config.concurrency.max(1),
            "starting chunked upload"
        );

        let leading: Vec<ChunkRange> = plan.leading().collect();
        for batch in leading.chunks(self.config.concurrency.max(1)) {
            self.check_cancelled()?;
            let sends = batch
                .iter()
                .map(|range| self.send_chunk(blob, &template, &authorization, *range, &meter));
            // Every chunk of the batch settles before the next batch starts.
            for result in join_all(sends).await {
                result?;
            }
        }

        // The final chunk goes alone, strictly after every other chunk.
        self.check_cancelled()?;
        let last = plan.last().ok_or_else(|| UploadError::Unsupported {
            server: server_name.clone(),
            reason: UnsupportedReason::EmptyBlob,
        })?;
        let response = self
            .send_chunk(blob, &template, &authorization, last, &meter)
            .await?;

        // 5. Finalize
        self.transition(SessionState::Finalizing);
        let descriptor = response
            .descriptor
            .ok_or(UploadError::IncompleteUpload {
                server: server_name,
            })?;
        verify_descriptor(&descriptor, &sha256, size)?;
        Ok(descriptor)
    }

    async fn send_chunk(
        &self,
        blob: &UploadBlob,
        template: &ChunkUpload,
        authorization: &str,
        range: ChunkRange,
        meter: &ProgressMeter,
    ) -> Result<ChunkResponse, UploadError> {
        let body = blob
            .source
            .read_range(range.offset, range.length)
            .await
            .map_err(|source| UploadError::ChunkRead {
                offset: range.offset,
                source,
            })?;

        let chunk = ChunkUpload {
            offset: range.offset,
            ..template.clone()
        };

        let started = Instant::now();
        let response = self
            .server
            .upload_chunk(chunk, authorization, body)
            .await
            .map_err(|e| UploadError::chunk(range.offset, e))?;

        let progress = meter.record(range.length, started.elapsed());
        trace!(
            server = %self.server.endpoint(),
            offset = range.offset,
            bytes = range.length,
            percent = progress.percentage(),
            "chunk sent"
        );
        self.emit(UploadEvent::Progress {
            server: self.server.endpoint().to_string(),
            progress,
        });

        Ok(response)
    }

    fn transition(&self, state: SessionState) {
        self.state_tx.send_replace(state);
        self.emit(UploadEvent::StateChanged {
            server: self.server.endpoint().to_string(),
            state,
        });
    }

    /// Events are best-effort: a full or closed channel drops them rather
    /// than stalling the transfer.
    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events_tx
            && tx.try_send(event).is_err()
        {
            trace!("upload event dropped");
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}

/// Uploads `blob` to one server with chunked transfer only.
///
/// There is no single-shot fallback on this path: a server without chunked
/// support fails with [`UploadError::Unsupported`].
pub async fn upload_chunked(
    server: Arc<dyn BlobServer>,
    signer: Arc<dyn Signer>,
    blob: &UploadBlob,
    config: SessionConfig,
) -> Result<BlobDescriptor, UploadError> {
    ChunkedUploadSession::new(server, signer, config)
        .run(blob)
        .await
}

/// Checks that a server's descriptor describes the bytes that were sent.
///
/// A zero `size` is tolerated since some servers omit it.
pub(crate) fn verify_descriptor(
    descriptor: &BlobDescriptor,
    sha256: &str,
    size: u64,
) -> Result<(), UploadError> {
    let sha_ok = descriptor.sha256.eq_ignore_ascii_case(sha256);
    let size_ok = descriptor.size == 0 || descriptor.size == size;
    if sha_ok && size_ok {
        return Ok(());
    }
    Err(UploadError::DigestMismatch {
        expected_sha256: sha256.to_string(),
        expected_size: size,
        actual_sha256: descriptor.sha256.clone(),
        actual_size: descriptor.size,
    })
}
