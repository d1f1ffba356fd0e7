//! Upload orchestrator for multi-server parallel upload.
//!
//! Uploads one blob to every target server at once, falls back per server,
//! aggregates events, and supports cancellation.

use std::sync::Arc;

use blossom_client::{BatchCancel, BlobServer, BlobUpload, Slot, exists, fan_out};
use blossom_protocol::{BlobDescriptor, Signer};
use blossom_transfer::HashEngine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::error::UploadError;
use crate::session::{ChunkedUploadSession, verify_descriptor};
use crate::types::{
    FallbackPolicy, OrchestratorConfig, ServerUploadResult, UploadBlob, UploadEvent, UploadMethod,
};
use crate::{authorize, normalize_hash};

/// Orchestrates upload of one blob to many servers.
pub struct UploadOrchestrator {
    signer: Arc<dyn Signer>,
    config: OrchestratorConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: BatchCancel,
}

impl UploadOrchestrator {
    pub fn new(signer: Arc<dyn Signer>, config: OrchestratorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            signer,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: BatchCancel::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that cancels the uploads in flight. Uploads started
    /// after the cancel are unaffected.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.token()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Uploads `blob` to every server in parallel.
    ///
    /// Returns one result per server, in the order given. A server's failure
    /// never affects another's result. The outer `Err` is reserved for
    /// failures shared by every server: hashing, or a malformed precomputed
    /// digest.
    pub async fn upload_to_servers(
        &self,
        blob: &UploadBlob,
        servers: &[Arc<dyn BlobServer>],
    ) -> Result<Vec<ServerUploadResult>, UploadError> {
        if servers.is_empty() {
            return Ok(Vec::new());
        }

        // Hash once; every session reuses the digest.
        let sha256 = match &blob.sha256 {
            Some(known) => normalize_hash(known)?,
            None => HashEngine::new(self.config.session.hash_window)
                .digest(blob.source.as_ref())
                .await
                .map_err(UploadError::HashRead)?,
        };
        info!(sha256 = %sha256, size = blob.len(), servers = servers.len(), "uploading blob");

        let blob = Arc::new(UploadBlob {
            sha256: Some(sha256.clone()),
            ..blob.clone()
        });

        let cancel = self.cancel.token();
        let slots = fan_out(servers, &cancel, |server| {
            let job = ServerJob {
                server,
                signer: Arc::clone(&self.signer),
                blob: Arc::clone(&blob),
                sha256: sha256.clone(),
                config: self.config,
                cancel: cancel.clone(),
                events_tx: self.events_tx.clone(),
            };
            job.run()
        })
        .await;

        let results = slots
            .into_iter()
            .zip(servers)
            .map(|(slot, server)| match slot {
                Slot::Done(result) => result,
                Slot::Failed(message) => ServerUploadResult {
                    server: server.endpoint().clone(),
                    method: UploadMethod::Chunked,
                    outcome: Err(UploadError::TaskFailed(message)),
                },
                Slot::Detached => ServerUploadResult {
                    server: server.endpoint().clone(),
                    method: UploadMethod::Chunked,
                    outcome: Err(UploadError::Cancelled),
                },
            })
            .collect();
        Ok(results)
    }
}

/// Everything one server's task owns.
struct ServerJob {
    server: Arc<dyn BlobServer>,
    signer: Arc<dyn Signer>,
    blob: Arc<UploadBlob>,
    sha256: String,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
}

impl ServerJob {
    async fn run(self) -> ServerUploadResult {
        let server_name = self.server.endpoint().to_string();
        let (method, outcome) = self.upload().await;

        match &outcome {
            Ok(descriptor) => {
                info!(server = %server_name, method = %method, url = %descriptor.url, "upload completed");
                self.emit(UploadEvent::Completed {
                    server: server_name,
                    method,
                    descriptor: descriptor.clone(),
                });
            }
            Err(e) => {
                error!(server = %server_name, method = %method, error = %e, "upload failed");
                self.emit(UploadEvent::Failed {
                    server: server_name,
                    error: e.to_string(),
                });
            }
        }

        ServerUploadResult {
            server: self.server.endpoint().clone(),
            method,
            outcome,
        }
    }

    async fn upload(&self) -> (UploadMethod, Result<BlobDescriptor, UploadError>) {
        if self.cancel.is_cancelled() {
            return (UploadMethod::Chunked, Err(UploadError::Cancelled));
        }

        let sha256 = self.sha256.as_str();

        // 1. Existing blob: synthesize, send nothing.
        if exists(self.server.as_ref(), sha256).await {
            let descriptor = BlobDescriptor::synthesize(
                self.server.endpoint(),
                sha256,
                self.blob.len(),
                &self.blob.mime_type,
            );
            return (UploadMethod::Existing, Ok(descriptor));
        }

        // 2. Chunked session.
        let session = ChunkedUploadSession::new(
            Arc::clone(&self.server),
            Arc::clone(&self.signer),
            self.config.session,
        )
        .with_cancel(self.cancel.clone())
        .with_events(self.events_tx.clone());

        let err = match session.run(&self.blob).await {
            Ok(descriptor) => return (UploadMethod::Chunked, Ok(descriptor)),
            Err(e) => e,
        };

        // 3. Single-shot fallback, only for "chunked unavailable".
        if self.config.fallback == FallbackPolicy::Strict || !err.allows_single_shot_fallback() {
            return (UploadMethod::Chunked, Err(err));
        }
        if self.cancel.is_cancelled() {
            return (UploadMethod::Chunked, Err(UploadError::Cancelled));
        }

        info!(server = %self.server.endpoint(), reason = %err, "falling back to single-shot upload");
        self.emit(UploadEvent::FallingBack {
            server: self.server.endpoint().to_string(),
            reason: err.to_string(),
        });

        let outcome =
            upload_single_shot(self.server.as_ref(), self.signer.as_ref(), &self.blob, sha256)
                .await;
        (UploadMethod::SingleShot, outcome)
    }

    fn emit(&self, event: UploadEvent) {
        if self.events_tx.try_send(event).is_err() {
            trace!("upload event dropped");
        }
    }
}

/// Uploads the whole blob in one `PUT /upload`.
///
/// The body is streamed from the blob's source; `sha256` must already be
/// the digest of those bytes.
pub async fn upload_single_shot(
    server: &dyn BlobServer,
    signer: &dyn Signer,
    blob: &UploadBlob,
    sha256: &str,
) -> Result<BlobDescriptor, UploadError> {
    let authorization = authorize(signer, sha256).await?;
    let request = BlobUpload {
        sha256: sha256.to_string(),
        mime_type: blob.mime_type.clone(),
        length: blob.len(),
    };

    let descriptor = server
        .upload_blob(request, &authorization, Arc::clone(&blob.source))
        .await
        .map_err(UploadError::transfer)?;
    verify_descriptor(&descriptor, sha256, blob.len())?;
    Ok(descriptor)
}
