//! Server-to-server replication of an uploaded blob.

use std::sync::Arc;

use blossom_client::{BatchCancel, BlobServer, Slot, exists, fan_out};
use blossom_protocol::{BlobDescriptor, Signer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authorize;
use crate::error::UploadError;
use crate::session::verify_descriptor;
use crate::types::ServerMirrorResult;

/// Asks mirror servers to fetch a blob from where it already lives.
pub struct MirrorCoordinator {
    signer: Arc<dyn Signer>,
    cancel: BatchCancel,
}

impl MirrorCoordinator {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            cancel: BatchCancel::new(),
        }
    }

    /// Cancels the batch in flight. Finished servers keep their results and
    /// later batches run normally.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.token()
    }

    /// Mirrors `descriptor` to every server and returns only the successes,
    /// in server order.
    pub async fn mirror(
        &self,
        descriptor: &BlobDescriptor,
        servers: &[Arc<dyn BlobServer>],
    ) -> Vec<BlobDescriptor> {
        self.mirror_all(descriptor, servers)
            .await
            .into_iter()
            .filter_map(|r| r.outcome.ok())
            .collect()
    }

    /// Mirrors `descriptor` to every server, keeping each server's outcome.
    pub async fn mirror_all(
        &self,
        descriptor: &BlobDescriptor,
        servers: &[Arc<dyn BlobServer>],
    ) -> Vec<ServerMirrorResult> {
        let descriptor = Arc::new(descriptor.clone());
        let cancel = self.cancel.token();
        let slots = fan_out(servers, &cancel, |server| {
            let signer = Arc::clone(&self.signer);
            let descriptor = Arc::clone(&descriptor);
            let cancel = cancel.clone();
            async move { mirror_one(server, signer, descriptor, cancel).await }
        })
        .await;

        let results: Vec<ServerMirrorResult> = slots
            .into_iter()
            .zip(servers)
            .map(|(slot, server)| match slot {
                Slot::Done(result) => result,
                Slot::Failed(message) => ServerMirrorResult {
                    server: server.endpoint().clone(),
                    existing: false,
                    outcome: Err(UploadError::TaskFailed(message)),
                },
                Slot::Detached => ServerMirrorResult {
                    server: server.endpoint().clone(),
                    existing: false,
                    outcome: Err(UploadError::Cancelled),
                },
            })
            .collect();

        info!(
            sha256 = %descriptor.sha256,
            mirrored = results.iter().filter(|r| r.outcome.is_ok()).count(),
            targets = results.len(),
            "mirror batch finished"
        );
        results
    }
}

async fn mirror_one(
    server: Arc<dyn BlobServer>,
    signer: Arc<dyn Signer>,
    descriptor: Arc<BlobDescriptor>,
    cancel: CancellationToken,
) -> ServerMirrorResult {
    let endpoint = server.endpoint().clone();

    if cancel.is_cancelled() {
        return ServerMirrorResult {
            server: endpoint,
            existing: false,
            outcome: Err(UploadError::Cancelled),
        };
    }

    if exists(server.as_ref(), &descriptor.sha256).await {
        debug!(server = %endpoint, sha256 = %descriptor.sha256, "already mirrored");
        return ServerMirrorResult {
            outcome: Ok(descriptor.rehome(&endpoint)),
            server: endpoint,
            existing: true,
        };
    }

    let outcome = request_mirror(server.as_ref(), signer.as_ref(), &descriptor).await;
    if let Err(e) = &outcome {
        warn!(server = %endpoint, error = %e, "mirror failed");
    }
    ServerMirrorResult {
        server: endpoint,
        existing: false,
        outcome,
    }
}

async fn request_mirror(
    server: &dyn BlobServer,
    signer: &dyn Signer,
    descriptor: &BlobDescriptor,
) -> Result<BlobDescriptor, UploadError> {
    let authorization = authorize(signer, &descriptor.sha256).await?;
    let mirrored = server
        .mirror_blob(&descriptor.url, &authorization)
        .await
        .map_err(UploadError::mirror)?;
    verify_descriptor(&mirrored, &descriptor.sha256, descriptor.size)?;
    Ok(mirrored)
}
