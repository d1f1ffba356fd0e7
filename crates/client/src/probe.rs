//! Existence probe.

use tracing::debug;

use crate::server::BlobServer;

/// Whether `server` already holds `sha256`.
///
/// Fails open: a transport error or timeout reads as "absent" so a flaky
/// probe only ever costs a redundant upload.
pub async fn exists(server: &dyn BlobServer, sha256: &str) -> bool {
    match server.head_blob(sha256, None).await {
        Ok(head) => {
            debug!(server = %server.endpoint(), sha256, status = head.status, "existence probe");
            head.is_present()
        }
        Err(e) => {
            debug!(server = %server.endpoint(), sha256, error = %e, "existence probe failed, assuming absent");
            false
        }
    }
}
