//! Upload, fallback and mirroring flows for Blossom servers.
//!
//! This crate holds the **coordination logic** only. Every network call goes
//! through [`blossom_client::BlobServer`] and every authorization through
//! [`blossom_protocol::Signer`], so the flows run unchanged against mocks.
//!
//! # Pipeline
//!
//! 1. **Probe**: skip servers that already hold the hash
//! 2. **Negotiate**: ask each server whether it takes chunked uploads
//! 3. **Hash**: once per blob, shared by every server
//! 4. **Authorize**: one signed event per (hash, server)
//! 5. **Transfer**: leading chunks in batches, then the final chunk alone
//! 6. **Fall back**: single-shot PUT where chunking is unavailable
//! 7. **Mirror**: ask further servers to fetch the blob themselves

pub mod error;
pub mod mirror;
#[cfg(test)]
mod mock;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use error::{UnsupportedReason, UploadError};
pub use mirror::MirrorCoordinator;
pub use orchestrator::{UploadOrchestrator, upload_single_shot};
pub use session::{ChunkedUploadSession, upload_chunked};
pub use types::{
    FallbackPolicy, OrchestratorConfig, ServerMirrorResult, ServerUploadResult, SessionConfig,
    SessionState, UploadBlob, UploadEvent, UploadMethod,
};

use blossom_protocol::{Signer, authorization_header, normalize_sha256};

/// Signs an upload authorization for `sha256` and encodes the header value.
pub(crate) async fn authorize(signer: &dyn Signer, sha256: &str) -> Result<String, UploadError> {
    let event = signer.create_upload_auth(sha256).await?;
    Ok(authorization_header(&event)?)
}

/// Validates a caller-supplied digest and lowercases it.
pub(crate) fn normalize_hash(sha256: &str) -> Result<String, UploadError> {
    normalize_sha256(sha256).map_err(UploadError::InvalidHash)
}
