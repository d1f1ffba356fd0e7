//! Data types for the upload and mirror flows.

use std::fmt;
use std::sync::Arc;

use blossom_protocol::{BlobDescriptor, ServerEndpoint};
use blossom_transfer::{BlobSource, DEFAULT_CHUNK_SIZE, DEFAULT_HASH_WINDOW, TransferProgress};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Blob handed to a session or the orchestrator.
#[derive(Clone)]
pub struct UploadBlob {
    pub source: Arc<dyn BlobSource>,
    /// Declared MIME type, sent as `Upload-Type` / `Content-Type`.
    pub mime_type: String,
    /// Precomputed digest. Hashing is skipped when present.
    pub sha256: Option<String>,
}

impl UploadBlob {
    pub fn new(source: Arc<dyn BlobSource>, mime_type: impl Into<String>) -> Self {
        Self {
            source,
            mime_type: mime_type.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn len(&self) -> u64 {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Debug for UploadBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBlob")
            .field("len", &self.source.len())
            .field("mime_type", &self.mime_type)
            .field("sha256", &self.sha256)
            .finish()
    }
}

/// Lifecycle of one (blob, server) chunked upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Negotiating,
    Hashing,
    Authorizing,
    Transferring,
    Finalizing,
    Complete,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Negotiating => "negotiating",
            Self::Hashing => "hashing",
            Self::Authorizing => "authorizing",
            Self::Transferring => "transferring",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the orchestrator does when chunked upload is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Retry the same server with one whole-blob PUT.
    #[default]
    SingleShot,
    /// Surface the chunked failure as-is.
    Strict,
}

/// Knobs for a single chunked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Preferred chunk size; lowered to the server's `Max-Chunk-Size`.
    pub chunk_size: u64,
    /// Leading chunks in flight at once. Zero is treated as one.
    pub concurrency: usize,
    /// Read window for hashing.
    pub hash_window: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 1,
            hash_window: DEFAULT_HASH_WINDOW,
        }
    }
}

impl SessionConfig {
    /// Chunk size to use against a server advertising `max_chunk_size`.
    pub fn effective_chunk_size(&self, max_chunk_size: Option<u64>) -> u64 {
        let configured = if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        };
        match max_chunk_size {
            Some(max) if max > 0 => configured.min(max),
            _ => configured,
        }
    }
}

/// Config for [`crate::UploadOrchestrator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub session: SessionConfig,
    pub fallback: FallbackPolicy,
}

/// How a server ended up holding the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadMethod {
    /// Existence probe found it; nothing was sent.
    Existing,
    Chunked,
    SingleShot,
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Existing => "existing",
            Self::Chunked => "chunked",
            Self::SingleShot => "single-shot",
        };
        f.write_str(s)
    }
}

/// Outcome for one server of an orchestrated upload.
#[derive(Debug)]
pub struct ServerUploadResult {
    pub server: ServerEndpoint,
    /// The last path attempted.
    pub method: UploadMethod,
    pub outcome: Result<BlobDescriptor, UploadError>,
}

impl ServerUploadResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn descriptor(&self) -> Option<&BlobDescriptor> {
        self.outcome.as_ref().ok()
    }
}

/// Outcome for one mirror target.
#[derive(Debug)]
pub struct ServerMirrorResult {
    pub server: ServerEndpoint,
    /// True when the server already held the blob and no mirror request
    /// was sent.
    pub existing: bool,
    pub outcome: Result<BlobDescriptor, UploadError>,
}

/// Event emitted while uploading.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    StateChanged {
        server: String,
        state: SessionState,
    },
    Progress {
        server: String,
        progress: TransferProgress,
    },
    /// Chunked upload was unavailable; retrying with a single-shot PUT.
    FallingBack { server: String, reason: String },
    Completed {
        server: String,
        method: UploadMethod,
        descriptor: BlobDescriptor,
    },
    Failed { server: String, error: String },
}
