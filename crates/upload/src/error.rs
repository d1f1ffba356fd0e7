//! Upload error types.

use std::fmt;

use blossom_client::ClientError;
use blossom_protocol::{ProtocolError, SignerError};
use blossom_transfer::TransferError;

/// Why a server cannot take a chunked upload.
///
/// `Declined` and `Unreachable` are kept apart so callers can tell a server
/// that said no from one that could not be asked, even though both allow
/// the single-shot fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Discovery answered without any chunked-upload signal.
    Declined,
    /// Discovery failed at the transport layer.
    Unreachable(String),
    /// Zero-byte blobs have no chunks to send.
    EmptyBlob,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined => f.write_str("server does not advertise chunked uploads"),
            Self::Unreachable(cause) => write!(f, "capability discovery failed: {cause}"),
            Self::EmptyBlob => f.write_str("blob is empty"),
        }
    }
}

/// Errors produced by upload and mirror flows.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("hashing failed: {0}")]
    HashRead(#[source] TransferError),

    #[error(transparent)]
    InvalidHash(ProtocolError),

    #[error("chunked upload unavailable on {server}: {reason}")]
    Unsupported {
        server: String,
        reason: UnsupportedReason,
    },

    #[error("authorization failed: {0}")]
    Signer(#[from] SignerError),

    #[error("failed to encode authorization: {0}")]
    Authorization(#[from] ProtocolError),

    #[error("invalid chunk plan: {0}")]
    Planning(#[source] TransferError),

    #[error("failed to read chunk at offset {offset}: {source}")]
    ChunkRead {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk at offset {offset} failed: {source}")]
    ChunkTransfer {
        offset: u64,
        #[source]
        source: ClientError,
    },

    #[error("{server} accepted the final chunk without returning a blob descriptor")]
    IncompleteUpload { server: String },

    #[error(
        "descriptor mismatch: expected {expected_sha256} ({expected_size} bytes), got {actual_sha256} ({actual_size} bytes)"
    )]
    DigestMismatch {
        expected_sha256: String,
        expected_size: u64,
        actual_sha256: String,
        actual_size: u64,
    },

    #[error("upload failed: {0}")]
    Transfer(#[source] ClientError),

    #[error("mirror failed: {0}")]
    MirrorTransfer(#[source] ClientError),

    #[error("{0}")]
    Timeout(#[source] ClientError),

    #[error("cancelled")]
    Cancelled,

    #[error("server task failed: {0}")]
    TaskFailed(String),
}

impl UploadError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::ChunkTransfer { source, .. } => source.is_timeout(),
            Self::Transfer(e) | Self::MirrorTransfer(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether the orchestrator may retry this server with a single-shot
    /// PUT.
    ///
    /// True for any [`UploadError::Unsupported`], and for a first chunk that
    /// never got an HTTP response. The latter is how a server that rejects
    /// PATCH at the CORS or proxy layer shows up after discovery succeeded.
    pub fn allows_single_shot_fallback(&self) -> bool {
        match self {
            Self::Unsupported { .. } => true,
            Self::ChunkTransfer { offset: 0, source } => source.is_transport(),
            _ => false,
        }
    }

    /// Wraps a chunk failure, promoting timeouts.
    pub(crate) fn chunk(offset: u64, source: ClientError) -> Self {
        if source.is_timeout() {
            Self::Timeout(source)
        } else {
            Self::ChunkTransfer { offset, source }
        }
    }

    pub(crate) fn transfer(source: ClientError) -> Self {
        if source.is_timeout() {
            Self::Timeout(source)
        } else {
            Self::Transfer(source)
        }
    }

    pub(crate) fn mirror(source: ClientError) -> Self {
        if source.is_timeout() {
            Self::Timeout(source)
        } else {
            Self::MirrorTransfer(source)
        }
    }
}
