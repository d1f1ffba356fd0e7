//! Wire protocol types for talking to Blossom blob servers.
//!
//! Everything here is transport-agnostic: descriptors, endpoints, the header
//! vocabulary, content-address parsing and the `Authorization: Nostr ...`
//! encoding. HTTP lives in `blossom-client`.

pub mod auth;
pub mod constants;
pub mod content;
pub mod endpoint;
pub mod types;

pub use auth::{SignedEvent, Signer, SignerError, authorization_header};
pub use content::{
    ContentAddress, extension_for_mime, is_sha256_hex, mime_for_extension, normalize_sha256,
};
pub use endpoint::{ServerEndpoint, ServerRole, normalize_server_url};
pub use types::{BlobDescriptor, ChunkedSupport, MirrorRequest, UploadCapabilities};

/// Errors produced while building or parsing protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("invalid sha256 {0:?}: expected 64 hex characters")]
    InvalidHash(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
