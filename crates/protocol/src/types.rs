use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::extension_for_mime;
use crate::endpoint::ServerEndpoint;

/// Description of a stored blob, as returned by upload and mirror endpoints.
///
/// `sha256` is the identity: two descriptors with the same hash describe the
/// same bytes no matter which server holds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub url: String,
    pub sha256: String,
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    #[serde(rename = "uploaded", default = "Utc::now", with = "chrono::serde::ts_seconds")]
    pub uploaded_at: DateTime<Utc>,
}

impl BlobDescriptor {
    /// Builds a descriptor locally for a blob `server` already holds.
    pub fn synthesize(server: &ServerEndpoint, sha256: &str, size: u64, mime_type: &str) -> Self {
        Self {
            url: server.blob_url(sha256, extension_for_mime(mime_type)),
            sha256: sha256.to_string(),
            size,
            mime_type: mime_type.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    /// Same content, URL rooted at `server`.
    pub fn rehome(&self, server: &ServerEndpoint) -> Self {
        Self {
            url: server.blob_url(&self.sha256, self.extension().as_deref()),
            uploaded_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Extension of the blob, from the MIME type or else the URL's file name.
    pub fn extension(&self) -> Option<String> {
        if let Some(ext) = extension_for_mime(&self.mime_type) {
            return Some(ext.to_string());
        }
        crate::content::ContentAddress::from_url(&self.url).and_then(|addr| addr.ext)
    }
}

/// Whether a server accepts chunked (PATCH) uploads.
///
/// `Unknown` keeps a failed discovery apart from an explicit "no" even
/// though callers currently treat both as unsupported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum ChunkedSupport {
    Supported,
    Unsupported,
    Unknown(String),
}

/// Per-server upload capabilities discovered during one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCapabilities {
    pub chunked: ChunkedSupport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunk_size: Option<u64>,
    pub discovered_at: DateTime<Utc>,
}

impl UploadCapabilities {
    pub fn supports_chunked(&self) -> bool {
        self.chunked == ChunkedSupport::Supported
    }

    /// Capabilities recorded when discovery itself failed.
    pub fn unknown(cause: impl Into<String>) -> Self {
        Self {
            chunked: ChunkedSupport::Unknown(cause.into()),
            max_chunk_size: None,
            discovered_at: Utc::now(),
        }
    }
}

/// Body of `PUT /mirror`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRequest {
    pub url: String,
}
