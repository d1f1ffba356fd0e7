//! Request and response shapes for the Blossom HTTP surface.

use std::fmt;

use blossom_protocol::BlobDescriptor;

/// Which protocol call an error or timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `OPTIONS /upload`
    Negotiate,
    /// `HEAD /{sha256}[.ext]`
    Probe,
    /// `PATCH /upload`
    ChunkUpload,
    /// `PUT /upload`
    Upload,
    /// `PUT /mirror`
    Mirror,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Negotiate => "capability discovery",
            Self::Probe => "existence probe",
            Self::ChunkUpload => "chunk upload",
            Self::Upload => "upload",
            Self::Mirror => "mirror",
        };
        f.write_str(s)
    }
}

/// Result of `HEAD /{sha256}[.ext]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub content_length: Option<u64>,
}

impl HeadResponse {
    /// A 200 means the server holds the blob.
    pub fn is_present(&self) -> bool {
        self.status == 200
    }
}

/// Metadata sent with every chunk of one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpload {
    pub sha256: String,
    pub mime_type: String,
    /// Length of the whole blob, not the chunk.
    pub total_length: u64,
    pub offset: u64,
}

/// Result of a successful `PATCH /upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub status: u16,
    /// Present once the server has materialized the blob.
    pub descriptor: Option<BlobDescriptor>,
}

/// Metadata for a single-shot `PUT /upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUpload {
    pub sha256: String,
    pub mime_type: String,
    pub length: u64,
}
