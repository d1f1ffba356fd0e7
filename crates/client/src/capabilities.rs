//! Capability discovery (`OPTIONS /upload`).

use blossom_protocol::constants::{
    CHUNK_METHOD, CHUNK_PATCH_TYPES, CHUNKED_MODE_TOKENS, HEADER_ACCEPT_PATCH,
    HEADER_MAX_CHUNK_SIZE, HEADER_UPLOAD_MODES,
};
use blossom_protocol::{ChunkedSupport, UploadCapabilities};
use chrono::Utc;
use reqwest::header::{ALLOW, HeaderMap};
use tracing::debug;

use crate::client::Client;
use crate::error::ClientError;

/// Interprets capability headers.
///
/// Any one of `Accept-Patch`, `Allow` or `Blossom-Upload-Modes` is enough to
/// conclude chunked uploads are supported. `Max-Chunk-Size` is read
/// independently and ignored when zero or malformed.
pub fn parse_capabilities(headers: &HeaderMap) -> (ChunkedSupport, Option<u64>) {
    let accept_patch = header_values(headers, HEADER_ACCEPT_PATCH).any(|v| {
        let media_type = v.split(';').next().unwrap_or_default().trim();
        CHUNK_PATCH_TYPES
            .iter()
            .any(|t| media_type.eq_ignore_ascii_case(t))
    });

    let allow = header_values(headers, ALLOW.as_str())
        .any(|v| v.eq_ignore_ascii_case(CHUNK_METHOD));

    let modes = header_values(headers, HEADER_UPLOAD_MODES)
        .any(|v| CHUNKED_MODE_TOKENS.iter().any(|t| v.eq_ignore_ascii_case(t)));

    let support = if accept_patch || allow || modes {
        ChunkedSupport::Supported
    } else {
        ChunkedSupport::Unsupported
    };

    let max_chunk_size = headers
        .get(HEADER_MAX_CHUNK_SIZE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n > 0);

    (support, max_chunk_size)
}

/// Comma-separated tokens across every occurrence of `name`.
fn header_values<'a>(headers: &'a HeaderMap, name: &str) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl Client {
    /// Discovers whether this server accepts chunked uploads.
    ///
    /// A transport failure or timeout is not an error here: it yields
    /// [`ChunkedSupport::Unknown`] with the cause preserved, since a browser
    /// CORS rejection and a plain network fault look the same. A non-2xx
    /// answer is a definitive [`ChunkedSupport::Unsupported`].
    pub async fn negotiate(&self) -> Result<UploadCapabilities, ClientError> {
        let headers = match self.options_upload().await {
            Ok(Some(headers)) => headers,
            Ok(None) => {
                return Ok(UploadCapabilities {
                    chunked: ChunkedSupport::Unsupported,
                    max_chunk_size: None,
                    discovered_at: Utc::now(),
                });
            }
            Err(e @ ClientError::InvalidRequest(_)) => return Err(e),
            Err(e) => {
                debug!(server = %self.endpoint(), error = %e, "capability discovery failed");
                return Ok(UploadCapabilities::unknown(e.to_string()));
            }
        };

        let (chunked, max_chunk_size) = parse_capabilities(&headers);
        debug!(
            server = %self.endpoint(),
            chunked = ?chunked,
            max_chunk_size,
            "capabilities discovered"
        );
        Ok(UploadCapabilities {
            chunked,
            max_chunk_size,
            discovered_at: Utc::now(),
        })
    }
}
