use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;
use crate::source::BlobSource;

/// Default hashing window: 20 MiB.
pub const DEFAULT_HASH_WINDOW: u64 = 20 * 1024 * 1024;

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streaming SHA-256 over a [`BlobSource`].
///
/// Reads the blob sequentially in `window`-sized pieces and feeds each into
/// one accumulator; at most one window is resident at a time.
#[derive(Debug, Clone, Copy)]
pub struct HashEngine {
    window: u64,
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_WINDOW)
    }
}

impl HashEngine {
    /// Creates an engine reading `window` bytes at a time.
    ///
    /// A window of 0 falls back to [`DEFAULT_HASH_WINDOW`].
    pub fn new(window: u64) -> Self {
        let window = if window == 0 { DEFAULT_HASH_WINDOW } else { window };
        Self { window }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Hashes the whole source. Any failed read discards the partial state.
    pub async fn digest(&self, source: &dyn BlobSource) -> Result<String, TransferError> {
        let total = source.len();
        let mut hasher = Sha256::new();
        let mut offset = 0u64;

        while offset < total {
            let length = self.window.min(total - offset);
            let window = source
                .read_range(offset, length)
                .await
                .map_err(|source| TransferError::HashRead { offset, source })?;

            // SHA-256 over tens of MiB is CPU work; keep it off the reactor.
            hasher = tokio::task::spawn_blocking(move || {
                hasher.update(&window);
                hasher
            })
            .await
            .map_err(|e| TransferError::HashRead {
                offset,
                source: std::io::Error::other(format!("hash task failed: {e}")),
            })?;

            offset += length;
        }

        let digest = hex::encode(hasher.finalize());
        debug!(bytes = total, window = self.window, sha256 = %digest, "blob hashed");
        Ok(digest)
    }
}
