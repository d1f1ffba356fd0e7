//! Upload authorization: the `Signer` collaborator and header encoding.
//!
//! The signed event is opaque here. Whatever the signer returns is serialized
//! to JSON, base64-encoded and sent as `Authorization: Nostr <base64>`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::AUTH_SCHEME;

/// A signed authorization event, kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedEvent(pub serde_json::Value);

/// Errors from a [`Signer`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignerError {
    #[error("signer rejected the request: {0}")]
    Rejected(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Produces authorization events scoped to a content hash.
///
/// Implemented outside this workspace (browser extension, remote bunker,
/// local key). Coordinators only ever call [`Signer::create_upload_auth`].
pub trait Signer: Send + Sync {
    fn create_upload_auth<'a>(
        &'a self,
        sha256: &'a str,
    ) -> BoxFuture<'a, Result<SignedEvent, SignerError>>;
}

/// Builds the `Authorization` header value for `event`.
pub fn authorization_header(event: &SignedEvent) -> Result<String, ProtocolError> {
    let json = serde_json::to_vec(&event.0)?;
    Ok(format!("{AUTH_SCHEME} {}", STANDARD.encode(json)))
}
