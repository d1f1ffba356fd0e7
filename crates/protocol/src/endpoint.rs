//! Server endpoints and origin normalization.
//!
//! Every comparison, cache key and dedup in the workspace goes through
//! [`normalize_server_url`], so `HTTPS://Blossom.Example.com/some/path/` and
//! `https://blossom.example.com` are the same server.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ProtocolError;
use crate::constants::{MIRROR_PATH, UPLOAD_PATH};

/// What a configured server is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Receives the initial upload.
    #[serde(alias = "upload-initial")]
    Upload,
    /// Receives server-to-server copies after the initial upload.
    Mirror,
    /// Transforming intermediary used only when resolving URLs.
    Proxy,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Mirror => f.write_str("mirror"),
            Self::Proxy => f.write_str("proxy"),
        }
    }
}

/// A blob server origin plus the role it plays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint", into = "RawEndpoint")]
pub struct ServerEndpoint {
    base_url: String,
    host: String,
    role: ServerRole,
}

#[derive(Serialize, Deserialize)]
struct RawEndpoint {
    url: String,
    role: ServerRole,
}

impl TryFrom<RawEndpoint> for ServerEndpoint {
    type Error = ProtocolError;

    fn try_from(raw: RawEndpoint) -> Result<Self, Self::Error> {
        ServerEndpoint::parse(&raw.url, raw.role)
    }
}

impl From<ServerEndpoint> for RawEndpoint {
    fn from(endpoint: ServerEndpoint) -> Self {
        Self {
            url: endpoint.base_url,
            role: endpoint.role,
        }
    }
}

impl ServerEndpoint {
    /// Parses and normalizes `raw` into an endpoint.
    pub fn parse(raw: &str, role: ServerRole) -> Result<Self, ProtocolError> {
        let url = parse_origin(raw)?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        Ok(Self {
            base_url: url.origin().ascii_serialization(),
            host,
            role,
        })
    }

    /// Normalized origin: scheme + host (+ non-default port), no trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lowercased host name without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn role(&self) -> ServerRole {
        self.role
    }

    /// Returns the same origin with a different role.
    pub fn with_role(&self, role: ServerRole) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }

    /// `{server}/upload`
    pub fn upload_url(&self) -> String {
        format!("{}/{UPLOAD_PATH}", self.base_url)
    }

    /// `{server}/mirror`
    pub fn mirror_url(&self) -> String {
        format!("{}/{MIRROR_PATH}", self.base_url)
    }

    /// `{server}/{sha256}[.ext]`
    pub fn blob_url(&self, sha256: &str, ext: Option<&str>) -> String {
        match ext {
            Some(ext) if !ext.is_empty() => {
                format!("{}/{sha256}.{}", self.base_url, ext.trim_start_matches('.'))
            }
            _ => format!("{}/{sha256}", self.base_url),
        }
    }

    /// Whether `url` points at this endpoint's origin.
    pub fn same_origin(&self, url: &str) -> bool {
        normalize_server_url(url).is_ok_and(|origin| origin == self.base_url)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Normalizes a server URL to its origin: lowercase host, no path, no
/// trailing slash. A missing scheme defaults to `https`.
pub fn normalize_server_url(raw: &str) -> Result<String, ProtocolError> {
    Ok(parse_origin(raw)?.origin().ascii_serialization())
}

fn parse_origin(raw: &str) -> Result<Url, ProtocolError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ProtocolError::InvalidServerUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
