//! Content-addressed URL parsing and MIME/extension mapping.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::ProtocolError;

/// Last path segment of a content-addressed URL: 64 hex chars plus an
/// optional extension.
static CONTENT_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{64})(?:\.([A-Za-z0-9]{1,10}))?$").expect("static regex")
});

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    ("video/mp2t", "ts"),
    ("application/x-mpegurl", "m3u8"),
    ("application/vnd.apple.mpegurl", "m3u8"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/avif", "avif"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/ogg", "ogg"),
    ("text/vtt", "vtt"),
    ("application/x-subrip", "srt"),
    ("application/json", "json"),
    ("text/plain", "txt"),
];

/// A `{sha256}[.ext]` reference parsed out of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentAddress {
    /// Lowercase hex digest.
    pub sha256: String,
    /// Lowercase extension without the dot.
    pub ext: Option<String>,
}

impl ContentAddress {
    /// Parses the last path segment of `url`. Query and fragment are ignored.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let segment = parsed.path_segments()?.next_back()?;
        Self::from_file_name(segment)
    }

    /// Parses a bare `{sha256}[.ext]` name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let caps = CONTENT_ADDRESS.captures(name)?;
        Some(Self {
            sha256: caps[1].to_ascii_lowercase(),
            ext: caps.get(2).map(|m| m.as_str().to_ascii_lowercase()),
        })
    }

    /// `{sha256}[.ext]`
    pub fn file_name(&self) -> String {
        match &self.ext {
            Some(ext) => format!("{}.{ext}", self.sha256),
            None => self.sha256.clone(),
        }
    }
}

/// Whether `value` is exactly 64 hex characters.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Checks that `value` is a sha256 digest and returns it lowercased.
pub fn normalize_sha256(value: &str) -> Result<String, ProtocolError> {
    if !is_sha256_hex(value) {
        return Err(ProtocolError::InvalidHash(value.to_string()));
    }
    Ok(value.to_ascii_lowercase())
}

/// File extension conventionally used for `mime` (parameters ignored).
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// MIME type for a file extension, if known.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.');
    let ext = if ext.eq_ignore_ascii_case("jpeg") { "jpg" } else { ext };
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| e.eq_ignore_ascii_case(ext))
        .map(|(m, _)| *m)
}
