//! Header names, paths and defaults shared by client and coordinators.

/// Full-blob SHA-256 carried on every upload request.
pub const HEADER_SHA256: &str = "X-SHA-256";

/// Declared MIME type of the whole blob on a chunk request.
pub const HEADER_UPLOAD_TYPE: &str = "Upload-Type";

/// Total blob length on a chunk request.
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";

/// Byte offset of the chunk carried in the request body.
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";

/// Capability signal: content types the server accepts on PATCH.
pub const HEADER_ACCEPT_PATCH: &str = "Accept-Patch";

/// Capability signal: server-specific list of upload modes.
pub const HEADER_UPLOAD_MODES: &str = "Blossom-Upload-Modes";

/// Capability hint: largest chunk the server accepts, in bytes.
pub const HEADER_MAX_CHUNK_SIZE: &str = "Max-Chunk-Size";

/// Human-readable failure reason some servers attach to error responses.
pub const HEADER_REASON: &str = "X-Reason";

/// Content type of every chunk body.
pub const CHUNK_CONTENT_TYPE: &str = "application/octet-stream";

/// `Accept-Patch` values that announce chunked upload support.
pub const CHUNK_PATCH_TYPES: &[&str] = &["application/octet-stream", "application/offset+octet-stream"];

/// Tokens in `Blossom-Upload-Modes` that announce chunked upload support.
pub const CHUNKED_MODE_TOKENS: &[&str] = &["chunked", "patch"];

/// Verb listed in `Allow` by servers that accept chunks.
pub const CHUNK_METHOD: &str = "PATCH";

/// Scheme prefix of the `Authorization` header value.
pub const AUTH_SCHEME: &str = "Nostr";

/// Path of the upload endpoint relative to the server origin.
pub const UPLOAD_PATH: &str = "upload";

/// Path of the mirror endpoint relative to the server origin.
pub const MIRROR_PATH: &str = "mirror";

/// Proxy query parameter naming a fallback host (repeatable).
pub const PROXY_PARAM_SERVER: &str = "xs";

/// Proxy query parameter naming the author.
pub const PROXY_PARAM_AUTHOR: &str = "as";

/// Proxy query parameter for transform width.
pub const PROXY_PARAM_WIDTH: &str = "width";

/// Proxy query parameter for transform height.
pub const PROXY_PARAM_HEIGHT: &str = "height";
