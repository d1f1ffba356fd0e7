use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Random-access, read-only view of a blob.
///
/// Implementations must be cheap to share across concurrent uploads to
/// different servers; every read is independent.
pub trait BlobSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, io::Result<Bytes>>;
}

fn check_bounds(total: u64, offset: u64, length: u64) -> io::Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {offset}+{length} exceeds blob length {total}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// A blob already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl BlobSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, io::Result<Bytes>> {
        let result = check_bounds(self.len(), offset, length)
            .map(|()| self.data.slice(offset as usize..(offset + length) as usize));
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A blob backed by a file on disk. Each read opens its own handle so
/// concurrent readers never share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Opens `path` and records its current length.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        Ok(Self {
            path,
            len: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, io::Result<Bytes>> {
        Box::pin(async move {
            check_bounds(self.len, offset, length)?;
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }
}

/// Streams `source` front to back in `window`-sized pieces.
///
/// Used for single-shot request bodies so the fallback path reads the blob
/// lazily too. The stream ends after the first error.
pub fn range_stream(
    source: Arc<dyn BlobSource>,
    window: u64,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let window = window.max(1);
    futures_util::stream::unfold((source, 0u64), move |(source, offset)| async move {
        let total = source.len();
        if offset >= total {
            return None;
        }
        let length = window.min(total - offset);
        match source.read_range(offset, length).await {
            Ok(bytes) => Some((Ok(bytes), (source, offset + length))),
            Err(e) => Some((Err(e), (source, total))),
        }
    })
}
