use crate::TransferError;

/// One `[offset, offset + length)` slice of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Fixed-size partition of a blob into byte ranges.
///
/// The plan is arithmetic only: ranges are computed on demand and the caller
/// fetches the bytes for each one lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    blob_size: u64,
    chunk_size: u64,
}

/// Plans `blob_size` bytes in `chunk_size` pieces.
pub fn plan(blob_size: u64, chunk_size: u64) -> Result<ChunkPlan, TransferError> {
    ChunkPlan::new(blob_size, chunk_size)
}

impl ChunkPlan {
    pub fn new(blob_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        Ok(Self {
            blob_size,
            chunk_size,
        })
    }

    pub fn blob_size(&self) -> u64 {
        self.blob_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks. Zero for an empty blob.
    pub fn len(&self) -> u64 {
        self.blob_size.div_ceil(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.blob_size == 0
    }

    /// Range for chunk `index`, if it exists.
    pub fn get(&self, index: u64) -> Option<ChunkRange> {
        if index >= self.len() {
            return None;
        }
        let offset = index * self.chunk_size;
        Some(ChunkRange {
            index,
            offset,
            length: self.chunk_size.min(self.blob_size - offset),
        })
    }

    /// The final chunk, the one whose arrival completes an upload.
    pub fn last(&self) -> Option<ChunkRange> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Every chunk in order.
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
            end: self.len(),
        }
    }

    /// Every chunk except the last.
    pub fn leading(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
            end: self.len().saturating_sub(1),
        }
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = ChunkRange;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: u64,
    end: u64,
}

impl Iterator for ChunkIter {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let range = self.plan.get(self.next);
        self.next += 1;
        range
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.next) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkIter {}
