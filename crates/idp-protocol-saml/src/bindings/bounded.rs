//! Byte-bounded reader.

use std::io::{self, Read};

/// Marker error carried inside the [`io::Error`] a [`BoundedReadStream`]
/// returns once its ceiling is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stream exceeded the {limit} byte limit")]
pub struct LimitExceeded {
    /// Configured ceiling in bytes.
    pub limit: usize,
}

impl LimitExceeded {
    /// Returns the limit if `err` was produced by a [`BoundedReadStream`].
    #[must_use]
    pub fn from_io(err: &io::Error) -> Option<usize> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<Self>())
            .map(|exceeded| exceeded.limit)
    }
}

/// Wraps a reader and fails once more than `limit` bytes have been read.
///
/// Reading exactly `limit` bytes succeeds. The wrapper never asks the inner
/// reader for more than one byte past the ceiling, so a decompression bomb
/// is stopped without inflating it.
#[derive(Debug)]
pub struct BoundedReadStream<R> {
    inner: R,
    limit: usize,
    consumed: usize,
}

impl<R: Read> BoundedReadStream<R> {
    /// Creates a bounded reader.
    pub fn new(inner: R, limit: usize) -> Self {
        Self {
            inner,
            limit,
            consumed: 0,
        }
    }

    /// Bytes read so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Reads everything, failing on overflow.
    pub fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl<R: Read> Read for BoundedReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let allowed = self.limit.saturating_sub(self.consumed).saturating_add(1);
        let window = buf.len().min(allowed);
        let n = self.inner.read(&mut buf[..window])?;
        self.consumed += n;
        if self.consumed > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                LimitExceeded { limit: self.limit },
            ));
        }
        Ok(n)
    }
}
