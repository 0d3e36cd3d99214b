use std::io::{self, Write};

use crate::error::{OplogError, Result};

/// Append-only byte buffer holding a captured response body.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that refuses to grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Appends `data`, or leaves the buffer untouched and fails when the
    /// memory cannot be reserved.
    pub fn try_append(&mut self, data: &[u8]) -> Result<()> {
        if let Some(limit) = self.limit {
            if self.bytes.len().saturating_add(data.len()) > limit {
                return Err(OplogError::CaptureWrite(format!(
                    "capture limit of {} bytes exceeded",
                    limit
                )));
            }
        }
        self.bytes
            .try_reserve(data.len())
            .map_err(|e| OplogError::CaptureWrite(e.to_string()))?;
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Writer that mirrors every byte written to `inner` into a [`CaptureBuffer`].
///
/// The inner writer stays owned by the caller's framework: this wrapper never
/// closes it, and `get_ref`/`get_mut` expose it for everything besides
/// writing (headers, status and so on).
#[derive(Debug)]
pub struct ResponseCapture<W> {
    inner: W,
    body: CaptureBuffer,
}

impl<W: Write> ResponseCapture<W> {
    pub fn new(inner: W) -> Self {
        Self::with_buffer(inner, CaptureBuffer::new())
    }

    pub fn with_buffer(inner: W, body: CaptureBuffer) -> Self {
        Self { inner, body }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn captured(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn into_parts(self) -> (W, CaptureBuffer) {
        (self.inner, self.body)
    }
}

impl<W: Write> Write for ResponseCapture<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mark = self.body.len();
        self.body
            .try_append(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;

        match self.inner.write(buf) {
            Ok(n) => {
                // keep the mirror equal to what the inner writer accepted
                self.body.truncate(mark + n);
                Ok(n)
            }
            Err(e) => {
                self.body.truncate(mark);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
