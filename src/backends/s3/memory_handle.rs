// Copyright 2026 The pathkit authors.

//! In-memory read/write handle over an S3 object (spec.md C13 / §4.9): the
//! same random-access interface as [`super::cached_handle`], backed by a
//! `Vec<u8>` instead of a temp file.
//!
//! Grounded in `transport::s3::S3Transport::read_file`/`write_file`, which
//! already buffer a whole object in memory for the simple case; this module
//! generalizes that into a seekable, writable handle.

use std::io;
use std::sync::Arc;

use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Runtime;
use tracing::trace;

use crate::backend::{ReadHandle, WriteHandle};
use crate::error::{ErrorKind, PathError, Result};

/// Downloads an object in full on open, then serves reads/seeks from memory.
pub struct MemoryReadHandle {
    buf: Vec<u8>,
    pos: u64,
}

impl MemoryReadHandle {
    pub fn download(runtime: Arc<Runtime>, client: Arc<Client>, bucket: String, key: String) -> Result<Self> {
        let output = runtime
            .block_on(client.get_object().bucket(&bucket).key(&key).send())
            .map_err(|e| PathError::with_source(ErrorKind::Transport, key.clone(), e))?;
        let body = runtime
            .block_on(output.body.collect())
            .map_err(|e| PathError::with_source(ErrorKind::Transport, key, e))?;
        Ok(MemoryReadHandle { buf: body.into_bytes().to_vec(), pos: 0 })
    }
}

impl io::Read for MemoryReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos as usize;
        if start >= self.buf.len() {
            return Ok(0);
        }
        let n = (self.buf.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&self.buf[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl io::Seek for MemoryReadHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(p) => p as i64,
            io::SeekFrom::End(delta) => self.buf.len() as i64 + delta,
            io::SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl ReadHandle for MemoryReadHandle {}

/// Buffers writes in memory; uploads the whole buffer with a single `PUT`
/// on close, or on every write when `atomic` is false (spec.md §4.9).
pub struct MemoryWriteHandle {
    runtime: Arc<Runtime>,
    client: Arc<Client>,
    bucket: String,
    key: String,
    buf: Vec<u8>,
    atomic: bool,
    closed: bool,
}

impl MemoryWriteHandle {
    pub fn new(runtime: Arc<Runtime>, client: Arc<Client>, bucket: String, key: String, atomic: bool) -> Self {
        MemoryWriteHandle {
            runtime,
            client,
            bucket,
            key,
            buf: Vec::new(),
            atomic,
            closed: false,
        }
    }

    /// As [`Self::new`], but seeded with the object's existing content, for
    /// `a`/`ab` opens (spec.md §4.9).
    pub fn append(runtime: Arc<Runtime>, client: Arc<Client>, bucket: String, key: String, atomic: bool) -> Result<Self> {
        let existing = MemoryReadHandle::download(runtime.clone(), client.clone(), bucket.clone(), key.clone())?;
        Ok(MemoryWriteHandle {
            runtime,
            client,
            bucket,
            key,
            buf: existing.buf,
            atomic,
            closed: false,
        })
    }

    fn upload(&self) -> Result<()> {
        let body = Bytes::copy_from_slice(&self.buf);
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .body(body.into())
                    .send(),
            )
            .map(|_| ())
            .map_err(|e| PathError::with_source(ErrorKind::Transport, self.key.clone(), e))
    }
}

impl io::Write for MemoryWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        if !self.atomic {
            trace!(key = %self.key, len = self.buf.len(), "non-atomic memory write, re-uploading whole buffer");
            self.upload().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteHandle for MemoryWriteHandle {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.atomic {
            self.upload()
        } else {
            Ok(())
        }
    }

    fn abort(&mut self) -> Result<()> {
        self.closed = true;
        self.buf.clear();
        Ok(())
    }
}

impl Drop for MemoryWriteHandle {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn read_handle_seeks_within_buffer() {
        let mut h = MemoryReadHandle { buf: b"hello world".to_vec(), pos: 0 };
        h.seek(SeekFrom::Start(6)).unwrap();
        let mut out = [0u8; 5];
        h.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"world");
    }

    #[test]
    fn read_handle_rejects_negative_seek() {
        let mut h = MemoryReadHandle { buf: b"hi".to_vec(), pos: 0 };
        assert!(h.seek(SeekFrom::Current(-5)).is_err());
    }
}
