// Copyright 2026 The pathkit authors.

//! Limited-seekable S3 writer (spec.md C11 / §4.8): atop the same
//! multipart machinery as [`super::writer::MultipartWriter`], but keeps a
//! HEAD buffer and the in-progress tail buffer rewritable so a caller can
//! "write a placeholder header, write the body, go back and patch the
//! header" without a full re-upload.
//!
//! Grounded in `super::writer`'s part-upload loop; this module duplicates
//! rather than wraps it because seek validation needs to see both buffers'
//! exact boundaries, which a forward-only writer doesn't track.

use std::io;
use std::sync::Arc;

use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::{OpenOptions, WriteHandle};
use crate::error::{ErrorKind, PathError, Result};
use crate::retry::RetryPolicy;

const DEFAULT_HEAD_BLOCK_SIZE: usize = 8 * 1024 * 1024;
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

async fn upload_part(
    client: Arc<Client>,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: i32,
    body: Bytes,
    retry: RetryPolicy,
) -> Result<CompletedPart> {
    let mut attempt = 0u32;
    loop {
        let result = client
            .upload_part()
            .bucket(&bucket)
            .key(&key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(body.clone().into())
            .send()
            .await;
        match result {
            Ok(output) => {
                return Ok(CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(output.e_tag().map(str::to_owned))
                    .build());
            }
            Err(e) if attempt < retry.max_retries => {
                debug!(attempt, part_number, error = ?e, "retrying part upload");
                tokio::time::sleep(std::time::Duration::from_millis(100 << attempt.min(10))).await;
                attempt += 1;
            }
            Err(e) => return Err(PathError::with_source(ErrorKind::Transport, key, e)),
        }
    }
}

/// Whether `pos` falls in the not-yet-committed HEAD block or the current
/// tail buffer, the only two regions a seek may land in (spec.md §4.8).
fn in_rewritable_region(head_committed: bool, head_len: usize, committed_len: u64, tail_len: usize, pos: u64) -> bool {
    if !head_committed && pos <= head_len as u64 {
        return true;
    }
    pos >= committed_len && pos <= committed_len + tail_len as u64
}

/// A writer with two rewritable regions: the not-yet-committed HEAD block,
/// and the current, not-yet-flushed tail. Everything else is write-once.
pub struct SeekableWriter {
    runtime: Arc<Runtime>,
    client: Arc<Client>,
    bucket: String,
    key: String,
    head_block_size: usize,
    part_size: usize,
    head: Vec<u8>,
    head_committed: bool,
    /// Bytes already flushed to S3 (head, once committed, plus completed
    /// parts); the tail buffer covers `[committed_len, committed_len +
    /// tail.len())`.
    committed_len: u64,
    tail: Vec<u8>,
    pos: u64,
    upload_id: Option<String>,
    part_number: i32,
    pending: Vec<JoinHandle<Result<CompletedPart>>>,
    completed: Vec<CompletedPart>,
    retry: RetryPolicy,
    closed: bool,
}

impl SeekableWriter {
    pub fn new(
        runtime: Arc<Runtime>,
        client: Arc<Client>,
        bucket: String,
        key: String,
        opts: &OpenOptions,
        retry: RetryPolicy,
    ) -> Self {
        let head_block_size = opts.block_size.unwrap_or(DEFAULT_HEAD_BLOCK_SIZE).max(MIN_PART_SIZE);
        SeekableWriter {
            runtime,
            client,
            bucket,
            key,
            head_block_size,
            part_size: head_block_size,
            head: Vec::with_capacity(head_block_size),
            head_committed: false,
            committed_len: 0,
            tail: Vec::new(),
            pos: 0,
            upload_id: None,
            part_number: 0,
            pending: Vec::new(),
            completed: Vec::new(),
            retry,
            closed: false,
        }
    }

    fn begin_multipart(&mut self) -> Result<()> {
        if self.upload_id.is_some() {
            return Ok(());
        }
        let request = self.client.create_multipart_upload().bucket(&self.bucket).key(&self.key);
        let output = self
            .runtime
            .block_on(request.send())
            .map_err(|e| PathError::with_source(ErrorKind::Transport, self.key.clone(), e))?;
        self.upload_id = Some(output.upload_id().unwrap_or_default().to_owned());
        Ok(())
    }

    fn spawn_part(&mut self, body: Vec<u8>) -> Result<()> {
        self.begin_multipart()?;
        self.part_number += 1;
        let number = self.part_number;
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone().expect("multipart started");
        let retry = self.retry;
        let handle = self
            .runtime
            .spawn(upload_part(client, bucket, key, upload_id, number, Bytes::from(body), retry));
        self.pending.push(handle);
        Ok(())
    }

    /// Commits the HEAD buffer as part 1. Once this runs, the HEAD region
    /// is no longer rewritable (spec.md §4.8).
    fn commit_head(&mut self) -> Result<()> {
        if self.head_committed {
            return Ok(());
        }
        self.head_committed = true;
        let body = std::mem::take(&mut self.head);
        self.committed_len = body.len() as u64;
        self.spawn_part(body)
    }

    fn drain_pending(&mut self) -> Result<()> {
        for handle in self.pending.drain(..) {
            match self.runtime.block_on(handle) {
                Ok(Ok(part)) => self.completed.push(part),
                Ok(Err(e)) => return Err(e),
                Err(join_err) => return Err(PathError::with_source(ErrorKind::Unknown, self.key.clone(), join_err)),
            }
        }
        Ok(())
    }

    /// Is `pos` inside a region this writer currently allows seeking into?
    fn in_rewritable_region(&self, pos: u64) -> bool {
        in_rewritable_region(self.head_committed, self.head.len(), self.committed_len, self.tail.len(), pos)
    }

    fn write_at(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.head_committed && self.pos <= self.head.len() as u64 {
            let offset = self.pos as usize;
            let end = offset + buf.len();
            if end <= self.head_block_size {
                if self.head.len() < end {
                    self.head.resize(end, 0);
                }
                self.head[offset..end].copy_from_slice(buf);
                self.pos += buf.len() as u64;
                if self.pos as usize >= self.head_block_size {
                    self.commit_head().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
                return Ok(buf.len());
            }
            // Write spans past the head block: fill the head, commit it,
            // and fall through to append the remainder to the tail.
            let head_part = self.head_block_size - offset;
            self.head.resize(self.head_block_size, 0);
            self.head[offset..self.head_block_size].copy_from_slice(&buf[..head_part]);
            self.pos = self.head_block_size as u64;
            self.commit_head().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return self.write_tail(&buf[head_part..]).map(|n| n + head_part);
        }
        self.write_tail(buf)
    }

    fn write_tail(&mut self, buf: &[u8]) -> io::Result<usize> {
        let offset = (self.pos - self.committed_len) as usize;
        let end = offset + buf.len();
        if self.tail.len() < end {
            self.tail.resize(end, 0);
        }
        self.tail[offset..end].copy_from_slice(buf);
        self.pos += buf.len() as u64;
        while self.tail.len() >= self.part_size {
            let overflow = self.tail.split_off(self.part_size);
            let part = std::mem::replace(&mut self.tail, overflow);
            self.committed_len += part.len() as u64;
            self.spawn_part(part).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        Ok(buf.len())
    }
}

impl io::Write for SeekableWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for SeekableWriter {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let total = self.committed_len + self.tail.len() as u64;
        let new_pos = match pos {
            io::SeekFrom::Start(p) => p as i64,
            io::SeekFrom::End(delta) => total as i64 + delta,
            io::SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        let new_pos = new_pos as u64;
        if !self.in_rewritable_region(new_pos) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "seek outside the writable head/tail window",
            ));
        }
        self.pos = new_pos;
        Ok(self.pos)
    }
}

impl WriteHandle for SeekableWriter {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.head_committed && self.upload_id.is_none() {
            // Object never grew past the head block: a single PUT.
            let body = Bytes::from(std::mem::take(&mut self.head));
            return self
                .runtime
                .block_on(self.client.put_object().bucket(&self.bucket).key(&self.key).body(body.into()).send())
                .map(|_| ())
                .map_err(|e| PathError::with_source(ErrorKind::Transport, self.key.clone(), e));
        }
        self.commit_head()?;
        if !self.tail.is_empty() {
            let part = std::mem::take(&mut self.tail);
            self.spawn_part(part)?;
        }
        self.drain_pending()?;
        let upload_id = self.upload_id.clone().expect("multipart started");
        self.completed.sort_by_key(|p| p.part_number());
        let multipart = CompletedMultipartUpload::builder().set_parts(Some(std::mem::take(&mut self.completed))).build();
        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&upload_id)
                    .multipart_upload(multipart)
                    .send(),
            )
            .map(|_| ())
            .map_err(|e| PathError::with_source(ErrorKind::Transport, self.key.clone(), e))
    }

    fn abort(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for handle in self.pending.drain(..) {
            handle.abort();
        }
        if let Some(upload_id) = self.upload_id.take() {
            let request = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&upload_id);
            let _ = self.runtime.block_on(request.send());
        }
        Ok(())
    }
}

impl Drop for SeekableWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_into_uncommitted_head_is_allowed() {
        assert!(in_rewritable_region(false, 4, 0, 0, 0));
        assert!(in_rewritable_region(false, 4, 0, 0, 4));
    }

    #[test]
    fn seek_past_committed_head_is_rejected() {
        assert!(!in_rewritable_region(true, 4, 4, 0, 2));
        assert!(in_rewritable_region(true, 4, 4, 0, 4));
    }

    #[test]
    fn seek_into_current_tail_is_allowed() {
        assert!(in_rewritable_region(true, 4, 4, 3, 5));
        assert!(!in_rewritable_region(true, 4, 4, 3, 8));
    }
}
