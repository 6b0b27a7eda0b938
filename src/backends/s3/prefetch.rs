// Copyright 2026 The pathkit authors.

//! S3 prefetch reader (spec.md C8 / §4.5): a block-windowed, read-ahead
//! reader over a single object.
//!
//! Grounded in the bridge pattern of `transport::s3::S3Transport`
//! (`Arc<Runtime>` + `runtime.block_on`), generalized so blocks are fetched
//! concurrently on the runtime's own worker threads via [`Runtime::spawn`]
//! rather than one request at a time.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::shared_cache::SharedCacheHandle;
use crate::backend::{OpenOptions, ReadHandle};
use crate::error::{ErrorKind, PathError, Result};
use crate::retry::RetryPolicy;

const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
const DEFAULT_FORWARD: usize = 2;
const DEFAULT_BACKWARD: usize = 1;
const DEFAULT_CONCURRENCY: usize = 4;

async fn fetch_block(
    client: Arc<Client>,
    bucket: String,
    key: String,
    start: u64,
    end_inclusive: u64,
    retry: RetryPolicy,
) -> Result<Bytes> {
    let mut attempt = 0u32;
    loop {
        let range = format!("bytes={start}-{end_inclusive}");
        let result = client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .range(&range)
            .send()
            .await;
        match result {
            Ok(output) => {
                return output
                    .body
                    .collect()
                    .await
                    .map(|b| b.into_bytes())
                    .map_err(|e| PathError::with_source(ErrorKind::Transport, key.clone(), e));
            }
            Err(e) if attempt < retry.max_retries => {
                debug!(attempt, key = %key, error = ?e, "retrying block fetch");
                tokio::time::sleep(std::time::Duration::from_millis(100 << attempt.min(10))).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(PathError::with_source(ErrorKind::Transport, key, e));
            }
        }
    }
}

fn block_range(index: u64, block_size: u64, object_size: u64) -> (u64, u64) {
    let start = index * block_size;
    let end = (start + block_size - 1).min(object_size.saturating_sub(1));
    (start, end)
}

fn block_count(object_size: u64, block_size: u64) -> u64 {
    if object_size == 0 {
        0
    } else {
        (object_size + block_size - 1) / block_size
    }
}

enum BlockSlot {
    Pending(JoinHandle<Result<Bytes>>),
    Ready(Bytes),
}

/// Reads a single S3 object through a window of prefetched, fixed-size
/// blocks (spec.md §4.5).
pub struct PrefetchReader {
    runtime: Arc<Runtime>,
    client: Arc<Client>,
    bucket: String,
    key: String,
    size: u64,
    block_size: u64,
    forward: usize,
    backward: usize,
    max_buffer_size: usize,
    retry: RetryPolicy,
    pos: u64,
    blocks: BTreeMap<u64, BlockSlot>,
    /// Consulted before every fetch, and filled in after one, when this
    /// reader was opened with a `share_key` (spec.md C9 / §4.6).
    shared: Option<SharedCacheHandle>,
}

impl PrefetchReader {
    pub fn open(
        runtime: Arc<Runtime>,
        client: Arc<Client>,
        bucket: String,
        key: String,
        size: u64,
        opts: &OpenOptions,
        retry: RetryPolicy,
        shared: Option<SharedCacheHandle>,
    ) -> Self {
        let block_size = opts.block_size.map(|b| b as u64).unwrap_or(DEFAULT_BLOCK_SIZE).max(1);
        let forward = opts.max_concurrency.unwrap_or(DEFAULT_FORWARD).max(1);
        PrefetchReader {
            runtime,
            client,
            bucket,
            key,
            size,
            block_size,
            forward,
            backward: DEFAULT_BACKWARD,
            max_buffer_size: opts.max_buffer_size.unwrap_or(DEFAULT_CONCURRENCY * block_size as usize),
            retry,
            pos: 0,
            blocks: BTreeMap::new(),
            shared,
        }
    }

    fn block_index(&self, pos: u64) -> u64 {
        pos / self.block_size
    }

    fn block_range(&self, index: u64) -> (u64, u64) {
        block_range(index, self.block_size, self.size)
    }

    fn block_count(&self) -> u64 {
        block_count(self.size, self.block_size)
    }

    /// Ensures `index` has a worker scheduled, enforcing at most one
    /// in-flight fetch per index (spec.md §4.5 invariants).
    fn schedule(&mut self, index: u64) {
        if self.blocks.contains_key(&index) || index >= self.block_count() {
            return;
        }
        if let Some(shared) = self.shared.as_ref() {
            if let Some(bytes) = shared.get(index) {
                self.blocks.insert(index, BlockSlot::Ready(bytes));
                return;
            }
        }
        let (start, end) = self.block_range(index);
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let retry = self.retry;
        let handle = self.runtime.spawn(fetch_block(client, bucket, key, start, end, retry));
        self.blocks.insert(index, BlockSlot::Pending(handle));
    }

    fn schedule_window(&mut self, center: u64) {
        for i in center..=(center + self.forward as u64) {
            self.schedule(i);
        }
    }

    /// Drops buffered/pending blocks outside `[center - backward, center +
    /// forward]`, aborting any pending fetches among them.
    fn evict_outside_window(&mut self, center: u64) {
        let low = center.saturating_sub(self.backward as u64);
        let high = center + self.forward as u64;
        let stale: Vec<u64> = self
            .blocks
            .keys()
            .copied()
            .filter(|i| *i < low || *i > high)
            .collect();
        for idx in stale {
            if let Some(BlockSlot::Pending(handle)) = self.blocks.remove(&idx) {
                handle.abort();
            }
        }
        self.enforce_buffer_cap();
    }

    fn enforce_buffer_cap(&mut self) {
        let cap_blocks = (self.max_buffer_size as u64 / self.block_size).max(1);
        while self.blocks.len() as u64 > cap_blocks {
            if let Some((&oldest, _)) = self.blocks.iter().next() {
                if let Some(BlockSlot::Pending(handle)) = self.blocks.remove(&oldest) {
                    handle.abort();
                }
            } else {
                break;
            }
        }
    }

    fn block_bytes(&mut self, index: u64) -> Result<Bytes> {
        let slot = self
            .blocks
            .remove(&index)
            .unwrap_or_else(|| {
                self.schedule(index);
                self.blocks.remove(&index).expect("just scheduled")
            });
        let bytes = match slot {
            BlockSlot::Ready(b) => b,
            BlockSlot::Pending(handle) => {
                let result = self.runtime.block_on(handle);
                match result {
                    Ok(Ok(bytes)) => {
                        if let Some(shared) = self.shared.as_ref() {
                            shared.put(index, bytes.clone());
                        }
                        bytes
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(join_err) if join_err.is_cancelled() => {
                        return Err(PathError::new(ErrorKind::Transport, self.key.clone()));
                    }
                    Err(join_err) => {
                        return Err(PathError::with_source(ErrorKind::Unknown, self.key.clone(), join_err));
                    }
                }
            }
        };
        self.blocks.insert(index, BlockSlot::Ready(bytes.clone()));
        Ok(bytes)
    }
}

impl io::Read for PrefetchReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let index = self.block_index(self.pos);
        self.schedule_window(index);
        self.evict_outside_window(index);
        let bytes = self
            .block_bytes(index)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let block_start = index * self.block_size;
        let offset_in_block = (self.pos - block_start) as usize;
        let available = bytes.len().saturating_sub(offset_in_block);
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&bytes[offset_in_block..offset_in_block + to_copy]);
        self.pos += to_copy as u64;
        trace!(pos = self.pos, to_copy, "prefetch read");
        Ok(to_copy)
    }
}

impl io::Seek for PrefetchReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(p) => p,
            io::SeekFrom::End(delta) => (self.size as i64 + delta).max(0) as u64,
            io::SeekFrom::Current(delta) => (self.pos as i64 + delta).max(0) as u64,
        };
        let old_index = self.block_index(self.pos.min(self.size.saturating_sub(1)));
        let new_index = self.block_index(new_pos.min(self.size.saturating_sub(1)));
        if new_index != old_index {
            self.evict_outside_window(new_index);
        }
        self.pos = new_pos;
        Ok(self.pos)
    }
}

impl ReadHandle for PrefetchReader {
    fn close(&mut self) -> Result<()> {
        for (_, slot) in self.blocks.iter() {
            if let BlockSlot::Pending(handle) = slot {
                handle.abort();
            }
        }
        self.blocks.clear();
        Ok(())
    }
}

impl Drop for PrefetchReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_range_is_clamped_to_object_size() {
        assert_eq!(block_range(0, 8, 20), (0, 7));
        assert_eq!(block_range(2, 8, 20), (16, 19));
        assert_eq!(block_count(20, 8), 3);
    }

    #[test]
    fn empty_object_has_zero_blocks() {
        assert_eq!(block_count(0, 8), 0);
    }
}
