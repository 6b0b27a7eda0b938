// Copyright 2026 The pathkit authors.

//! HDFS backend (spec.md C14 / §4.11): WebHDFS over the injected `reqwest`
//! client.
//!
//! Grounded in the same `Arc<Runtime>` + blocking-bridge pattern
//! `transport::s3::S3Transport` uses for the AWS SDK, and in
//! `super::s3::prefetch`'s windowed block-cache design, generalized from S3
//! byte ranges to WebHDFS's `offset`/`length` query parameters on the `OPEN`
//! operation.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::backend::{
    Backend, FileHandle, OpenMode, OpenOptions, ProgressFn, ReadHandle, ResultIter, WalkEntry,
    WriteHandle,
};
use crate::concurrency::ClientCache;
use crate::config::HdfsConfig;
use crate::entry::FileEntry;
use crate::error::{ErrorKind, PathError, Result};
use crate::path::Path;
use crate::registry::BackendFactory;
use crate::retry::RetryPolicy;
use crate::stat::{Extra, StatResult};

#[derive(Deserialize)]
struct FileStatusWrapper {
    #[serde(rename = "FileStatus")]
    file_status: WebHdfsStatus,
}

#[derive(Deserialize)]
struct ListStatusWrapper {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatusList,
}

#[derive(Deserialize)]
struct FileStatusList {
    #[serde(rename = "FileStatus")]
    file_status: Vec<WebHdfsStatus>,
}

#[derive(Deserialize, Clone)]
struct WebHdfsStatus {
    #[serde(rename = "pathSuffix", default)]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    length: i64,
    #[serde(rename = "modificationTime")]
    modification_time: i64,
    #[serde(default)]
    permission: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    group: String,
}

impl WebHdfsStatus {
    fn is_dir(&self) -> bool {
        self.kind == "DIRECTORY"
    }

    fn to_stat(&self) -> StatResult {
        let mode = u32::from_str_radix(&self.permission, 8).unwrap_or(0o755);
        let extra = Extra::empty().with("mode", mode as i64).with("owner", self.owner.clone()).with("group", self.group.clone());
        StatResult {
            size: self.length,
            mtime: self.modification_time as f64 / 1000.0,
            ctime: self.modification_time as f64 / 1000.0,
            isdir: self.is_dir(),
            islnk: false,
            extra,
        }
    }
}

#[derive(Deserialize)]
struct RemoteExceptionWrapper {
    #[serde(rename = "RemoteException")]
    exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    exception: String,
    message: String,
}

fn classify_status(status: StatusCode, body: &str, path: &str) -> PathError {
    let parsed: Option<RemoteExceptionWrapper> = serde_json::from_str(body).ok();
    let name = parsed.as_ref().map(|w| w.exception.exception.as_str()).unwrap_or("");
    let kind = match (status, name) {
        (StatusCode::NOT_FOUND, _) | (_, "FileNotFoundException") => ErrorKind::NotFound,
        (_, "FileAlreadyExistsException") => ErrorKind::AlreadyExists,
        (_, "AccessControlException") => ErrorKind::PermissionDenied,
        (StatusCode::FORBIDDEN, _) => ErrorKind::PermissionDenied,
        _ if status.is_server_error() => ErrorKind::Transport,
        _ => ErrorKind::Unknown,
    };
    let message = parsed.map(|w| w.exception.message).unwrap_or_else(|| body.to_owned());
    PathError::new(kind, format!("{path}: {message}"))
}

fn transport_error(err: reqwest::Error, path: &str) -> PathError {
    PathError::with_source(ErrorKind::Transport, path.to_owned(), err)
}

/// One HDFS namenode's backend; `root` anchors every path onto a subtree of
/// the filesystem namespace the way `HdfsConfig::root` configures it.
pub struct HdfsBackend {
    runtime: Arc<Runtime>,
    client: Client,
    base_url: String,
    user: Option<String>,
    token: Option<String>,
    root: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HdfsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdfsBackend").field("base_url", &self.base_url).finish()
    }
}

impl HdfsBackend {
    fn native(&self, path: &Path) -> String {
        let rest = path.without_protocol().splitn(2, '/').nth(1).unwrap_or("");
        format!("{}/{rest}", self.root.trim_end_matches('/'))
    }

    fn url(&self, native: &str, op: &str, extra: &[(&str, String)]) -> String {
        let mut url = format!("{}/webhdfs/v1{native}?op={op}", self.base_url.trim_end_matches('/'));
        if let Some(user) = &self.user {
            url.push_str(&format!("&user.name={user}"));
        }
        if let Some(token) = &self.token {
            url.push_str(&format!("&delegation={token}"));
        }
        for (k, v) in extra {
            url.push_str(&format!("&{k}={v}"));
        }
        url
    }

    async fn request_json(&self, url: String, method: reqwest::Method) -> Result<serde_json::Value> {
        let response = self.client.request(method, &url).send().await.map_err(|e| transport_error(e, &url))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(e, &url))?;
        if !status.is_success() {
            return Err(classify_status(status, &body, &url));
        }
        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| PathError::with_source(ErrorKind::Unknown, url, e))
    }

    fn get_file_status(&self, native: &str) -> Result<WebHdfsStatus> {
        let url = self.url(native, "GETFILESTATUS", &[]);
        let value = self.runtime.block_on(self.request_json(url.clone(), reqwest::Method::GET))?;
        let wrapper: FileStatusWrapper = serde_json::from_value(value).map_err(|e| PathError::with_source(ErrorKind::Unknown, url, e))?;
        Ok(wrapper.file_status)
    }

    fn list_status(&self, native: &str) -> Result<Vec<WebHdfsStatus>> {
        let url = self.url(native, "LISTSTATUS", &[]);
        let value = self.runtime.block_on(self.request_json(url.clone(), reqwest::Method::GET))?;
        let wrapper: ListStatusWrapper = serde_json::from_value(value).map_err(|e| PathError::with_source(ErrorKind::Unknown, url, e))?;
        Ok(wrapper.file_statuses.file_status)
    }

    /// Issues the create/append two-step: a namenode request with redirects
    /// disabled to read the datanode `Location`, then the actual upload.
    async fn write_via_redirect(&self, url: String, method: reqwest::Method, body: Vec<u8>) -> Result<()> {
        let redirect_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client builder");
        let first = redirect_client.request(method.clone(), &url).send().await.map_err(|e| transport_error(e, &url))?;
        let location = first
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| PathError::new(ErrorKind::Transport, url.clone()))?;
        let second = self.client.request(method, &location).body(body).send().await.map_err(|e| transport_error(e, &location))?;
        if !second.status().is_success() {
            let status = second.status();
            let body = second.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, &location));
        }
        Ok(())
    }
}

impl Backend for HdfsBackend {
    fn scheme(&self) -> &'static str {
        "hdfs"
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.get_file_status(&self.native(path)).is_ok())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(self.get_file_status(&self.native(path))?.is_dir())
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(!self.get_file_status(&self.native(path))?.is_dir())
    }

    fn stat(&self, path: &Path, _follow_symlinks: bool) -> Result<StatResult> {
        Ok(self.get_file_status(&self.native(path))?.to_stat())
    }

    fn scandir(&self, path: &Path) -> Result<ResultIter<FileEntry>> {
        let native = self.native(path);
        let entries = self
            .list_status(&native)?
            .into_iter()
            .map(|status| {
                let child = path.join(&status.path_suffix);
                Ok(FileEntry::new(status.path_suffix.clone(), child.with_protocol(), status.to_stat()))
            })
            .collect::<Vec<Result<FileEntry>>>();
        Ok(Box::new(entries.into_iter()))
    }

    fn scan_stat(&self, path: &Path, missing_ok: bool, _follow_links: bool) -> Result<ResultIter<FileEntry>> {
        if !self.exists(path)? {
            return if missing_ok { Ok(Box::new(std::iter::empty())) } else { Err(PathError::not_found(path.with_protocol())) };
        }
        let mut out = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(dir) = stack.pop() {
            for entry in self.scandir(&dir)? {
                let entry = entry?;
                if entry.is_dir() {
                    stack.push(dir.join(&entry.name));
                } else {
                    out.push(Ok(entry));
                }
            }
        }
        Ok(Box::new(out.into_iter()))
    }

    fn walk(&self, path: &Path, _follow_links: bool) -> Result<ResultIter<WalkEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(dir) = stack.pop() {
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            let entries = match self.scandir(&dir) {
                Ok(it) => it,
                Err(e) => {
                    out.push(Err(e));
                    continue;
                }
            };
            for entry in entries {
                let entry = entry?;
                if entry.is_dir() {
                    dirs.push(entry.name);
                } else {
                    files.push(entry.name);
                }
            }
            dirs.sort();
            files.sort();
            for name in dirs.iter().rev() {
                stack.push(dir.join(name));
            }
            out.push(Ok(WalkEntry { root: dir, dirs, files }));
        }
        Ok(Box::new(out.into_iter()))
    }

    fn mkdir(&self, path: &Path, _parents: bool, exist_ok: bool) -> Result<()> {
        let native = self.native(path);
        let url = self.url(&native, "MKDIRS", &[]);
        match self.runtime.block_on(self.request_json(url, reqwest::Method::PUT)) {
            Ok(_) => Ok(()),
            Err(e) if exist_ok && e.kind == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, path: &Path, missing_ok: bool) -> Result<()> {
        let native = self.native(path);
        let url = self.url(&native, "DELETE", &[("recursive", "false".to_owned())]);
        let result = self.runtime.block_on(self.request_json(url, reqwest::Method::DELETE)).map(|_| ());
        crate::error::suppress_not_found(result, missing_ok)
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        let native = self.native(path);
        let url = self.url(&native, "DELETE", &[("recursive", "true".to_owned())]);
        self.runtime.block_on(self.request_json(url, reqwest::Method::DELETE)).map(|_| ())
    }

    fn rename(&self, path: &Path, dst: &Path, _overwrite: bool) -> Result<()> {
        if !path.same_backend(dst) {
            return Err(PathError::unsupported(path.with_protocol()));
        }
        let native = self.native(path);
        let dst_native = self.native(dst);
        let url = self.url(&native, "RENAME", &[("destination", dst_native)]);
        self.runtime.block_on(self.request_json(url, reqwest::Method::PUT)).map(|_| ())
    }

    fn copy(&self, path: &Path, dst: &Path, _follow_links: bool, overwrite: bool, mut progress: Option<&mut ProgressFn<'_>>) -> Result<()> {
        if !overwrite && self.exists(dst)? {
            return Err(PathError::new(ErrorKind::AlreadyExists, dst.with_protocol()));
        }
        let bytes = self.load(path)?;
        self.save(dst, &bytes)?;
        if let Some(cb) = progress.as_mut() {
            cb(bytes.len() as u64);
        }
        Ok(())
    }

    fn open(&self, path: &Path, mode: OpenMode, opts: &OpenOptions) -> Result<FileHandle> {
        let native = self.native(path);
        match mode {
            OpenMode::Read => {
                let size = self.get_file_status(&native)?.length.max(0) as u64;
                Ok(FileHandle::Read(Box::new(prefetch::HdfsPrefetchReader::open(
                    self.runtime.clone(),
                    self.client.clone(),
                    self.url(&native, "OPEN", &[]),
                    size,
                    opts,
                    self.retry,
                ))))
            }
            OpenMode::Write => {
                let bytes = Vec::new();
                Ok(FileHandle::Write(Box::new(HdfsWriteHandle {
                    runtime: self.runtime.clone(),
                    client: self.client.clone(),
                    create_url: self.url(&native, "CREATE", &[("overwrite", "true".to_owned())]),
                    buf: bytes,
                    closed: false,
                })))
            }
            OpenMode::Append => {
                let existing = self.load(path).map(|b| b.to_vec()).unwrap_or_default();
                Ok(FileHandle::Write(Box::new(HdfsWriteHandle {
                    runtime: self.runtime.clone(),
                    client: self.client.clone(),
                    create_url: self.url(&native, "CREATE", &[("overwrite", "true".to_owned())]),
                    buf: existing,
                    closed: false,
                })))
            }
        }
    }

    fn load(&self, path: &Path) -> Result<bytes::Bytes> {
        let native = self.native(path);
        let url = self.url(&native, "OPEN", &[]);
        self.runtime.block_on(async {
            let response = self.client.get(&url).send().await.map_err(|e| transport_error(e, &url))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &body, &url));
            }
            response.bytes().await.map_err(|e| transport_error(e, &url))
        })
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        let native = self.native(path);
        let url = self.url(&native, "CREATE", &[("overwrite", "true".to_owned())]);
        self.runtime.block_on(self.write_via_redirect(url, reqwest::Method::PUT, content.to_vec()))
    }

    /// MD5 of a directory is the MD5 of its direct children's sorted MD5 hex
    /// strings concatenated (spec.md §4.11); a file's MD5 is of its content.
    fn md5(&self, path: &Path, _recalc: bool, _follow_links: bool) -> Result<String> {
        use md5::{Digest, Md5};
        if self.is_dir(path)? {
            let mut children_md5: Vec<String> = self
                .scandir(path)?
                .map(|e| e.and_then(|e| self.md5(&Path::parse(&e.path), false, false)))
                .collect::<Result<Vec<_>>>()?;
            children_md5.sort();
            let mut hasher = Md5::new();
            for hex in &children_md5 {
                hasher.update(hex.as_bytes());
            }
            Ok(hex::encode(hasher.finalize()))
        } else {
            let bytes = self.load(path)?;
            let mut hasher = Md5::new();
            hasher.update(&bytes);
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

struct HdfsWriteHandle {
    runtime: Arc<Runtime>,
    client: Client,
    create_url: String,
    buf: Vec<u8>,
    closed: bool,
}

impl io::Write for HdfsWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteHandle for HdfsWriteHandle {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let redirect_client = Client::builder().redirect(reqwest::redirect::Policy::none()).build().expect("reqwest client builder");
        let create_url = self.create_url.clone();
        let buf = std::mem::take(&mut self.buf);
        let client = self.client.clone();
        self.runtime.block_on(async move {
            let first = redirect_client.put(&create_url).send().await.map_err(|e| transport_error(e, &create_url))?;
            let location = first
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| PathError::new(ErrorKind::Transport, create_url.clone()))?;
            let second = client.put(&location).body(buf).send().await.map_err(|e| transport_error(e, &location))?;
            if !second.status().is_success() {
                let status = second.status();
                let body = second.text().await.unwrap_or_default();
                return Err(classify_status(status, &body, &location));
            }
            Ok(())
        })
    }

    fn abort(&mut self) -> Result<()> {
        self.closed = true;
        self.buf.clear();
        Ok(())
    }
}

impl Drop for HdfsWriteHandle {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

/// Registers [`HdfsBackend`] under `hdfs`, one client per profile (the
/// authority names the profile; the namenode URL itself comes from
/// [`HdfsConfig`]).
#[derive(Default)]
pub struct HdfsFactory {
    clients: ClientCache,
}

impl std::fmt::Debug for HdfsFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdfsFactory").finish()
    }
}

impl BackendFactory for HdfsFactory {
    fn scheme(&self) -> &'static str {
        "hdfs"
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        let profile = path.authority();
        let config = if profile.is_empty() { HdfsConfig::from_env(None) } else { HdfsConfig::from_env(Some(profile)) };
        let base_url = config.url.clone().ok_or_else(|| PathError::new(ErrorKind::Config, path.with_protocol()))?;
        let key = crate::concurrency::ClientKey::new("hdfs", profile, config.user.clone().unwrap_or_default(), 0, "");
        let backend = self.clients.get_or_create(&key, || -> Result<HdfsBackend> {
            let mut builder = Client::builder();
            if let Some(secs) = config.timeout_secs {
                builder = builder.timeout(std::time::Duration::from_secs(secs));
            }
            let client = builder.build().map_err(|e| PathError::with_source(ErrorKind::Config, path.with_protocol(), e))?;
            let runtime = Arc::new(tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|e| {
                PathError::with_source(ErrorKind::Unknown, path.with_protocol(), e)
            })?);
            Ok(HdfsBackend {
                runtime,
                client,
                base_url,
                user: config.user,
                token: config.token,
                root: config.root.unwrap_or_default(),
                retry: RetryPolicy::DEFAULT,
            })
        })?;
        Ok(backend as Arc<dyn Backend>)
    }
}

/// Windowed block-cache reader over WebHDFS's `OPEN` operation (spec.md
/// §4.11, "same design as §4.5"): identical scheduling/eviction logic to
/// [`super::s3::prefetch::PrefetchReader`], with WebHDFS `offset`/`length`
/// query parameters standing in for S3's `Range` header.
mod prefetch {
    use super::*;

    async fn fetch_block(client: Client, base_url: String, start: u64, end_inclusive: u64, retry: RetryPolicy) -> Result<Bytes> {
        let length = end_inclusive - start + 1;
        let url = format!("{base_url}&offset={start}&length={length}");
        let mut attempt = 0u32;
        loop {
            let result = client.get(&url).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    return response.bytes().await.map_err(|e| transport_error(e, &url));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if attempt < retry.max_retries && status.is_server_error() {
                        debug!(attempt, %status, "retrying HDFS block fetch");
                        tokio::time::sleep(std::time::Duration::from_millis(100 << attempt.min(10))).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classify_status(status, &body, &url));
                }
                Err(e) if attempt < retry.max_retries => {
                    debug!(attempt, error = ?e, "retrying HDFS block fetch after transport error");
                    tokio::time::sleep(std::time::Duration::from_millis(100 << attempt.min(10))).await;
                    attempt += 1;
                }
                Err(e) => return Err(transport_error(e, &url)),
            }
        }
    }

    const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
    const DEFAULT_FORWARD: usize = 2;
    const DEFAULT_BACKWARD: usize = 1;
    const DEFAULT_CONCURRENCY: usize = 4;

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

    pub struct HdfsPrefetchReader {
        runtime: Arc<Runtime>,
        client: Client,
        open_url: String,
        size: u64,
        block_size: u64,
        forward: usize,
        backward: usize,
        max_buffer_size: usize,
        retry: RetryPolicy,
        pos: u64,
        blocks: BTreeMap<u64, BlockSlot>,
    }

    impl HdfsPrefetchReader {
        pub fn open(runtime: Arc<Runtime>, client: Client, open_url: String, size: u64, opts: &OpenOptions, retry: RetryPolicy) -> Self {
            let block_size = opts.block_size.map(|b| b as u64).unwrap_or(DEFAULT_BLOCK_SIZE).max(1);
            HdfsPrefetchReader {
                runtime,
                client,
                open_url,
                size,
                block_size,
                forward: opts.max_concurrency.unwrap_or(DEFAULT_FORWARD).max(1),
                backward: DEFAULT_BACKWARD,
                max_buffer_size: opts.max_buffer_size.unwrap_or(DEFAULT_CONCURRENCY * block_size as usize),
                retry,
                pos: 0,
                blocks: BTreeMap::new(),
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

        fn schedule(&mut self, index: u64) {
            if self.blocks.contains_key(&index) || index >= self.block_count() {
                return;
            }
            let (start, end) = self.block_range(index);
            let client = self.client.clone();
            let url = self.open_url.clone();
            let retry = self.retry;
            let handle = self.runtime.spawn(fetch_block(client, url, start, end, retry));
            self.blocks.insert(index, BlockSlot::Pending(handle));
        }

        fn schedule_window(&mut self, center: u64) {
            for i in center..=(center + self.forward as u64) {
                self.schedule(i);
            }
        }

        fn evict_outside_window(&mut self, center: u64) {
            let low = center.saturating_sub(self.backward as u64);
            let high = center + self.forward as u64;
            let stale: Vec<u64> = self.blocks.keys().copied().filter(|i| *i < low || *i > high).collect();
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
            let slot = self.blocks.remove(&index).unwrap_or_else(|| {
                self.schedule(index);
                self.blocks.remove(&index).expect("just scheduled")
            });
            let bytes = match slot {
                BlockSlot::Ready(b) => b,
                BlockSlot::Pending(handle) => match self.runtime.block_on(handle) {
                    Ok(Ok(bytes)) => bytes,
                    Ok(Err(e)) => return Err(e),
                    Err(join_err) if join_err.is_cancelled() => {
                        return Err(PathError::new(ErrorKind::Transport, self.open_url.clone()));
                    }
                    Err(join_err) => return Err(PathError::with_source(ErrorKind::Unknown, self.open_url.clone(), join_err)),
                },
            };
            self.blocks.insert(index, BlockSlot::Ready(bytes.clone()));
            Ok(bytes)
        }
    }

    impl io::Read for HdfsPrefetchReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.size || buf.is_empty() {
                return Ok(0);
            }
            let index = self.block_index(self.pos);
            self.schedule_window(index);
            self.evict_outside_window(index);
            let bytes = self.block_bytes(index).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let block_start = index * self.block_size;
            let offset_in_block = (self.pos - block_start) as usize;
            let available = bytes.len().saturating_sub(offset_in_block);
            let to_copy = available.min(buf.len());
            buf[..to_copy].copy_from_slice(&bytes[offset_in_block..offset_in_block + to_copy]);
            self.pos += to_copy as u64;
            trace!(pos = self.pos, to_copy, "hdfs prefetch read");
            Ok(to_copy)
        }
    }

    impl io::Seek for HdfsPrefetchReader {
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

    impl ReadHandle for HdfsPrefetchReader {
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

    impl Drop for HdfsPrefetchReader {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_type_and_permission() {
        let status = WebHdfsStatus {
            path_suffix: "a".to_owned(),
            kind: "DIRECTORY".to_owned(),
            length: 0,
            modification_time: 1_700_000_000_000,
            permission: "755".to_owned(),
            owner: "hdfs".to_owned(),
            group: "supergroup".to_owned(),
        };
        let stat = status.to_stat();
        assert!(stat.is_dir());
        assert_eq!(stat.mode(), 0o755);
        assert_eq!(stat.mtime, 1_700_000_000.0);
    }

    #[test]
    fn classify_status_maps_remote_exception_names() {
        let body = r#"{"RemoteException":{"exception":"FileNotFoundException","message":"not found","javaClassName":"x"}}"#;
        let err = classify_status(StatusCode::NOT_FOUND, body, "hdfs://x/y");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
