// Copyright 2026 The pathkit authors.

//! WebDAV backend (spec.md C16 / §4.12): `PROPFIND`/`GET`/`PUT`/`MKCOL`/
//! `COPY`/`MOVE` over the injected `reqwest` client.
//!
//! Grounded in the same `Arc<Runtime>` async bridge as
//! [`super::hdfs::HdfsBackend`] and [`super::s3`]'s SDK bridge; the prefetch
//! reader is the same windowed design as `s3/prefetch.rs`, gated on the
//! server advertising `Accept-Ranges: bytes`.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use quick_xml::de::from_str;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::{
    Backend, FileHandle, OpenMode, OpenOptions, ProgressFn, ReadHandle, ResultIter, WalkEntry,
    WriteHandle,
};
use crate::concurrency::ClientCache;
use crate::config::WebdavConfig;
use crate::entry::FileEntry;
use crate::error::{ErrorKind, PathError, Result};
use crate::path::Path;
use crate::registry::BackendFactory;
use crate::retry::RetryPolicy;
use crate::stat::{Extra, StatResult};

/// How long a token fetched via `token_command` is trusted before a 401
/// forces a re-run, per spec.md §4.12 ("rerun when a 401 is received more
/// than 5 s after the last refresh").
const TOKEN_REFRESH_GRACE: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
#[serde(rename = "multistatus")]
struct MultiStatus {
    #[serde(rename = "response", default)]
    responses: Vec<DavResponse>,
}

#[derive(Deserialize)]
struct DavResponse {
    href: String,
    propstat: PropStat,
}

#[derive(Deserialize)]
struct PropStat {
    prop: DavProp,
}

#[derive(Deserialize, Default)]
struct DavProp {
    #[serde(rename = "resourcetype", default)]
    resourcetype: ResourceType,
    #[serde(rename = "getcontentlength", default)]
    getcontentlength: Option<i64>,
    #[serde(rename = "getlastmodified", default)]
    getlastmodified: Option<String>,
    #[serde(rename = "getetag", default)]
    getetag: Option<String>,
}

#[derive(Deserialize, Default)]
struct ResourceType {
    #[serde(rename = "collection", default)]
    collection: Option<()>,
}

impl DavProp {
    fn is_dir(&self) -> bool {
        self.resourcetype.collection.is_some()
    }

    fn to_stat(&self) -> StatResult {
        let mtime = self.getlastmodified.as_deref().and_then(parse_http_date).unwrap_or(0.0);
        let extra = match &self.getetag {
            Some(etag) => Extra::empty().with("etag", etag.trim_matches('"')),
            None => Extra::empty(),
        };
        StatResult {
            size: self.getcontentlength.unwrap_or(0),
            mtime,
            ctime: mtime,
            isdir: self.is_dir(),
            islnk: false,
            extra,
        }
    }
}

fn decode_href_name(href: &str) -> String {
    let trimmed = href.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    percent_encoding::percent_decode_str(last).decode_utf8_lossy().into_owned()
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Days since the epoch for a civil (Gregorian) date, Howard Hinnant's
/// `days_from_civil` algorithm — avoids pulling in a date/time crate just
/// for RFC 1123 `Last-Modified` headers.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

/// Parses an RFC 1123 `Last-Modified` value (`Tue, 15 Nov 1994 12:45:26
/// GMT`) into Unix seconds. Returns `None` on any other format rather than
/// guessing.
fn parse_http_date(s: &str) -> Option<f64> {
    let fields: Vec<&str> = s.split_whitespace().collect();
    if fields.len() != 6 {
        return None;
    }
    let day: i64 = fields[1].parse().ok()?;
    let month = MONTHS.iter().position(|m| *m == fields[2])? as i64 + 1;
    let year: i64 = fields[3].parse().ok()?;
    let mut time_parts = fields[4].split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let min: i64 = time_parts.next()?.parse().ok()?;
    let sec: i64 = time_parts.next()?.parse().ok()?;
    let days = days_from_civil(year, month, day);
    Some((days * 86_400 + hour * 3600 + min * 60 + sec) as f64)
}

fn transport_error(err: reqwest::Error, path: &str) -> PathError {
    PathError::with_source(ErrorKind::Transport, path.to_owned(), err)
}

fn status_error(status: StatusCode, path: &str) -> PathError {
    let kind = match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::PermissionDenied,
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ErrorKind::AlreadyExists,
        s if s.is_server_error() => ErrorKind::Transport,
        _ => ErrorKind::Unknown,
    };
    PathError::new(kind, path.to_owned())
}

/// Credentials the backend holds, refreshed on demand when a token command
/// is configured.
struct AuthState {
    token: Option<String>,
    last_refresh: Instant,
}

pub struct WebDavBackend {
    runtime: Arc<tokio::runtime::Runtime>,
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    token_command: Option<String>,
    auth: Mutex<AuthState>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WebDavBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavBackend").field("base_url", &self.base_url).finish()
    }
}

impl WebDavBackend {
    fn url(&self, path: &Path) -> String {
        let rest = path.without_protocol().splitn(2, '/').nth(1).unwrap_or("");
        format!("{}/{rest}", self.base_url.trim_end_matches('/'))
    }

    /// Reruns `token_command` if more than [`TOKEN_REFRESH_GRACE`] has
    /// elapsed since the last refresh; the fresh token is cached so repeated
    /// 401s in a tight window don't each pay a subprocess spawn.
    fn refresh_token(&self) -> Result<()> {
        let Some(command) = &self.token_command else { return Ok(()) };
        let mut auth = self.auth.lock().expect("webdav auth lock poisoned");
        if auth.last_refresh.elapsed() < TOKEN_REFRESH_GRACE {
            return Ok(());
        }
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| PathError::from_io(e, "webdav token command".to_owned()))?;
        if !output.status.success() {
            return Err(PathError::new(ErrorKind::Config, "webdav token command failed"));
        }
        auth.token = Some(String::from_utf8_lossy(&output.stdout).trim().to_owned());
        auth.last_refresh = Instant::now();
        debug!("refreshed webdav token via token_command");
        Ok(())
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.auth.lock().expect("webdav auth lock poisoned").token.clone();
        if let Some(token) = token {
            return builder.bearer_auth(token);
        }
        if let Some(user) = &self.username {
            return builder.basic_auth(user, self.password.clone());
        }
        builder
    }

    async fn request(&self, method: reqwest::Method, url: &str, extra_headers: &[(&str, &str)], body: Vec<u8>) -> Result<reqwest::Response> {
        let mut builder = self.authorize(self.client.request(method.clone(), url));
        for (k, v) in extra_headers {
            builder = builder.header(*k, *v);
        }
        if !body.is_empty() {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await.map_err(|e| transport_error(e, url))?;
        if response.status() == StatusCode::UNAUTHORIZED && self.token_command.is_some() {
            warn!(%url, "401 from webdav server, refreshing token");
            self.refresh_token()?;
            let mut retried = self.authorize(self.client.request(method, url));
            for (k, v) in extra_headers {
                retried = retried.header(*k, *v);
            }
            if !body.is_empty() {
                retried = retried.body(body);
            }
            return retried.send().await.map_err(|e| transport_error(e, url));
        }
        Ok(response)
    }

    fn propfind(&self, path: &Path, depth: &str) -> Result<Vec<(String, DavProp)>> {
        let url = self.url(path);
        let body = br#"<?xml version="1.0" encoding="utf-8"?><propfind xmlns="DAV:"><allprop/></propfind>"#.to_vec();
        let response = self.runtime.block_on(self.request(
            reqwest::Method::from_bytes(b"PROPFIND").expect("valid method"),
            &url,
            &[("Depth", depth), ("Content-Type", "application/xml")],
            body,
        ))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        let text = self.runtime.block_on(response.text()).map_err(|e| transport_error(e, &url))?;
        let parsed: MultiStatus = from_str(&text).map_err(|e| PathError::with_source(ErrorKind::Unknown, url.clone(), e))?;
        Ok(parsed.responses.into_iter().map(|r| (r.href, r.propstat.prop)).collect())
    }

    fn stat_via_propfind(&self, path: &Path) -> Result<StatResult> {
        let entries = self.propfind(path, "0")?;
        entries
            .into_iter()
            .next()
            .map(|(_, prop)| prop.to_stat())
            .ok_or_else(|| PathError::not_found(path.with_protocol()))
    }

    fn accepts_ranges(&self, path: &Path) -> bool {
        let url = self.url(path);
        let result = self.runtime.block_on(self.request(reqwest::Method::HEAD, &url, &[], Vec::new()));
        match result {
            Ok(response) => response
                .headers()
                .get(reqwest::header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl Backend for WebDavBackend {
    fn scheme(&self) -> &'static str {
        "webdav"
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.stat_via_propfind(path).is_ok())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(self.stat_via_propfind(path)?.is_dir())
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(self.stat_via_propfind(path)?.is_file())
    }

    fn stat(&self, path: &Path, _follow_symlinks: bool) -> Result<StatResult> {
        self.stat_via_propfind(path)
    }

    fn scandir(&self, path: &Path) -> Result<ResultIter<FileEntry>> {
        let base_href = self.url(path);
        let entries = self
            .propfind(path, "1")?
            .into_iter()
            .filter_map(|(href, prop)| {
                let name = decode_href_name(&href);
                if base_href.trim_end_matches('/').ends_with(&name) && href.trim_end_matches('/') == base_href.trim_end_matches('/') {
                    return None; // PROPFIND Depth:1 also returns the collection itself
                }
                let child = path.join(&name);
                Some(Ok(FileEntry::new(name, child.with_protocol(), prop.to_stat())))
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
        let url = self.url(path);
        let response = self
            .runtime
            .block_on(self.request(reqwest::Method::from_bytes(b"MKCOL").expect("valid method"), &url, &[], Vec::new()))?;
        if response.status().is_success() {
            return Ok(());
        }
        if exist_ok && response.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(()); // MKCOL on an existing collection returns 405
        }
        Err(status_error(response.status(), &url))
    }

    fn remove(&self, path: &Path, missing_ok: bool) -> Result<()> {
        let url = self.url(path);
        let result = self
            .runtime
            .block_on(self.request(reqwest::Method::DELETE, &url, &[], Vec::new()))
            .and_then(|r| if r.status().is_success() { Ok(()) } else { Err(status_error(r.status(), &url)) });
        crate::error::suppress_not_found(result, missing_ok)
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        self.remove(path, false)
    }

    fn rename(&self, path: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        self.copy(path, dst, true, overwrite, None)?;
        self.remove(path, false)
    }

    fn copy(&self, path: &Path, dst: &Path, _follow_links: bool, overwrite: bool, mut progress: Option<&mut ProgressFn<'_>>) -> Result<()> {
        if path.same_backend(dst) {
            let src_url = self.url(path);
            let dst_url = self.url(dst);
            let overwrite_header = if overwrite { "T" } else { "F" };
            let response = self.runtime.block_on(self.request(
                reqwest::Method::from_bytes(b"COPY").expect("valid method"),
                &src_url,
                &[("Destination", &dst_url), ("Overwrite", overwrite_header)],
                Vec::new(),
            ))?;
            if !response.status().is_success() {
                return Err(status_error(response.status(), &dst_url));
            }
            if let Some(cb) = progress.as_mut() {
                if let Ok(stat) = self.stat_via_propfind(path) {
                    cb(stat.size.max(0) as u64);
                }
            }
            return Ok(());
        }
        // Cross-backend: no server-side fast path, stream through memory.
        let bytes = self.load(path)?;
        self.save(dst, &bytes)?;
        if let Some(cb) = progress.as_mut() {
            cb(bytes.len() as u64);
        }
        Ok(())
    }

    fn open(&self, path: &Path, mode: OpenMode, opts: &OpenOptions) -> Result<FileHandle> {
        match mode {
            OpenMode::Read => {
                let stat = self.stat_via_propfind(path)?;
                let url = self.url(path);
                if self.accepts_ranges(path) {
                    Ok(FileHandle::Read(Box::new(prefetch::WebDavPrefetchReader::open(
                        self.runtime.clone(),
                        self.client.clone(),
                        self.auth_snapshot(),
                        url,
                        stat.size.max(0) as u64,
                        opts,
                        self.retry,
                    ))))
                } else {
                    let bytes = self.load(path)?;
                    Ok(FileHandle::Read(Box::new(MemoryReadHandle { buf: bytes.to_vec(), pos: 0 })))
                }
            }
            OpenMode::Write => Ok(FileHandle::Write(Box::new(WebDavWriteHandle {
                runtime: self.runtime.clone(),
                client: self.client.clone(),
                url: self.url(path),
                auth: self.auth_snapshot(),
                buf: Vec::new(),
                closed: false,
            }))),
            OpenMode::Append => {
                let existing = self.load(path).map(|b| b.to_vec()).unwrap_or_default();
                Ok(FileHandle::Write(Box::new(WebDavWriteHandle {
                    runtime: self.runtime.clone(),
                    client: self.client.clone(),
                    url: self.url(path),
                    auth: self.auth_snapshot(),
                    buf: existing,
                    closed: false,
                })))
            }
        }
    }

    fn load(&self, path: &Path) -> Result<Bytes> {
        let url = self.url(path);
        self.runtime.block_on(async {
            let response = self.request(reqwest::Method::GET, &url, &[], Vec::new()).await?;
            if !response.status().is_success() {
                return Err(status_error(response.status(), &url));
            }
            response.bytes().await.map_err(|e| transport_error(e, &url))
        })
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        let url = self.url(path);
        let response = self.runtime.block_on(self.request(reqwest::Method::PUT, &url, &[], content.to_vec()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status(), &url))
        }
    }

    fn md5(&self, path: &Path, recalc: bool, _follow_links: bool) -> Result<String> {
        use md5::{Digest, Md5};
        if !recalc {
            if let Some(etag) = self.stat_via_propfind(path)?.etag().map(str::to_owned) {
                if !etag.contains('-') && etag.len() == 32 {
                    return Ok(etag);
                }
            }
        }
        let bytes = self.load(path)?;
        let mut hasher = Md5::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl WebDavBackend {
    /// A snapshot of the current bearer token / basic-auth pair, cheap
    /// enough to clone into a handle that outlives this call.
    fn auth_snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            token: self.auth.lock().expect("webdav auth lock poisoned").token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Clone)]
struct AuthSnapshot {
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl AuthSnapshot {
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            return builder.bearer_auth(token);
        }
        if let Some(user) = &self.username {
            return builder.basic_auth(user, self.password.clone());
        }
        builder
    }
}

struct MemoryReadHandle {
    buf: Vec<u8>,
    pos: u64,
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
            io::SeekFrom::End(d) => self.buf.len() as i64 + d,
            io::SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl ReadHandle for MemoryReadHandle {}

struct WebDavWriteHandle {
    runtime: Arc<tokio::runtime::Runtime>,
    client: Client,
    url: String,
    auth: AuthSnapshot,
    buf: Vec<u8>,
    closed: bool,
}

impl io::Write for WebDavWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteHandle for WebDavWriteHandle {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let body = std::mem::take(&mut self.buf);
        let url = self.url.clone();
        let auth = self.auth.clone();
        let client = self.client.clone();
        self.runtime.block_on(async move {
            let builder = auth.authorize(client.put(&url)).body(body);
            let response = builder.send().await.map_err(|e| transport_error(e, &url))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(status_error(response.status(), &url))
            }
        })
    }

    fn abort(&mut self) -> Result<()> {
        self.closed = true;
        self.buf.clear();
        Ok(())
    }
}

impl Drop for WebDavWriteHandle {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

/// Registers [`WebDavBackend`] under `webdav`, one client per server
/// authority.
#[derive(Default)]
pub struct WebDavFactory {
    clients: ClientCache,
}

impl std::fmt::Debug for WebDavFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavFactory").finish()
    }
}

impl BackendFactory for WebDavFactory {
    fn scheme(&self) -> &'static str {
        "webdav"
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        let authority = path.authority();
        let config = WebdavConfig::from_env();
        let key = crate::concurrency::ClientKey::new("webdav", authority, config.username.clone().unwrap_or_default(), 0, "");
        let backend = self.clients.get_or_create(&key, || -> Result<WebDavBackend> {
            let mut builder = Client::builder();
            if let Some(secs) = config.timeout_secs {
                builder = builder.timeout(Duration::from_secs(secs));
            }
            let client = builder.build().map_err(|e| PathError::with_source(ErrorKind::Config, path.with_protocol(), e))?;
            let runtime = Arc::new(
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| PathError::with_source(ErrorKind::Unknown, path.with_protocol(), e))?,
            );
            let token = if let Some(command) = &config.token_command {
                let output = std::process::Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .output()
                    .map_err(|e| PathError::from_io(e, "webdav token command".to_owned()))?;
                Some(String::from_utf8_lossy(&output.stdout).trim().to_owned())
            } else {
                config.token.clone()
            };
            Ok(WebDavBackend {
                runtime,
                client,
                base_url: format!("https://{authority}"),
                username: config.username,
                password: config.password,
                token_command: config.token_command,
                auth: Mutex::new(AuthState { token, last_refresh: Instant::now() }),
                retry: RetryPolicy::DEFAULT,
            })
        })?;
        Ok(backend as Arc<dyn Backend>)
    }
}

/// Windowed block-cache reader over WebDAV `GET` + `Range`, gated on
/// `Accept-Ranges: bytes` (spec.md §4.12). Same design as
/// [`super::s3::prefetch::PrefetchReader`] and
/// [`super::hdfs::HdfsBackend`]'s WebHDFS reader.
mod prefetch {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::runtime::Runtime;
    use tokio::task::JoinHandle;

    async fn fetch_block(client: Client, auth: AuthSnapshot, url: String, start: u64, end_inclusive: u64, retry: RetryPolicy) -> Result<Bytes> {
        let range = format!("bytes={start}-{end_inclusive}");
        let mut attempt = 0u32;
        loop {
            let builder = auth.authorize(client.get(&url)).header(reqwest::header::RANGE, &range);
            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    return response.bytes().await.map_err(|e| transport_error(e, &url));
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt < retry.max_retries && status.is_server_error() {
                        attempt += 1;
                        tokio::time::sleep(Duration::from_millis(100 << attempt.min(10))).await;
                        continue;
                    }
                    return Err(status_error(status, &url));
                }
                Err(e) if attempt < retry.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100 << attempt.min(10))).await;
                    let _ = e;
                }
                Err(e) => return Err(transport_error(e, &url)),
            }
        }
    }

    const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
    const DEFAULT_FORWARD: usize = 2;
    const DEFAULT_BACKWARD: usize = 1;

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

    pub struct WebDavPrefetchReader {
        runtime: Arc<Runtime>,
        client: Client,
        auth: AuthSnapshot,
        url: String,
        size: u64,
        block_size: u64,
        forward: usize,
        backward: usize,
        max_buffer_size: usize,
        retry: RetryPolicy,
        pos: u64,
        blocks: BTreeMap<u64, BlockSlot>,
    }

    impl WebDavPrefetchReader {
        pub fn open(runtime: Arc<Runtime>, client: Client, auth: AuthSnapshot, url: String, size: u64, opts: &OpenOptions, retry: RetryPolicy) -> Self {
            let block_size = opts.block_size.map(|b| b as u64).unwrap_or(DEFAULT_BLOCK_SIZE).max(1);
            WebDavPrefetchReader {
                runtime,
                client,
                auth,
                url,
                size,
                block_size,
                forward: opts.max_concurrency.unwrap_or(DEFAULT_FORWARD).max(1),
                backward: DEFAULT_BACKWARD,
                max_buffer_size: opts.max_buffer_size.unwrap_or(4 * block_size as usize),
                retry,
                pos: 0,
                blocks: BTreeMap::new(),
            }
        }

        fn block_index(&self, pos: u64) -> u64 {
            pos / self.block_size
        }

        fn schedule(&mut self, index: u64) {
            if self.blocks.contains_key(&index) || index >= block_count(self.size, self.block_size) {
                return;
            }
            let (start, end) = block_range(index, self.block_size, self.size);
            let handle = self.runtime.spawn(fetch_block(self.client.clone(), self.auth.clone(), self.url.clone(), start, end, self.retry));
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
                    Err(join_err) if join_err.is_cancelled() => return Err(PathError::new(ErrorKind::Transport, self.url.clone())),
                    Err(join_err) => return Err(PathError::with_source(ErrorKind::Unknown, self.url.clone(), join_err)),
                },
            };
            self.blocks.insert(index, BlockSlot::Ready(bytes.clone()));
            Ok(bytes)
        }
    }

    impl io::Read for WebDavPrefetchReader {
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
            Ok(to_copy)
        }
    }

    impl io::Seek for WebDavPrefetchReader {
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

    impl ReadHandle for WebDavPrefetchReader {
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

    impl Drop for WebDavPrefetchReader {
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
    fn decode_href_name_strips_trailing_slash_and_percent_escapes() {
        assert_eq!(decode_href_name("/dav/a%20b/"), "a b");
        assert_eq!(decode_href_name("/dav/plain.txt"), "plain.txt");
    }

    #[test]
    fn dav_prop_maps_collection_and_size() {
        let prop = DavProp {
            resourcetype: ResourceType { collection: Some(()) },
            getcontentlength: None,
            getlastmodified: None,
            getetag: None,
        };
        assert!(prop.is_dir());
        let stat = prop.to_stat();
        assert!(stat.is_dir());
        assert_eq!(stat.size, 0);
    }
}
