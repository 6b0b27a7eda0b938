// Copyright 2026 The pathkit authors.

//! The local filesystem backend (spec.md C5 / §4.3): direct OS syscalls,
//! with the symlink-follow and aggregate-size/mtime conventions spec.md
//! layers on top of raw `stat`.
//!
//! Grounded in the teacher's `transport::local::LocalTransport` (same
//! read-dir-to-`DirEntry`, write-via-tempfile-then-persist, and
//! remove/remove_dir_all shape), generalized from a `root`-relative
//! transport into a [`Backend`] that takes absolute paths directly, since
//! spec.md's `Path` already carries the full path in its remainder.

use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path as FsPath;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use md5::{Digest, Md5};
use tracing::trace;

use crate::backend::{
    Backend, FileHandle, OpenMode, OpenOptions, ProgressFn, ReadHandle, ResultIter, WalkEntry,
    WriteHandle,
};
use crate::entry::FileEntry;
use crate::error::{ErrorKind, PathError, Result};
use crate::kind::Kind;
use crate::path::Path;
use crate::registry::BackendFactory;
use crate::stat::{Extra, StatResult};

fn native(path: &Path) -> &FsPath {
    FsPath::new(path.without_protocol())
}

fn to_secs(t: io::Result<std::time::SystemTime>) -> f64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn stat_from_metadata(meta: &fs::Metadata, is_symlink: bool) -> StatResult {
    let extra = Extra::empty()
        .with("mode", meta.permissions().mode() as i64)
        .with("uid", meta.uid() as i64)
        .with("gid", meta.gid() as i64)
        .with("ino", meta.ino() as i64)
        .with("nlink", meta.nlink() as i64);
    StatResult {
        size: meta.len() as i64,
        mtime: to_secs(meta.modified()),
        ctime: meta.ctime() as f64 + meta.ctime_nsec() as f64 / 1e9,
        isdir: meta.is_dir(),
        islnk: is_symlink,
        extra,
    }
}

/// The local filesystem, rooted at the OS root: a [`Path`]'s remainder is
/// used as-is, with no `root`-relative rewriting.
#[derive(Clone, Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        LocalBackend
    }

    fn lstat(&self, path: &Path) -> Result<fs::Metadata> {
        fs::symlink_metadata(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))
    }

    /// Sum of `lstat().size` over every descendant, per spec.md §4.3.
    fn dir_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        for entry in self.scan_stat(path, false, false)? {
            total += entry?.stat.size.max(0) as u64;
        }
        Ok(total)
    }

    /// Maximum `mtime` over every descendant; 0 for an empty directory.
    fn dir_mtime(&self, path: &Path) -> Result<f64> {
        let mut max_mtime = 0.0f64;
        for entry in self.scan_stat(path, false, false)? {
            max_mtime = max_mtime.max(entry?.stat.mtime);
        }
        Ok(max_mtime)
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(native(path).exists() || native(path).symlink_metadata().is_ok())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(self.stat(path, false)?.is_dir())
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(self.stat(path, false)?.is_file())
    }

    fn is_symlink(&self, path: &Path) -> Result<bool> {
        Ok(self.lstat(path)?.file_type().is_symlink())
    }

    fn stat(&self, path: &Path, follow_symlinks: bool) -> Result<StatResult> {
        let meta = self.lstat(path)?;
        let is_symlink = meta.file_type().is_symlink();
        if follow_symlinks && is_symlink {
            let target_meta = fs::metadata(native(path))
                .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
            return Ok(stat_from_metadata(&target_meta, false));
        }
        if is_symlink && native(path).is_dir() {
            // A directory's own size/mtime always come from the dir's own
            // metadata, never from an aggregate, so this is safe even
            // before the dir-aggregate overrides in getsize/getmtime.
            return Ok(stat_from_metadata(&meta, true));
        }
        Ok(stat_from_metadata(&meta, is_symlink))
    }

    fn scandir(&self, path: &Path) -> Result<ResultIter<FileEntry>> {
        let dir = native(path).to_owned();
        let read_dir =
            fs::read_dir(&dir).map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        let base = path.clone();
        let entries: Vec<Result<FileEntry>> = read_dir
            .map(|de_result| -> Result<FileEntry> {
                let de = de_result.map_err(|e| PathError::from_io(e, base.with_protocol()))?;
                let name = de.file_name().to_string_lossy().into_owned();
                let meta = de
                    .metadata()
                    .map_err(|e| PathError::from_io(e, base.with_protocol()))?;
                let stat = stat_from_metadata(&meta, meta.file_type().is_symlink());
                let child = base.join(&name);
                Ok(FileEntry::new(name, child.with_protocol(), stat))
            })
            .collect();
        Ok(Box::new(entries.into_iter()))
    }

    fn scan_stat(
        &self,
        path: &Path,
        missing_ok: bool,
        follow_links: bool,
    ) -> Result<ResultIter<FileEntry>> {
        fn walk_into(
            backend: &LocalBackend,
            path: &Path,
            follow_links: bool,
            out: &mut Vec<Result<FileEntry>>,
        ) {
            let children = match backend.scandir(path) {
                Ok(it) => it,
                Err(e) => {
                    out.push(Err(e));
                    return;
                }
            };
            for child in children {
                match child {
                    Ok(entry) => {
                        if entry.is_dir() {
                            let child_path = path.join(&entry.name);
                            walk_into(backend, &child_path, follow_links, out);
                        } else {
                            out.push(Ok(entry));
                        }
                    }
                    Err(e) => out.push(Err(e)),
                }
            }
        }
        if !self.exists(path)? {
            return if missing_ok {
                Ok(Box::new(std::iter::empty()))
            } else {
                Err(PathError::not_found(path.with_protocol()))
            };
        }
        let mut out = Vec::new();
        walk_into(self, path, follow_links, &mut out);
        Ok(Box::new(out.into_iter()))
    }

    fn walk(&self, path: &Path, follow_links: bool) -> Result<ResultIter<WalkEntry>> {
        fn walk_into(
            backend: &LocalBackend,
            path: &Path,
            follow_links: bool,
            out: &mut Vec<Result<WalkEntry>>,
        ) -> Result<()> {
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            for child in backend.scandir(path)? {
                let entry = child?;
                if entry.is_dir() {
                    dirs.push(entry.name);
                } else {
                    files.push(entry.name);
                }
            }
            dirs.sort();
            files.sort();
            let subdirs = dirs.clone();
            out.push(Ok(WalkEntry {
                root: path.clone(),
                dirs,
                files,
            }));
            for name in subdirs {
                let child_path = path.join(&name);
                if !follow_links && backend.is_symlink(&child_path).unwrap_or(false) {
                    continue;
                }
                walk_into(backend, &child_path, follow_links, out)?;
            }
            Ok(())
        }
        let mut out = Vec::new();
        if let Err(e) = walk_into(self, path, follow_links, &mut out) {
            out.push(Err(e));
        }
        Ok(Box::new(out.into_iter()))
    }

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()> {
        let result = if parents {
            fs::create_dir_all(native(path))
        } else {
            fs::create_dir(native(path))
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && exist_ok => Ok(()),
            Err(e) => Err(PathError::from_io(e, path.with_protocol())),
        }
    }

    fn remove(&self, path: &Path, missing_ok: bool) -> Result<()> {
        let result = if native(path).is_dir() && !native(path).is_symlink() {
            fs::remove_dir_all(native(path))
        } else {
            fs::remove_file(native(path))
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && missing_ok => Ok(()),
            Err(e) => Err(PathError::from_io(e, path.with_protocol())),
        }
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))
    }

    fn rename(&self, path: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        if !overwrite && native(dst).exists() {
            return Err(PathError::new(ErrorKind::AlreadyExists, dst.with_protocol()));
        }
        fs::rename(native(path), native(dst))
            .map_err(|e| PathError::from_io(e, path.with_protocol()))
    }

    fn copy(
        &self,
        path: &Path,
        dst: &Path,
        follow_links: bool,
        overwrite: bool,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        if !overwrite && native(dst).exists() {
            return Err(PathError::new(ErrorKind::AlreadyExists, dst.with_protocol()));
        }
        if self.is_symlink(path)? && !follow_links {
            let target = fs::read_link(native(path))
                .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
            std::os::unix::fs::symlink(target, native(dst))
                .map_err(|e| PathError::from_io(e, dst.with_protocol()))?;
            return Ok(());
        }
        let n = fs::copy(native(path), native(dst))
            .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        if let Some(cb) = progress.as_mut() {
            cb(n);
        }
        Ok(())
    }

    fn open(&self, path: &Path, mode: OpenMode, _opts: &OpenOptions) -> Result<FileHandle> {
        match mode {
            OpenMode::Read => {
                let file =
                    fs::File::open(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))?;
                Ok(FileHandle::Read(Box::new(LocalReadHandle(file))))
            }
            OpenMode::Write | OpenMode::Append => {
                let mut opts = fs::OpenOptions::new();
                opts.write(true).create(true);
                if mode == OpenMode::Append {
                    opts.append(true);
                } else {
                    opts.truncate(true);
                }
                let file = opts
                    .open(native(path))
                    .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
                Ok(FileHandle::Write(Box::new(LocalWriteHandle(file))))
            }
        }
    }

    fn load(&self, path: &Path) -> Result<Bytes> {
        let bytes =
            fs::read(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        Ok(Bytes::from(bytes))
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        trace!(path = %path.with_protocol(), bytes = content.len(), "writing file");
        let full_path = native(path);
        let dir = full_path
            .parent()
            .ok_or_else(|| PathError::new(ErrorKind::NotADirectory, path.with_protocol()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".pathkit-tmp-")
            .tempfile_in(dir)
            .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        use std::io::Write;
        if let Err(e) = temp.write_all(content) {
            let _ = temp.close();
            return Err(PathError::from_io(e, path.with_protocol()));
        }
        temp.persist(full_path)
            .map_err(|e| PathError::from_io(e.error, path.with_protocol()))?;
        Ok(())
    }

    fn md5(&self, path: &Path, _recalc: bool, follow_links: bool) -> Result<String> {
        let bytes = if follow_links {
            self.load(path)?
        } else {
            fs::read(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))?.into()
        };
        let mut hasher = Md5::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    fn getmtime(&self, path: &Path) -> Result<f64> {
        if self.is_dir(path)? {
            self.dir_mtime(path)
        } else {
            Ok(self.stat(path, true)?.mtime)
        }
    }

    fn getsize(&self, path: &Path) -> Result<u64> {
        if self.is_dir(path)? {
            self.dir_size(path)
        } else {
            Ok(self.stat(path, true)?.size.max(0) as u64)
        }
    }

    fn symlink(&self, path: &Path, target: &Path) -> Result<()> {
        std::os::unix::fs::symlink(native(target), native(path))
            .map_err(|e| PathError::from_io(e, path.with_protocol()))
    }

    fn readlink(&self, path: &Path) -> Result<Path> {
        let target = fs::read_link(native(path))
            .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        Ok(Path::new("file", target.to_string_lossy().into_owned()))
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(native(path), fs::Permissions::from_mode(mode))
            .map_err(|e| PathError::from_io(e, path.with_protocol()))
    }

    fn absolute(&self, path: &Path) -> Result<Path> {
        let abs = if native(path).is_absolute() {
            native(path).to_owned()
        } else {
            std::env::current_dir()
                .map_err(|e| PathError::from_io(e, path.with_protocol()))?
                .join(native(path))
        };
        Ok(Path::new("file", abs.to_string_lossy().into_owned()))
    }

    fn resolve(&self, path: &Path) -> Result<Path> {
        let canon =
            fs::canonicalize(native(path)).map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        Ok(Path::new("file", canon.to_string_lossy().into_owned()))
    }

    fn home(&self) -> Result<Path> {
        dirs::home_dir()
            .map(|p| Path::new("file", p.to_string_lossy().into_owned()))
            .ok_or_else(|| PathError::new(ErrorKind::Config, "~"))
    }

    fn cwd(&self) -> Result<Path> {
        let cwd = std::env::current_dir().map_err(|e| PathError::from_io(e, "."))?;
        Ok(Path::new("file", cwd.to_string_lossy().into_owned()))
    }

    fn expanduser(&self, path: &Path) -> Result<Path> {
        let remainder = path.without_protocol();
        if let Some(rest) = remainder.strip_prefix('~') {
            let home = self.home()?;
            let rest = rest.trim_start_matches('/');
            return Ok(if rest.is_empty() {
                home
            } else {
                home.join(rest)
            });
        }
        Ok(path.clone())
    }

    fn utime(&self, path: &Path, mtime: f64) -> Result<()> {
        let when = filetime::FileTime::from_unix_time(mtime.trunc() as i64, 0);
        filetime::set_file_mtime(native(path), when)
            .map_err(|e| PathError::from_io(e, path.with_protocol()))
    }
}

struct LocalReadHandle(fs::File);

impl io::Read for LocalReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl io::Seek for LocalReadHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl ReadHandle for LocalReadHandle {}

struct LocalWriteHandle(fs::File);

impl io::Write for LocalWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl WriteHandle for LocalWriteHandle {
    fn close(&mut self) -> Result<()> {
        self.0.flush().map_err(|e| PathError::from_io(e, "<local write handle>"))
    }
}

/// Registers [`LocalBackend`] under the `file` scheme; a single instance is
/// reused for every path (the backend is stateless).
#[derive(Debug, Default)]
pub struct LocalFactory;

impl BackendFactory for LocalFactory {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn open(&self, _path: &Path) -> Result<std::sync::Arc<dyn Backend>> {
        Ok(std::sync::Arc::new(LocalBackend::new()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let file = Path::new("file", temp.path().join("a.txt").to_string_lossy().into_owned());
        backend.save(&file, b"hello").unwrap();
        assert_eq!(&backend.load(&file).unwrap()[..], b"hello");
        temp.close().unwrap();
    }

    #[test]
    fn getsize_on_directory_sums_descendants() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = Path::new("file", temp.path().to_string_lossy().into_owned());
        backend.save(&dir.join("a.txt"), b"12345").unwrap();
        backend.mkdir(&dir.join("sub"), true, true).unwrap();
        backend.save(&dir.join("sub/b.txt"), b"123").unwrap();
        assert_eq!(backend.getsize(&dir).unwrap(), 8);
        temp.close().unwrap();
    }

    #[test]
    fn is_dir_and_is_file_do_not_follow_symlinks() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = Path::new("file", temp.path().to_string_lossy().into_owned());
        let target = dir.join("real_dir");
        backend.mkdir(&target, true, true).unwrap();
        let link = dir.join("link_to_dir");
        backend.symlink(&link, &target).unwrap();
        assert!(!backend.is_dir(&link).unwrap());
        assert!(backend.is_file(&link).unwrap());
        assert!(backend.stat(&link, true).unwrap().is_dir());
        temp.close().unwrap();
    }

    #[test]
    fn mkdir_exist_ok_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = Path::new("file", temp.path().join("d").to_string_lossy().into_owned());
        backend.mkdir(&dir, true, true).unwrap();
        backend.mkdir(&dir, true, true).unwrap();
        temp.close().unwrap();
    }

    #[test]
    fn remove_missing_ok_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let missing = Path::new("file", temp.path().join("nope").to_string_lossy().into_owned());
        backend.remove(&missing, true).unwrap();
        assert!(backend.remove(&missing, false).is_err());
        temp.close().unwrap();
    }
}
