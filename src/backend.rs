// Copyright 2026 The pathkit authors.

//! The backend contract (spec.md C4 / §4.2): the operation set every
//! storage backend implements, and the handle types `open` returns.

use std::io;

use bytes::Bytes;

use crate::entry::FileEntry;
use crate::error::{ErrorKind, PathError, Result};
use crate::path::Path;
use crate::stat::StatResult;

/// A lazily-produced, close-on-drop sequence of directory entries or paths.
/// Iterators borrow no backend state beyond what they captured at creation,
/// so dropping one without exhausting it is always safe (spec.md §9).
pub type ResultIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// One level of a top-down walk: the current directory, its subdirectory
/// names, and its file names, both sorted ascending (spec.md §4.2 `Walk`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalkEntry {
    pub root: Path,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// How an [`Backend::open`] call should treat an existing file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// Tuning knobs for [`Backend::open`], relevant mainly to the S3 engines
/// (spec.md C8–C13) but accepted by every backend so callers don't need to
/// special-case them.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Block / part size in bytes for prefetching readers and multipart
    /// writers. `None` means "use the backend's default".
    pub block_size: Option<usize>,
    /// Number of parallel prefetch/upload workers. `None` means "use the
    /// backend's default".
    pub max_concurrency: Option<usize>,
    /// Maximum bytes of buffered blocks/parts held in memory at once.
    pub max_buffer_size: Option<usize>,
    /// Use an in-memory handle (C13) instead of a temp-file-backed one
    /// (C12) for random-access object-storage opens.
    pub in_memory: bool,
    /// For a memory write handle: upload only on an explicit commit, not
    /// on every write.
    pub atomic: bool,
    /// For a cached (temp-file) handle: unlink the backing temp file as
    /// soon as it's opened (Unix only).
    pub remove_cache_when_open: bool,
    /// Share this read's block cache with every other open reader that
    /// passes the same key against the same object (spec.md C9 / §4.6).
    /// `None` means "use a private, unshared cache" (the default prefetch
    /// reader behavior).
    pub share_key: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            block_size: None,
            max_concurrency: None,
            max_buffer_size: None,
            in_memory: false,
            atomic: false,
            remove_cache_when_open: false,
            share_key: None,
        }
    }
}

/// Readable, seekable handle returned by `open(Read)`.
pub trait ReadHandle: io::Read + io::Seek + Send {
    /// Release backend resources (cancels in-flight prefetches, etc).
    /// Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writable handle returned by `open(Write)` / `open(Append)`.
///
/// Every writer commits on [`WriteHandle::close`] (flushing any pending
/// multipart parts) unless the caller calls [`WriteHandle::abort`] first,
/// per spec.md §3 "Lifecycle".
pub trait WriteHandle: io::Write + Send {
    fn close(&mut self) -> Result<()>;

    /// Discard the write instead of committing it. Backends without a
    /// concept of a pending/uncommitted write (plain local files) treat
    /// this the same as not calling close's commit path, i.e. best-effort.
    fn abort(&mut self) -> Result<()> {
        Ok(())
    }
}

pub enum FileHandle {
    Read(Box<dyn ReadHandle>),
    Write(Box<dyn WriteHandle>),
}

impl FileHandle {
    pub fn into_read(self) -> Result<Box<dyn ReadHandle>> {
        match self {
            FileHandle::Read(r) => Ok(r),
            FileHandle::Write(_) => Err(PathError::new(ErrorKind::Unsupported, "<handle>")),
        }
    }

    pub fn into_write(self) -> Result<Box<dyn WriteHandle>> {
        match self {
            FileHandle::Write(w) => Ok(w),
            FileHandle::Read(_) => Err(PathError::new(ErrorKind::Unsupported, "<handle>")),
        }
    }
}

/// Progress callback invoked by [`Backend::copy`] / the transfer
/// orchestrator with the number of bytes moved in each chunk.
pub type ProgressFn<'a> = dyn FnMut(u64) + Send + 'a;

/// The operation set every backend implements (spec.md §4.2).
///
/// Operations marked "MAY" in the spec have default implementations here
/// that return [`ErrorKind::Unsupported`]; a backend overrides only the
/// ones it actually supports.
pub trait Backend: Send + Sync + std::fmt::Debug {
    fn scheme(&self) -> &'static str;

    fn exists(&self, path: &Path) -> Result<bool>;
    fn is_dir(&self, path: &Path) -> Result<bool>;
    fn is_file(&self, path: &Path) -> Result<bool>;

    fn is_symlink(&self, path: &Path) -> Result<bool> {
        let _ = path;
        Ok(false)
    }

    fn stat(&self, path: &Path, follow_symlinks: bool) -> Result<StatResult>;

    /// Sorted-ascending names of a directory's direct children.
    fn listdir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .scandir(path)?
            .map(|e| e.map(|e| e.name))
            .collect::<Result<_>>()?;
        names.sort();
        Ok(names)
    }

    fn scandir(&self, path: &Path) -> Result<ResultIter<FileEntry>>;

    /// Recursive, files-only listing.
    fn scan(&self, path: &Path, missing_ok: bool, follow_links: bool) -> Result<ResultIter<String>> {
        let inner = self.scan_stat(path, missing_ok, follow_links)?;
        Ok(Box::new(inner.map(|r| r.map(|e| e.path))))
    }

    fn scan_stat(
        &self,
        path: &Path,
        missing_ok: bool,
        follow_links: bool,
    ) -> Result<ResultIter<FileEntry>>;

    /// Top-down recursive walk; each level's dirs and files sorted ascending.
    fn walk(&self, path: &Path, follow_links: bool) -> Result<ResultIter<WalkEntry>>;

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()>;

    fn remove(&self, path: &Path, missing_ok: bool) -> Result<()>;
    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<()> {
        self.remove(path, missing_ok)
    }
    fn rmdir(&self, path: &Path) -> Result<()>;

    fn rename(&self, path: &Path, dst: &Path, overwrite: bool) -> Result<()>;

    fn copy(
        &self,
        path: &Path,
        dst: &Path,
        follow_links: bool,
        overwrite: bool,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()>;

    fn open(&self, path: &Path, mode: OpenMode, opts: &OpenOptions) -> Result<FileHandle>;

    fn load(&self, path: &Path) -> Result<Bytes>;
    fn save(&self, path: &Path, content: &[u8]) -> Result<()>;

    fn md5(&self, path: &Path, recalc: bool, follow_links: bool) -> Result<String>;

    fn getmtime(&self, path: &Path) -> Result<f64> {
        Ok(self.stat(path, true)?.mtime)
    }
    fn getsize(&self, path: &Path) -> Result<u64> {
        Ok(self.stat(path, true)?.size.max(0) as u64)
    }

    // --- MAY-supported operations ---

    fn symlink(&self, path: &Path, target: &Path) -> Result<()> {
        let _ = target;
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn readlink(&self, path: &Path) -> Result<Path> {
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        let _ = mode;
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn absolute(&self, path: &Path) -> Result<Path> {
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn resolve(&self, path: &Path) -> Result<Path> {
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn home(&self) -> Result<Path> {
        Err(PathError::unsupported("~"))
    }
    fn cwd(&self) -> Result<Path> {
        Err(PathError::unsupported("."))
    }
    fn expanduser(&self, path: &Path) -> Result<Path> {
        Err(PathError::unsupported(path.with_protocol()))
    }
    fn utime(&self, path: &Path, mtime: f64) -> Result<()> {
        let _ = mtime;
        Err(PathError::unsupported(path.with_protocol()))
    }
}
