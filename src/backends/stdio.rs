// Copyright 2026 The pathkit authors.

//! Stdin/stdout/stderr as paths (spec.md C6 / §6): `stdio://-`, `stdio://0`
//! read from stdin; `stdio://1`, `stdio://2` write to stdout/stderr.
//!
//! Grounded in the reference implementation's `StdioPath`/`STDReader`/
//! `STDWriter`: no seeking, one fixed set of four addressable names, and
//! read/write direction is determined by which name is used rather than by
//! the caller's requested mode.

use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::backend::{
    Backend, FileHandle, OpenMode, OpenOptions, ProgressFn, ReadHandle, ResultIter, WalkEntry,
    WriteHandle,
};
use crate::entry::FileEntry;
use crate::error::{ErrorKind, PathError, Result};
use crate::path::Path;
use crate::registry::BackendFactory;
use crate::stat::StatResult;

const STDIN_NAMES: &[&str] = &["-", "0"];
const STDOUT_NAME: &str = "1";
const STDERR_NAME: &str = "2";

fn descriptor_of(path: &Path) -> Result<&str> {
    let name = path.without_protocol();
    if STDIN_NAMES.contains(&name) || name == STDOUT_NAME || name == STDERR_NAME {
        Ok(name)
    } else {
        Err(PathError::new(ErrorKind::Unsupported, path.with_protocol()))
    }
}

/// `stdio://` backend: every operation except `open`/`exists`/`is_file` is
/// unsupported, matching the reference implementation's narrow surface.
#[derive(Clone, Debug, Default)]
pub struct StdioBackend;

impl StdioBackend {
    pub fn new() -> Self {
        StdioBackend
    }
}

impl Backend for StdioBackend {
    fn scheme(&self) -> &'static str {
        "stdio"
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(descriptor_of(path).is_ok())
    }

    fn is_dir(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(descriptor_of(path).is_ok())
    }

    fn stat(&self, path: &Path, _follow_symlinks: bool) -> Result<StatResult> {
        descriptor_of(path)?;
        Ok(StatResult::file(0, 0.0))
    }

    fn scandir(&self, path: &Path) -> Result<ResultIter<FileEntry>> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn scan_stat(
        &self,
        path: &Path,
        _missing_ok: bool,
        _follow_links: bool,
    ) -> Result<ResultIter<FileEntry>> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn walk(&self, path: &Path, _follow_links: bool) -> Result<ResultIter<WalkEntry>> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn mkdir(&self, path: &Path, _parents: bool, _exist_ok: bool) -> Result<()> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn remove(&self, path: &Path, _missing_ok: bool) -> Result<()> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn rename(&self, path: &Path, _dst: &Path, _overwrite: bool) -> Result<()> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn copy(
        &self,
        path: &Path,
        _dst: &Path,
        _follow_links: bool,
        _overwrite: bool,
        _progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        Err(PathError::unsupported(path.with_protocol()))
    }

    fn open(&self, path: &Path, mode: OpenMode, _opts: &OpenOptions) -> Result<FileHandle> {
        let name = descriptor_of(path)?;
        match (name, mode) {
            (n, OpenMode::Read) if STDIN_NAMES.contains(&n) => {
                Ok(FileHandle::Read(Box::new(StdinHandle(io::stdin()))))
            }
            (n, OpenMode::Write) | (n, OpenMode::Append) if n == STDOUT_NAME => {
                Ok(FileHandle::Write(Box::new(StdoutHandle(io::stdout()))))
            }
            (n, OpenMode::Write) | (n, OpenMode::Append) if n == STDERR_NAME => {
                Ok(FileHandle::Write(Box::new(StderrHandle(io::stderr()))))
            }
            _ => Err(PathError::new(
                ErrorKind::Unsupported,
                format!("cannot open {} in this mode", path.with_protocol()),
            )),
        }
    }

    fn load(&self, path: &Path) -> Result<Bytes> {
        let mut handle = self.open(path, OpenMode::Read, &OpenOptions::default())?.into_read()?;
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut handle, &mut buf)
            .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        Ok(Bytes::from(buf))
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut handle = self.open(path, OpenMode::Write, &OpenOptions::default())?.into_write()?;
        io::Write::write_all(&mut handle, content)
            .map_err(|e| PathError::from_io(e, path.with_protocol()))?;
        handle.close()
    }

    fn md5(&self, path: &Path, _recalc: bool, _follow_links: bool) -> Result<String> {
        Err(PathError::unsupported(path.with_protocol()))
    }
}

fn unseekable(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("stdio is not {op}"))
}

struct StdinHandle(io::Stdin);

impl io::Read for StdinHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.0, buf)
    }
}

impl io::Seek for StdinHandle {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(unseekable("seekable"))
    }
}

impl ReadHandle for StdinHandle {}

struct StdoutHandle(io::Stdout);

impl io::Write for StdoutHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.0, buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.0)
    }
}

impl WriteHandle for StdoutHandle {
    fn close(&mut self) -> Result<()> {
        io::Write::flush(&mut self.0).map_err(|e| PathError::from_io(e, "stdio://1"))
    }
}

struct StderrHandle(io::Stderr);

impl io::Write for StderrHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.0, buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.0)
    }
}

impl WriteHandle for StderrHandle {
    fn close(&mut self) -> Result<()> {
        io::Write::flush(&mut self.0).map_err(|e| PathError::from_io(e, "stdio://2"))
    }
}

#[derive(Debug, Default)]
pub struct StdioFactory;

impl BackendFactory for StdioFactory {
    fn scheme(&self) -> &'static str {
        "stdio"
    }

    fn open(&self, _path: &Path) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(StdioBackend::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_descriptor_is_unsupported() {
        let backend = StdioBackend::new();
        let err = backend.exists(&Path::new("stdio", "3")).unwrap();
        assert!(!err);
    }

    #[test]
    fn stdin_name_is_a_file() {
        let backend = StdioBackend::new();
        assert!(backend.is_file(&Path::new("stdio", "-")).unwrap());
        assert!(backend.is_file(&Path::new("stdio", "0")).unwrap());
    }

    #[test]
    fn opening_stdout_for_read_is_unsupported() {
        let backend = StdioBackend::new();
        let err = backend.open(&Path::new("stdio", "1"), OpenMode::Read, &OpenOptions::default());
        assert!(err.is_err());
    }
}
