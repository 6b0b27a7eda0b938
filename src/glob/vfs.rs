// Copyright 2026 The pathkit authors.

//! The directory primitives the glob engine matches against (spec.md §4.13
//! "Input: pattern string ... and a VFS with exists, is_dir, scandir").
//!
//! One [`Vfs`] implementation serves one backend bound to one authority
//! (bucket, host, local filesystem root) — everything before the first path
//! segment after `scheme://authority` is the caller's problem, not this
//! module's. A backend typically implements this as a thin adapter over its
//! own [`crate::backend::Backend::exists`] / `is_dir` / `scandir`.

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::Result;
use crate::path::Path;

/// Directory listing and existence checks for one backend/authority, in the
/// shape the glob engine's directory-walk needs.
pub trait Vfs: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn is_dir(&self, path: &str) -> bool;

    /// Direct children of `dir`: `(name, is_dir)` pairs, sorted ascending by
    /// name (spec.md §4.13 step 5, "ascending codepoint order"). An error
    /// here (missing directory, transport failure) is treated the same as
    /// an empty directory by the walker — callers that need to distinguish
    /// "doesn't exist" from "empty" should check [`Vfs::exists`] first.
    fn scandir(&self, dir: &str) -> Result<Vec<(String, bool)>>;
}

/// The [`Vfs`] adapter: any [`Backend`] bound to one authority, driven
/// purely through the common trait (`exists`/`is_dir`/`scandir`). One
/// implementation serves every backend (local, S3, SFTP, HDFS, WebDAV,
/// stdio) rather than one bespoke adapter per scheme, since
/// [`crate::glob_in`] only ever needs to reach a backend through its
/// [`Backend`] trait object.
pub struct BackendVfs {
    backend: Arc<dyn Backend>,
    scheme: String,
    authority: String,
}

impl BackendVfs {
    pub fn new(backend: Arc<dyn Backend>, scheme: impl Into<String>, authority: impl Into<String>) -> Self {
        BackendVfs {
            backend,
            scheme: scheme.into(),
            authority: authority.into(),
        }
    }

    fn path_for(&self, remainder: &str) -> Path {
        if self.authority.is_empty() {
            Path::new(self.scheme.clone(), remainder)
        } else if remainder.is_empty() {
            Path::new(self.scheme.clone(), self.authority.clone())
        } else {
            Path::new(self.scheme.clone(), format!("{}/{}", self.authority, remainder))
        }
    }
}

impl Vfs for BackendVfs {
    fn exists(&self, path: &str) -> bool {
        self.backend.exists(&self.path_for(path)).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() && !self.authority.is_empty() {
            return true;
        }
        self.backend.is_dir(&self.path_for(path)).unwrap_or(false)
    }

    fn scandir(&self, dir: &str) -> Result<Vec<(String, bool)>> {
        let mut out: Vec<(String, bool)> = self
            .backend
            .scandir(&self.path_for(dir))?
            .map(|r| r.map(|e| (e.name, e.is_dir())))
            .collect::<Result<_>>()?;
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::StatResult;

    #[derive(Debug)]
    struct StubBackend;

    impl Backend for StubBackend {
        fn scheme(&self) -> &'static str {
            "stub"
        }

        fn exists(&self, path: &Path) -> Result<bool> {
            Ok(path.without_protocol() == "host/a/b.txt")
        }

        fn is_dir(&self, path: &Path) -> Result<bool> {
            Ok(path.without_protocol() == "host/a")
        }

        fn is_file(&self, path: &Path) -> Result<bool> {
            Ok(!self.is_dir(path)?)
        }

        fn stat(&self, path: &Path, _follow_symlinks: bool) -> Result<StatResult> {
            if self.is_dir(path)? {
                Ok(StatResult::dir(0.0))
            } else {
                Ok(StatResult::file(0, 0.0))
            }
        }

        fn scandir(&self, path: &Path) -> Result<crate::backend::ResultIter<crate::entry::FileEntry>> {
            assert_eq!(path.without_protocol(), "host/a");
            let entries = vec![Ok(crate::entry::FileEntry::new("b.txt", "stub://host/a/b.txt", StatResult::file(3, 0.0)))];
            Ok(Box::new(entries.into_iter()))
        }

        fn walk(&self, _path: &Path, _follow_links: bool) -> Result<crate::backend::ResultIter<crate::backend::WalkEntry>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn mkdir(&self, _path: &Path, _parents: bool, _exist_ok: bool) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn remove(&self, _path: &Path, _missing_ok: bool) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn rename(&self, _path: &Path, _dst: &Path, _overwrite: bool) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn rmdir(&self, _path: &Path) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn copy(
            &self,
            _path: &Path,
            _dst: &Path,
            _follow_links: bool,
            _overwrite: bool,
            _progress: Option<&mut crate::backend::ProgressFn<'_>>,
        ) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn open(&self, _path: &Path, _mode: crate::backend::OpenMode, _opts: &crate::backend::OpenOptions) -> Result<crate::backend::FileHandle> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn load(&self, _path: &Path) -> Result<bytes::Bytes> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn save(&self, _path: &Path, _content: &[u8]) -> Result<()> {
            Err(crate::error::PathError::unsupported("stub"))
        }

        fn md5(&self, _path: &Path, _recalc: bool, _follow_links: bool) -> Result<String> {
            Err(crate::error::PathError::unsupported("stub"))
        }
    }

    #[test]
    fn path_for_joins_authority_and_remainder() {
        let vfs = BackendVfs::new(Arc::new(StubBackend), "stub", "host");
        assert!(vfs.is_dir("a"));
        assert!(vfs.exists("a/b.txt"));
        assert_eq!(vfs.scandir("a").unwrap(), vec![("b.txt".to_owned(), false)]);
    }

    #[test]
    fn empty_authority_passes_remainder_through_unchanged() {
        let vfs = BackendVfs::new(Arc::new(StubBackend), "stub", "");
        // No authority segment: "host/a" must be supplied verbatim by the caller.
        assert!(vfs.is_dir("host/a"));
    }
}
