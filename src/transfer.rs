// Copyright 2026 The pathkit authors.

//! Transfer orchestration (spec.md C18 / §4.14): `Copy`, `Move` (rename),
//! and `Sync` across one or two backends, built entirely on the common
//! [`crate::backend::Backend`] operation set.
//!
//! Grounded in the teacher's `copy_tree`: walk the source, handle one entry
//! at a time, log and skip a failing entry rather than aborting the whole
//! transfer. Generalized from "one local tree to one local tree" to
//! "any two backends", with the same-backend fast path spec.md §4.14 adds on
//! top (a local-only copy has no other path to take).

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::backend::{Backend, OpenMode, OpenOptions, ProgressFn};
use crate::error::{ErrorKind, PathError, Result};
use crate::path::{Path, LOCAL_SCHEME};
use crate::registry::Registry;
use crate::stat::StatResult;

const STREAM_BUFFER_SIZE: usize = 16 * 1024;

/// Create `path`'s parent directory if it doesn't already exist
/// (`parents=True`, per spec.md §4.14).
fn ensure_parent(backend: &dyn Backend, path: &Path) -> Result<()> {
    let parent = path.parent();
    if parent.without_protocol().is_empty() {
        return Ok(());
    }
    if backend.exists(&parent)? {
        return Ok(());
    }
    backend.mkdir(&parent, true, true)
}

/// Shovel `src` to `dst` through a fixed 16 KiB buffer, for the
/// cross-backend case where no server-side operation applies.
fn stream_copy(
    src_backend: &dyn Backend,
    src: &Path,
    dst_backend: &dyn Backend,
    dst: &Path,
    overwrite: bool,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> Result<()> {
    if !overwrite && dst_backend.exists(dst)? {
        return Err(PathError::new(ErrorKind::AlreadyExists, dst.with_protocol()));
    }
    ensure_parent(dst_backend, dst)?;
    let mut reader = src_backend.open(src, OpenMode::Read, &OpenOptions::default())?.into_read()?;
    let mut writer = dst_backend.open(dst, OpenMode::Write, &OpenOptions::default())?.into_write()?;
    let mut buf = [0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).map_err(|e| PathError::from_io(e, src.with_protocol()))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(|e| PathError::from_io(e, dst.with_protocol()))?;
        if let Some(cb) = progress.as_mut() {
            cb(n as u64);
        }
    }
    reader.close()?;
    writer.close()
}

/// `Copy(dst, callback, followLinks, overwrite)`: server-side when
/// `src`/`dst` share a backend identity, else [`stream_copy`].
pub fn copy(
    registry: &Registry,
    src: &Path,
    dst: &Path,
    follow_links: bool,
    overwrite: bool,
    progress: Option<&mut ProgressFn<'_>>,
) -> Result<()> {
    let (src, src_backend) = registry.resolve(src)?;
    let (dst, dst_backend) = registry.resolve(dst)?;
    if src.same_backend(&dst) {
        ensure_parent(dst_backend.as_ref(), &dst)?;
        return src_backend.copy(&src, &dst, follow_links, overwrite, progress);
    }
    debug!(%src, %dst, "cross-backend copy, streaming");
    stream_copy(src_backend.as_ref(), &src, dst_backend.as_ref(), &dst, overwrite, progress)
}

/// `Rename(dst, overwrite)` / `Move`: native rename same-backend, otherwise
/// stream-copy then remove the source.
pub fn rename(registry: &Registry, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
    let (src, src_backend) = registry.resolve(src)?;
    let (dst, dst_backend) = registry.resolve(dst)?;
    if src.same_backend(&dst) {
        ensure_parent(dst_backend.as_ref(), &dst)?;
        return src_backend.rename(&src, &dst, overwrite);
    }
    debug!(%src, %dst, "cross-backend move, streaming then removing source");
    stream_copy(src_backend.as_ref(), &src, dst_backend.as_ref(), &dst, overwrite, None)?;
    src_backend.remove(&src, false)
}

/// Whether a sync of `src_stat` onto an existing `dst_stat` can be skipped,
/// per spec.md §4.14's `IsSame` predicate. `dst_is_download` is true when
/// the destination is local and the source is not (a download); otherwise
/// the upload/local-to-local time test applies.
fn skip_sync(src_stat: &StatResult, dst_stat: &StatResult, dst_is_download: bool) -> bool {
    if src_stat.size != dst_stat.size {
        return false;
    }
    if dst_is_download {
        dst_stat.mtime <= src_stat.mtime
    } else {
        dst_stat.mtime >= src_stat.mtime
    }
}

/// Rewrites an entry's full URI, found under `src_root`, onto the
/// corresponding path under `dst_root`.
fn rebase(entry_uri: &str, src_root: &Path, dst_root: &Path) -> Path {
    let entry_path = Path::parse(entry_uri);
    let rel = entry_path
        .without_protocol()
        .strip_prefix(src_root.without_protocol())
        .unwrap_or_else(|| entry_path.without_protocol())
        .trim_start_matches('/');
    dst_root.join(rel)
}

/// `Sync(dst, followLinks, force, overwrite)`: recursive, skip-when-same.
/// Each entry failure is logged and skipped rather than aborting the whole
/// walk, matching the teacher's `copy_tree`.
pub fn sync(registry: &Registry, src: &Path, dst: &Path, follow_links: bool, force: bool, overwrite: bool) -> Result<()> {
    let (src, src_backend) = registry.resolve(src)?;
    let (dst, dst_backend) = registry.resolve(dst)?;
    let dst_is_download = dst.scheme() == LOCAL_SCHEME && src.scheme() != LOCAL_SCHEME;
    let same_backend = src.same_backend(&dst);

    for entry in src_backend.scan_stat(&src, false, follow_links)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "sync: skipping unreadable source entry");
                continue;
            }
        };
        let entry_path = Path::parse(&entry.path);
        let dest_path = rebase(&entry.path, &src, &dst);

        if !force {
            if let Ok(dst_stat) = dst_backend.stat(&dest_path, true) {
                if skip_sync(&entry.stat, &dst_stat, dst_is_download) {
                    continue;
                }
            }
        }

        let result = if same_backend {
            ensure_parent(dst_backend.as_ref(), &dest_path).and_then(|_| src_backend.copy(&entry_path, &dest_path, follow_links, true, None))
        } else {
            stream_copy(src_backend.as_ref(), &entry_path, dst_backend.as_ref(), &dest_path, true, None)
        };
        if let Err(e) = result {
            warn!(error = %e, dest = %dest_path, "sync: failed to copy entry");
        }
    }
    let _ = overwrite; // overwrite is always forced true within sync, per the skip predicate above
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(size: i64, mtime: f64) -> StatResult {
        StatResult::file(size, mtime)
    }

    #[test]
    fn differing_size_is_never_same() {
        assert!(!skip_sync(&stat(10, 5.0), &stat(20, 5.0), false));
    }

    #[test]
    fn upload_skips_when_dest_not_older() {
        assert!(skip_sync(&stat(10, 5.0), &stat(10, 5.0), false));
        assert!(skip_sync(&stat(10, 5.0), &stat(10, 6.0), false));
        assert!(!skip_sync(&stat(10, 5.0), &stat(10, 4.0), false));
    }

    #[test]
    fn download_skips_when_dest_not_newer() {
        assert!(skip_sync(&stat(10, 5.0), &stat(10, 5.0), true));
        assert!(skip_sync(&stat(10, 5.0), &stat(10, 4.0), true));
        assert!(!skip_sync(&stat(10, 5.0), &stat(10, 6.0), true));
    }

    #[test]
    fn rebase_rewrites_onto_destination_root() {
        let src = Path::parse("s3://bucket/a");
        let dst = Path::parse("file:///tmp/out");
        let dest = rebase("s3://bucket/a/b/c.txt", &src, &dst);
        assert_eq!(dest.with_protocol(), "file:///tmp/out/b/c.txt");
    }
}
