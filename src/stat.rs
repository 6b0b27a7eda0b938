// Copyright 2026 The pathkit authors.

//! Canonical metadata record returned by [`crate::backend::Backend::stat`].

use std::collections::HashMap;

/// Backend-native metadata that doesn't fit the common [`StatResult`] fields:
/// an S3 ETag, a SFTP/local permission mode, a WebHDFS block size, and so on.
///
/// Stored as a small string map rather than an enum per backend so that
/// generic callers (the glob engine, the transfer orchestrator) never need to
/// match on backend identity to read a [`StatResult`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extra(pub HashMap<String, ExtraValue>);

#[derive(Clone, Debug, PartialEq)]
pub enum ExtraValue {
    Str(String),
    Int(i64),
}

impl Extra {
    pub fn empty() -> Self {
        Extra(HashMap::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<ExtraValue>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ExtraValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(ExtraValue::Int(i)) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for ExtraValue {
    fn from(s: &str) -> Self {
        ExtraValue::Str(s.to_owned())
    }
}

impl From<String> for ExtraValue {
    fn from(s: String) -> Self {
        ExtraValue::Str(s)
    }
}

impl From<i64> for ExtraValue {
    fn from(i: i64) -> Self {
        ExtraValue::Int(i)
    }
}

/// Immutable metadata record, as specified in spec.md §3.
#[derive(Clone, Debug, PartialEq)]
pub struct StatResult {
    pub size: i64,
    /// Unix seconds, possibly fractional.
    pub mtime: f64,
    pub ctime: f64,
    pub isdir: bool,
    pub islnk: bool,
    pub extra: Extra,
}

impl StatResult {
    pub fn file(size: i64, mtime: f64) -> Self {
        StatResult {
            size,
            mtime,
            ctime: mtime,
            isdir: false,
            islnk: false,
            extra: Extra::empty(),
        }
    }

    pub fn dir(mtime: f64) -> Self {
        StatResult {
            size: 0,
            mtime,
            ctime: mtime,
            isdir: true,
            islnk: false,
            extra: Extra::empty(),
        }
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    /// `!isdir || islnk`: true for regular files and for symlinks (whatever
    /// they point to), matching the source definition exactly.
    pub fn is_file(&self) -> bool {
        !self.isdir || self.islnk
    }

    /// `isdir && !islnk`.
    pub fn is_dir(&self) -> bool {
        self.isdir && !self.islnk
    }

    pub fn is_symlink(&self) -> bool {
        self.islnk
    }

    /// Unix permission bits, from `extra["mode"]` when the backend recorded
    /// one, else a sensible default for the entry's kind.
    pub fn mode(&self) -> u32 {
        self.extra
            .get_int("mode")
            .map(|m| m as u32)
            .unwrap_or(if self.isdir { 0o40755 } else { 0o100644 })
    }

    pub fn ino(&self) -> u64 {
        self.extra.get_int("ino").map(|i| i as u64).unwrap_or(0)
    }

    pub fn nlink(&self) -> u64 {
        self.extra.get_int("nlink").map(|i| i as u64).unwrap_or(1)
    }

    pub fn uid(&self) -> u32 {
        self.extra.get_int("uid").map(|i| i as u32).unwrap_or(0)
    }

    pub fn gid(&self) -> u32 {
        self.extra.get_int("gid").map(|i| i as u32).unwrap_or(0)
    }

    /// ETag / checksum recorded by an object-storage backend, if any.
    pub fn etag(&self) -> Option<&str> {
        self.extra.get_str("etag")
    }
}
