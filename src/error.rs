// Copyright 2026 The pathkit authors.

//! Error taxonomy shared by every backend.
//!
//! Every operation on a [`crate::backend::Backend`] returns [`Result<T>`], whose
//! error carries a classification ([`ErrorKind`]) plus the path that was being
//! operated on, so that messages can always read like
//! `"No such file: 's3://bucket/key'"`.

use std::fmt;
use std::io;

use thiserror::Error;

/// Classification of a failure, independent of which backend produced it.
///
/// This is deliberately not one variant per backend error code: callers that
/// want to e.g. suppress "not found" need one predicate that works the same
/// way against local, S3, SFTP, HDFS and WebDAV.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Object or prefix absent.
    NotFound,
    /// Target exists and the caller's policy forbids overwriting it.
    AlreadyExists,
    /// Expected a directory, found a file.
    NotADirectory,
    /// Expected a file, found a directory.
    IsADirectory,
    PermissionDenied,
    /// Operation not applicable to this backend or this path.
    Unsupported,
    /// Copy source and destination are the same object.
    SameFile,
    ProtocolNotFound,
    ProtocolAlreadyExists,
    /// Transient network/IO error; eligible for retry.
    Transport,
    /// Checksum mismatch between what was written and what was read back.
    Integrity,
    /// Required credentials or endpoint missing.
    Config,
    /// Fallback bucket for anything not classified above.
    Unknown,
}

impl ErrorKind {
    /// Whether the retry layer (§4.15 / [`crate::retry`]) should attempt this
    /// operation again.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::IsADirectory => "is a directory",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Unsupported => "unsupported operation",
            ErrorKind::SameFile => "source and destination are the same file",
            ErrorKind::ProtocolNotFound => "protocol not found",
            ErrorKind::ProtocolAlreadyExists => "protocol already registered",
            ErrorKind::Transport => "transport error",
            ErrorKind::Integrity => "integrity check failed",
            ErrorKind::Config => "configuration error",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// An error produced by a backend operation.
///
/// Mirrors the split the teacher's transport layer uses between `ErrorKind`
/// (what happened) and a wrapping struct that additionally carries the path
/// and the original cause.
#[derive(Debug, Error)]
#[error("{kind}: '{path}'{source_suffix}", source_suffix = self.source_suffix())]
pub struct PathError {
    pub kind: ErrorKind,
    pub path: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PathError {
    pub fn new(kind: ErrorKind, path: impl Into<String>) -> Self {
        PathError {
            kind,
            path: path.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PathError {
            kind,
            path: path.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, path)
    }

    pub fn unsupported(path: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, path)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Build a [`PathError`] from a [`std::io::Error`], classifying its kind.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => ErrorKind::Transport,
            _ => ErrorKind::Unknown,
        };
        PathError {
            kind,
            path: path.into(),
            source: Some(Box::new(err)),
        }
    }

    fn source_suffix(&self) -> String {
        match &self.source {
            Some(s) => format!(" ({s})"),
            None => String::new(),
        }
    }
}

/// `missing_ok=true` suppresses a [`ErrorKind::NotFound`] error, per §7.
pub fn suppress_not_found(result: Result<()>, missing_ok: bool) -> Result<()> {
    match result {
        Err(e) if missing_ok && e.is_not_found() => Ok(()),
        other => other,
    }
}

pub type Result<T> = std::result::Result<T, PathError>;
