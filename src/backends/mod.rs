// Copyright 2026 The pathkit authors.

//! Concrete [`crate::backend::Backend`] implementations, one module per
//! storage system (spec.md C5–C16).

pub mod local;
pub mod stdio;

#[cfg(feature = "s3")]
pub mod s3;

#[cfg(feature = "hdfs")]
pub mod hdfs;

#[cfg(feature = "sftp")]
pub mod sftp;

#[cfg(feature = "webdav")]
pub mod webdav;
