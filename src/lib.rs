// Copyright 2026 The pathkit authors.

//! A unified path abstraction over heterogeneous storage backends: local
//! filesystem, S3, HDFS, SFTP, WebDAV and stdio, addressed through one
//! `scheme://authority/rest` URI space (spec.md §1).
//!
//! The crate has three layers: URI dispatch ([`path`], [`alias`],
//! [`registry`]) picks a [`backend::Backend`] for a path; each backend
//! implements the same operation set over its own transport; [`transfer`]
//! orchestrates multi-object copy/move/sync across backends using only that
//! common operation set.
//!
//! This crate never initializes a global `tracing` subscriber itself —
//! callers (the `pathkit-demo` binary, or an embedding application) own that
//! choice, per the usual library/binary split.

pub mod alias;
pub mod backend;
pub mod backends;
pub mod concurrency;
pub mod config;
pub mod entry;
pub mod error;
pub mod glob;
pub mod kind;
pub mod path;
pub mod registry;
pub mod retry;
pub mod stat;
pub mod transfer;

pub use backend::Backend;
pub use error::{ErrorKind, PathError, Result};
pub use path::Path;
pub use registry::Registry;

use std::sync::Arc;
use std::sync::OnceLock;

/// Build a [`Registry`] with every backend this build was compiled with
/// registered under its scheme, per the feature flags in `Cargo.toml`.
pub fn default_registry() -> Registry {
    let registry = Registry::new();
    registry
        .register(Arc::new(backends::local::LocalFactory), false)
        .expect("file scheme registered twice");
    registry
        .register(Arc::new(backends::stdio::StdioFactory), false)
        .expect("stdio scheme registered twice");
    #[cfg(feature = "s3")]
    {
        registry
            .register(Arc::new(backends::s3::S3Factory::default()), false)
            .expect("s3 scheme registered twice");
    }
    #[cfg(feature = "hdfs")]
    {
        registry
            .register(Arc::new(backends::hdfs::HdfsFactory::default()), false)
            .expect("hdfs scheme registered twice");
    }
    #[cfg(feature = "sftp")]
    {
        registry
            .register(Arc::new(backends::sftp::SftpFactory::default()), false)
            .expect("sftp scheme registered twice");
    }
    #[cfg(feature = "webdav")]
    {
        registry
            .register(Arc::new(backends::webdav::WebDavFactory::default()), false)
            .expect("webdav scheme registered twice");
    }
    registry
}

/// Process-wide default registry, built lazily on first use.
///
/// Most callers that don't need a custom alias table or a test-local
/// registry should go through this rather than building their own.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(default_registry)
}

/// Glob `pattern` (spec.md C2) against every backend `registry` knows how to
/// open, one [`glob::vfs::BackendVfs`] per distinct authority the pattern
/// touches (a brace group may span more than one).
pub fn glob_in(registry: &Registry, pattern: &str, recursive: bool, missing_ok: bool) -> Result<Vec<Path>> {
    let matches = glob::glob(
        pattern,
        |scheme, authority| {
            let (_, backend) = registry.resolve(&Path::new(scheme, authority))?;
            Ok(Box::new(glob::vfs::BackendVfs::new(backend, scheme, authority)) as Box<dyn glob::vfs::Vfs>)
        },
        recursive,
        missing_ok,
    )?;
    Ok(matches.iter().map(|s| Path::parse(s)).collect())
}

/// [`glob_in`] against the process-wide default [`registry`].
pub fn glob(pattern: &str, recursive: bool, missing_ok: bool) -> Result<Vec<Path>> {
    glob_in(registry(), pattern, recursive, missing_ok)
}
