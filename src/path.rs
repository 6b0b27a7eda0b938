// Copyright 2026 The pathkit authors.

//! The URI dispatch layer (spec.md C1): parsing `scheme://authority/rest`
//! into an immutable [`Path`] value, independent of which backend will
//! eventually serve it.
//!
//! [`Path`] itself does no alias resolution or registry lookups; see
//! [`crate::registry::Registry::resolve`] for the dispatch step that turns a
//! raw [`Path`] into one bound to a concrete backend.

use std::fmt;

/// Default scheme used when a string has no `scheme://` prefix.
pub const LOCAL_SCHEME: &str = "file";

/// Scheme used for bare integer "paths", which address an already-open file
/// descriptor (spec.md §4.1).
pub const FD_SCHEME: &str = "fd";

/// An immutable `(scheme, remainder)` value, per spec.md §3.
///
/// `Path` equality is string equality on [`Path::with_protocol`] after
/// parsing; trailing slashes are preserved and significant (`foo/` != `foo`),
/// exactly as specified.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Path {
    scheme: String,
    /// Everything after `scheme://`: authority followed by `/`-separated
    /// path segments, exactly as given by the caller (no normalization).
    without_protocol: String,
}

impl Path {
    pub fn new(scheme: impl Into<String>, without_protocol: impl Into<String>) -> Self {
        Path {
            scheme: scheme.into(),
            without_protocol: without_protocol.into(),
        }
    }

    /// Parse `s` as `scheme://rest`, defaulting to [`LOCAL_SCHEME`] when
    /// there's no `://`, and to [`FD_SCHEME`] when `s` is a bare integer.
    pub fn parse(s: &str) -> Path {
        if let Ok(_fd) = s.parse::<i64>() {
            return Path::new(FD_SCHEME, s);
        }
        match s.split_once("://") {
            Some((scheme, rest)) => Path::new(scheme, rest),
            None => Path::new(LOCAL_SCHEME, s),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn without_protocol(&self) -> &str {
        &self.without_protocol
    }

    pub fn with_protocol(&self) -> String {
        format!("{}://{}", self.scheme, self.without_protocol)
    }

    /// `(authority, segment, segment, ...)`: the first path component is the
    /// authority (may be empty, e.g. for `file://`), the rest are ordinary
    /// path segments.
    pub fn parts(&self) -> Vec<&str> {
        self.without_protocol.split('/').collect()
    }

    /// First path component: the `bucket`, `host`, or (for local paths with
    /// no authority) empty string / first segment.
    pub fn authority(&self) -> &str {
        self.parts().first().copied().unwrap_or_default()
    }

    /// Parent path: this path with its last non-empty segment removed.
    ///
    /// `s3://bucket/a/b` -> `s3://bucket/a`; `s3://bucket/a/` -> `s3://bucket/a`
    /// (trailing slash is stripped first, then the last segment).
    pub fn parent(&self) -> Path {
        let trimmed = self.without_protocol.trim_end_matches('/');
        let parent = match trimmed.rfind('/') {
            Some(idx) => &trimmed[..idx],
            None => "",
        };
        Path::new(self.scheme.clone(), parent)
    }

    /// Final path segment, e.g. `s3://bucket/a/b.txt` -> `b.txt`.
    /// A trailing slash yields the last non-empty segment, so
    /// `s3://bucket/a/` -> `a`.
    pub fn name(&self) -> &str {
        let trimmed = self.without_protocol.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// Extension of [`Path::name`], including the leading dot, or `""` if
    /// there is none (or the name starts with a dot and has no other dot).
    pub fn suffix(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(0) => "", // dotfile with no further extension, e.g. ".bashrc"
            Some(idx) => &name[idx..],
            None => "",
        }
    }

    /// [`Path::name`] with [`Path::suffix`] removed.
    pub fn stem(&self) -> &str {
        let name = self.name();
        let suffix = self.suffix();
        &name[..name.len() - suffix.len()]
    }

    /// True if this path's remainder ends with `/`: a syntactic directory
    /// marker, independent of whether anything actually exists there.
    pub fn has_trailing_slash(&self) -> bool {
        self.without_protocol.ends_with('/') && self.without_protocol != "/"
    }

    /// Join a relative child segment onto this path, inserting exactly one
    /// `/` between them.
    pub fn join(&self, child: &str) -> Path {
        let mut rest = self.without_protocol.trim_end_matches('/').to_owned();
        if !child.is_empty() {
            if !rest.is_empty() {
                rest.push('/');
            }
            rest.push_str(child.trim_start_matches('/'));
        }
        Path::new(self.scheme.clone(), rest)
    }

    /// Same-backend test for transfer orchestration (§4.14): same scheme and
    /// same authority.
    pub fn same_backend(&self, other: &Path) -> bool {
        self.scheme == other.scheme && self.authority() == other.authority()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.with_protocol())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scheme_and_remainder() {
        let p = Path::parse("s3://bucket/a/b.txt");
        assert_eq!(p.scheme(), "s3");
        assert_eq!(p.without_protocol(), "bucket/a/b.txt");
        assert_eq!(p.with_protocol(), "s3://bucket/a/b.txt");
    }

    #[test]
    fn defaults_to_local_scheme() {
        let p = Path::parse("/tmp/foo");
        assert_eq!(p.scheme(), LOCAL_SCHEME);
        assert_eq!(p.without_protocol(), "/tmp/foo");
    }

    #[test]
    fn bare_integer_is_fd_scheme() {
        let p = Path::parse("3");
        assert_eq!(p.scheme(), FD_SCHEME);
    }

    #[test]
    fn name_parent_suffix_stem() {
        let p = Path::parse("s3://bucket/a/b/report.tar.gz");
        assert_eq!(p.name(), "report.tar.gz");
        assert_eq!(p.suffix(), ".gz");
        assert_eq!(p.stem(), "report.tar");
        assert_eq!(p.parent().with_protocol(), "s3://bucket/a/b");
    }

    #[test]
    fn dotfile_has_no_suffix() {
        let p = Path::parse("file://.bashrc");
        assert_eq!(p.suffix(), "");
        assert_eq!(p.stem(), ".bashrc");
    }

    #[test]
    fn trailing_slash_is_significant() {
        let a = Path::parse("s3://bucket/foo");
        let b = Path::parse("s3://bucket/foo/");
        assert_ne!(a, b);
        assert!(b.has_trailing_slash());
        assert!(!a.has_trailing_slash());
    }

    #[test]
    fn parent_of_trailing_slash_path() {
        let p = Path::parse("s3://bucket/a/");
        assert_eq!(p.name(), "a");
        assert_eq!(p.parent().with_protocol(), "s3://bucket");
    }

    #[test]
    fn join_inserts_single_slash() {
        let p = Path::parse("s3://bucket/a");
        assert_eq!(p.join("b").with_protocol(), "s3://bucket/a/b");
        assert_eq!(p.join("/b").with_protocol(), "s3://bucket/a/b");
    }

    #[test]
    fn same_backend_checks_scheme_and_authority() {
        let a = Path::parse("s3://bucket/a");
        let b = Path::parse("s3://bucket/b");
        let c = Path::parse("s3://other/b");
        assert!(a.same_backend(&b));
        assert!(!a.same_backend(&c));
    }
}
