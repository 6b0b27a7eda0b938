// Copyright 2026 The pathkit authors.

//! The glob engine (spec.md C2 / §4.13): pattern string -> sequence of
//! concrete paths, driven entirely through the [`vfs::Vfs`] trait so the
//! same matching, ordering and hidden-file rules serve every backend.
//!
//! The directory-walking algorithm (`iglob`/`glob0`/`glob1`/`glob2` below)
//! is ported from the reference implementation's recursive generator of the
//! same names; [`pattern::translate`] ports its pattern-to-regex compiler.
//! Unlike the reference, brace groups are expanded (see [`brace`]) and
//! bucket/authority grouping happens before any single-backend pattern ever
//! reaches the walker, so the walker itself only ever sees one backend's
//! path space.

pub mod brace;
pub mod pattern;
pub mod vfs;

use crate::error::{PathError, Result};
use vfs::Vfs;

fn split(pattern: &str) -> (&str, &str) {
    match pattern.rfind('/') {
        Some(idx) => (&pattern[..idx], &pattern[idx + 1..]),
        None => ("", pattern),
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_recursive_segment(segment: &str) -> bool {
    segment == "**"
}

/// Join a directory and a child name the way `os.path.join` does: an empty
/// `name` still appends a trailing separator, marking `dirname` itself as
/// the result (used for "`**` alone includes the starting directory").
fn join(dirname: &str, name: &str) -> String {
    let dirname = dirname.trim_end_matches('/');
    if dirname.is_empty() {
        name.to_owned()
    } else if name.is_empty() {
        format!("{dirname}/")
    } else {
        format!("{dirname}/{name}")
    }
}

/// Glob a single brace-free, single-backend pattern (no `scheme://`, no
/// authority) against `vfs`. Results are in ascending-codepoint,
/// depth-first order (spec.md §4.13 step 5).
pub fn glob_one(vfs: &dyn Vfs, pattern: &str, recursive: bool) -> Result<Vec<String>> {
    let mut results = iglob(vfs, pattern, recursive, false)?;
    // A pattern that is *exactly* "**" yields the (meaningless, empty)
    // starting-directory marker as its first result; every other use of
    // "**" joins that marker onto a real dirname instead (see `iglob`).
    if recursive && pattern == "**" && results.first().map(String::is_empty).unwrap_or(false) {
        results.remove(0);
    }
    Ok(results)
}

fn iglob(vfs: &dyn Vfs, pathname: &str, recursive: bool, dironly: bool) -> Result<Vec<String>> {
    let (dirname, basename) = split(pathname);
    if !pattern::has_magic(pathname) {
        return Ok(if !basename.is_empty() {
            if vfs.exists(pathname) {
                vec![pathname.to_owned()]
            } else {
                vec![]
            }
        } else if vfs.is_dir(dirname) {
            // Patterns ending in '/' match only directories (spec.md §4.13
            // "special case").
            vec![pathname.to_owned()]
        } else {
            vec![]
        });
    }
    if dirname.is_empty() {
        return if recursive && is_recursive_segment(basename) {
            glob2(vfs, dirname, dironly)
        } else {
            glob1(vfs, dirname, basename, dironly)
        };
    }
    let dirs: Vec<String> = if dirname != pathname && pattern::has_magic(dirname) {
        iglob(vfs, dirname, recursive, true)?
    } else if vfs.exists(dirname) {
        vec![dirname.to_owned()]
    } else {
        vec![]
    };
    let mut out = Vec::new();
    for d in dirs {
        let names = if pattern::has_magic(basename) {
            if recursive && is_recursive_segment(basename) {
                glob2(vfs, &d, dironly)?
            } else {
                glob1(vfs, &d, basename, dironly)?
            }
        } else {
            glob0(vfs, &d, basename)
        };
        out.extend(names.into_iter().map(|name| join(&d, &name)));
    }
    Ok(out)
}

/// Non-recursive match of `pattern_str` against `dirname`'s children.
fn glob1(vfs: &dyn Vfs, dirname: &str, pattern_str: &str, dironly: bool) -> Result<Vec<String>> {
    let names = iterdir(vfs, dirname, dironly);
    let matcher = pattern::Pattern::new(pattern_str)?;
    Ok(names
        .into_iter()
        .filter(|n| is_hidden(pattern_str) || !is_hidden(n))
        .filter(|n| matcher.is_match(n))
        .collect())
}

/// A literal (non-magic) basename: confirm it exists (or, if empty, that
/// `dirname` is a directory) rather than matching a pattern.
fn glob0(vfs: &dyn Vfs, dirname: &str, basename: &str) -> Vec<String> {
    let trimmed = dirname.trim_end_matches('/');
    if basename.is_empty() {
        if vfs.is_dir(trimmed) {
            vec![basename.to_owned()]
        } else {
            vec![]
        }
    } else if vfs.exists(&join(trimmed, basename)) {
        vec![basename.to_owned()]
    } else {
        vec![]
    }
}

/// `**`: the starting directory itself (as an empty-name marker) plus every
/// descendant, recursively, hidden entries excluded (spec.md §4.13 special
/// case).
fn glob2(vfs: &dyn Vfs, dirname: &str, dironly: bool) -> Result<Vec<String>> {
    let mut out = vec![String::new()];
    out.extend(rlistdir(vfs, dirname, dironly));
    Ok(out)
}

fn iterdir(vfs: &dyn Vfs, dirname: &str, dironly: bool) -> Vec<String> {
    let dirname = dirname.trim_end_matches('/');
    match vfs.scandir(dirname) {
        Ok(entries) => entries
            .into_iter()
            .filter(|(_, isdir)| !dironly || *isdir)
            .map(|(name, _)| name)
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn rlistdir(vfs: &dyn Vfs, dirname: &str, dironly: bool) -> Vec<String> {
    let mut out = Vec::new();
    for name in iterdir(vfs, dirname, dironly) {
        if is_hidden(&name) {
            continue;
        }
        out.push(name.clone());
        let path = join(dirname, &name);
        for y in rlistdir(vfs, &path, dironly) {
            out.push(join(&name, &y));
        }
    }
    out
}

/// Entry point: `pattern` is a full `scheme://authority/rest` URI pattern,
/// possibly with brace groups spanning the authority itself (spec.md §8
/// scenario 6, `s3://{bucketA,bucketB}/1/a`).
///
/// `open_vfs(scheme, authority)` builds (or, via
/// [`crate::concurrency::ClientCache`], reuses) the backend-bound [`Vfs`]
/// for one concrete authority. A pattern whose bucket/authority segment
/// itself contains a wildcard (as opposed to a brace group) is rejected:
/// matching across an unbounded set of buckets isn't something any backend
/// here can enumerate cheaply, so spec.md §9's open question on this is
/// resolved as "unsupported" (see DESIGN.md).
pub fn glob(
    pattern: &str,
    mut open_vfs: impl FnMut(&str, &str) -> Result<Box<dyn Vfs>>,
    recursive: bool,
    missing_ok: bool,
) -> Result<Vec<String>> {
    let mut matches: Vec<(String, String, String)> = Vec::new();
    for expanded in brace::expand(pattern) {
        let (scheme, rest) = expanded
            .split_once("://")
            .unwrap_or(("file", expanded.as_str()));
        let mut parts = rest.splitn(2, '/');
        let authority = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");
        if pattern::has_magic(authority) {
            return Err(PathError::unsupported(format!(
                "{scheme}://{authority}/{remainder}"
            )));
        }
        let vfs = open_vfs(scheme, authority)?;
        for m in glob_one(vfs.as_ref(), remainder, recursive)? {
            matches.push((scheme.to_owned(), authority.to_owned(), m));
        }
    }
    matches.sort();
    if matches.is_empty() && !missing_ok {
        return Err(PathError::not_found(pattern));
    }
    Ok(matches
        .into_iter()
        .map(|(scheme, authority, p)| {
            if p.is_empty() {
                format!("{scheme}://{authority}")
            } else {
                format!("{scheme}://{authority}/{p}")
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// An in-memory [`Vfs`] seeded with a fixed set of file paths; every
    /// ancestor directory is derived automatically.
    struct MockVfs {
        files: BTreeSet<String>,
        dirs: BTreeSet<String>,
    }

    impl MockVfs {
        fn new(files: &[&str]) -> Self {
            let files: BTreeSet<String> = files.iter().map(|s| s.to_string()).collect();
            let mut dirs = BTreeSet::new();
            for f in &files {
                let mut p = f.as_str();
                while let Some(idx) = p.rfind('/') {
                    p = &p[..idx];
                    dirs.insert(p.to_string());
                }
            }
            MockVfs { files, dirs }
        }
    }

    impl Vfs for MockVfs {
        fn exists(&self, path: &str) -> bool {
            path.is_empty() || self.files.contains(path) || self.dirs.contains(path)
        }

        fn is_dir(&self, path: &str) -> bool {
            path.is_empty() || self.dirs.contains(path)
        }

        fn scandir(&self, dir: &str) -> Result<Vec<(String, bool)>> {
            let prefix = if dir.is_empty() {
                String::new()
            } else {
                format!("{dir}/")
            };
            let mut names: BTreeSet<(String, bool)> = BTreeSet::new();
            for f in self.files.iter().chain(self.dirs.iter()) {
                if let Some(rest) = f.strip_prefix(prefix.as_str()) {
                    if !rest.is_empty() {
                        let name = rest.split('/').next().unwrap().to_string();
                        let full = if dir.is_empty() {
                            name.clone()
                        } else {
                            format!("{dir}/{name}")
                        };
                        names.insert((name, self.dirs.contains(&full)));
                    }
                }
            }
            Ok(names.into_iter().collect())
        }
    }

    #[test]
    fn scenario_star_a_doublestar_json() {
        // spec.md §8 scenario 3, minus the bucket prefix (single-backend).
        let vfs = MockVfs::new(&["1/a", "1/a/b/c/1.json", "1/a/b/c/A.msg", "2/a/d/2.json"]);
        let mut result = glob_one(&vfs, "*/a/**/*.json", true).unwrap();
        result.sort();
        assert_eq!(
            result,
            vec!["1/a/b/c/1.json".to_string(), "2/a/d/2.json".to_string()],
        );
    }

    #[test]
    fn hidden_files_excluded_from_star() {
        let vfs = MockVfs::new(&["a/.secret", "a/visible.txt"]);
        let result = glob_one(&vfs, "a/*", false).unwrap();
        assert_eq!(result, vec!["a/visible.txt".to_string()]);
    }

    #[test]
    fn explicit_leading_dot_matches_hidden() {
        let vfs = MockVfs::new(&["a/.secret"]);
        let result = glob_one(&vfs, "a/.*", false).unwrap();
        assert_eq!(result, vec!["a/.secret".to_string()]);
    }

    #[test]
    fn trailing_slash_matches_directories_only() {
        let vfs = MockVfs::new(&["a/file.txt", "a/sub/inner.txt"]);
        let result = glob_one(&vfs, "a/*/", false).unwrap();
        assert_eq!(result, vec!["a/sub/".to_string()]);
    }

    #[test]
    fn missing_ok_false_with_zero_results_is_not_found() {
        let err = glob(
            "s3://bucket/nope/*.json",
            |_scheme, _authority| Ok(Box::new(MockVfs::new(&["a/file.txt"])) as Box<dyn Vfs>),
            true,
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn brace_expansion_across_buckets_sorted_bucket_then_path() {
        let result = glob(
            "s3://{bucketB,bucketA}/1/a",
            |_scheme, authority| {
                Ok(Box::new(MockVfs::new(match authority {
                    "bucketA" => &["1/a"],
                    "bucketB" => &["1/a"],
                    _ => &[],
                })) as Box<dyn Vfs>)
            },
            false,
            false,
        )
        .unwrap();
        assert_eq!(result, vec!["s3://bucketA/1/a", "s3://bucketB/1/a"]);
    }

    #[test]
    fn wildcard_bucket_is_unsupported() {
        let err = glob(
            "s3://bucket-*/1/a",
            |_scheme, _authority| Ok(Box::new(MockVfs::new(&[])) as Box<dyn Vfs>),
            false,
            true,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Unsupported);
    }
}
