// Copyright 2026 The pathkit authors.

//! Shell-glob pattern -> regular-expression translation (spec.md §4.13
//! steps 2-3), ported from the reference implementation's `_translate`.
//!
//! Brace groups are expanded before a pattern ever reaches this module (see
//! [`super::brace`]), so unlike the reference this never special-cases `{`.

use regex::Regex;

use crate::error::{ErrorKind, PathError, Result};

/// True if `s` contains an unescaped `*`, `?`, `[` or `{` — i.e. it needs
/// glob matching rather than a plain existence check (spec.md §4.13 step 2).
/// There is no escape syntax (matching the reference implementation: "There
/// is no way to quote meta-characters").
pub fn has_magic(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Translate one brace-free shell-glob pattern into a regex source string.
///
/// `*` matches any run of non-`/` characters, `**` matches across `/`
/// (including nothing), `?` matches exactly one non-`/` character, `[seq]`
/// / `[!seq]` are POSIX-style character classes, and a `**` segment
/// surrounded by slashes additionally matches *zero* intervening
/// directories (`a/**/b` matches `a/b` as well as `a/x/y/b`).
pub fn translate(pat: &str) -> String {
    let chars: Vec<char> = pat.chars().collect();
    let n = chars.len();
    let mut i = 0;
    let mut buf = String::new();
    while i < n {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                let mut j = i;
                while j < n && chars[j] == '*' {
                    j += 1;
                }
                if j > i {
                    let followed_by_slash = j < n && chars[j] == '/';
                    let preceded_by_slash = i <= 1 || chars[i - 2] == '/';
                    if followed_by_slash && preceded_by_slash {
                        // hit /**/ instead of /seq**/
                        j += 1;
                        buf.push_str("(.*/)?");
                    } else {
                        buf.push_str(".*");
                    }
                } else {
                    buf.push_str("[^/]*");
                }
                i = j;
            }
            '?' => buf.push('.'),
            '[' => {
                let mut j = i;
                if j < n && chars[j] == '!' {
                    j += 1;
                }
                if j < n && chars[j] == ']' {
                    j += 1;
                }
                while j < n && chars[j] != ']' {
                    j += 1;
                }
                if j >= n {
                    buf.push_str("\\[");
                } else {
                    let stuff: String = chars[i..j].iter().collect::<String>().replace('\\', "\\\\");
                    i = j + 1;
                    let stuff = if let Some(rest) = stuff.strip_prefix('!') {
                        format!("^{rest}")
                    } else if stuff.starts_with('^') {
                        format!("\\{stuff}")
                    } else {
                        stuff
                    };
                    buf.push('[');
                    buf.push_str(&stuff);
                    buf.push(']');
                }
            }
            other => buf.push_str(&regex::escape(&other.to_string())),
        }
    }
    buf
}

/// A compiled, fully-anchored matcher for one brace-free glob pattern.
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(pat: &str) -> Result<Pattern> {
        let source = format!("\\A(?s:{})\\z", translate(pat));
        Regex::new(&source)
            .map(|regex| Pattern { regex })
            .map_err(|e| PathError::with_source(ErrorKind::Unknown, pat, e))
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pat: &str, name: &str) -> bool {
        Pattern::new(pat).unwrap().is_match(name)
    }

    #[test]
    fn star_does_not_cross_slash() {
        assert!(matches("*.json", "a.json"));
        assert!(!matches("*.json", "a/b.json"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(matches("a?c", "abc"));
        assert!(!matches("a?c", "ac"));
        assert!(!matches("a?c", "abbc"));
    }

    #[test]
    fn bracket_class_and_negation() {
        assert!(matches("[abc].txt", "b.txt"));
        assert!(!matches("[abc].txt", "d.txt"));
        assert!(matches("[!abc].txt", "d.txt"));
        assert!(!matches("[!abc].txt", "a.txt"));
    }

    #[test]
    fn bare_doublestar_matches_across_slashes() {
        assert!(matches("**", "a/b/c"));
        assert!(matches("**/*.json", "a/b/c.json"));
    }

    #[test]
    fn slash_doublestar_slash_matches_zero_directories() {
        let p = Pattern::new("a/**/b").unwrap();
        assert!(p.is_match("a/b"));
        assert!(p.is_match("a/x/y/b"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "aXb"));
    }
}
