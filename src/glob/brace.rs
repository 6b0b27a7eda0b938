// Copyright 2026 The pathkit authors.

//! Brace-group expansion (spec.md §4.13 step 1), ported from the reference
//! implementation's `ungloblize`: groups don't nest, and expansion proceeds
//! breadth-first so `{a,b}/{c,d}` yields `a/c, a/d, b/c, b/d` rather than an
//! arbitrary order.

use std::collections::VecDeque;

/// Expand every `{x,y,...}` group in `pattern` into the full set of
/// brace-free strings. A pattern with no `{` expands to itself. `}` always
/// closes the *nearest* `{`; nested groups (`{a,{b,c}}`) are not supported,
/// matching the reference implementation.
pub fn expand(pattern: &str) -> Vec<String> {
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(pattern.to_owned());
    let mut done = Vec::new();
    while let Some(current) = queue.pop_front() {
        match find_group(&current) {
            Some((start, end)) => {
                let prefix = &current[..start];
                let suffix = &current[end + 1..];
                for alt in current[start + 1..end].split(',') {
                    queue.push_back(format!("{prefix}{alt}{suffix}"));
                }
            }
            None => done.push(current),
        }
    }
    done
}

fn find_group(s: &str) -> Option<(usize, usize)> {
    let start = s.find('{')?;
    let end = s[start..].find('}')? + start;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_without_braces_is_unchanged() {
        assert_eq!(expand("s3://bucket/a/*.json"), vec!["s3://bucket/a/*.json"]);
    }

    #[test]
    fn single_group_expands_to_each_alternative() {
        assert_eq!(
            expand("s3://{bucketA,bucketB}/1/a"),
            vec!["s3://bucketA/1/a", "s3://bucketB/1/a"],
        );
    }

    #[test]
    fn two_groups_expand_to_cartesian_product_in_order() {
        assert_eq!(
            expand("{a,b}/{c,d}"),
            vec!["a/c", "a/d", "b/c", "b/d"],
        );
    }

    #[test]
    fn unterminated_group_is_left_literal() {
        assert_eq!(expand("a{b"), vec!["a{b"]);
    }
}
