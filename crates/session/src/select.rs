// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job selector parsing.
//!
//! A selector is the user-facing way to name jobs:
//!   `123`            one job by id
//!   `a/b/123`        one job by id, anchored at a folder (the id decides)
//!   `a/b/*`          all direct jobs of the folders matching `a/b`
//!   `a/b/5..17`      jobs of folder `a/b` with ids in [5, 17]
//!   `a/b`            a folder path; selects its whole subtree, but only
//!                    when the recursive flag is given

use crate::session::SessionError;

/// Last path segment interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tail {
    Id(i64),
    All,
    Range(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selector {
    /// A bare decimal id.
    Id(i64),
    /// `head/<tail>` with a job-shaped tail.
    Path { head: String, tail: Tail },
    /// Anything else: a folder path, meaningful only with `recursive`.
    Folder(String),
}

fn all_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Split at the last `/`. A lone leading slash stays in the head so that
/// absolute selectors resolve from the root (`/a` splits into `/` + `a`).
pub(crate) fn split_head_tail(spec: &str) -> (String, &str) {
    match spec.rsplit_once('/') {
        Some(("", tail)) => ("/".to_string(), tail),
        Some((head, tail)) => (head.to_string(), tail),
        None => (String::new(), spec),
    }
}

fn parse_range(tail: &str) -> Option<Result<Tail, SessionError>> {
    let (lo, hi) = tail.split_once("..")?;
    if !all_digits(lo) || !all_digits(hi) {
        return None;
    }
    let (Ok(lo), Ok(hi)) = (lo.parse::<i64>(), hi.parse::<i64>()) else {
        return None;
    };
    if lo > hi {
        return Some(Err(SessionError::InvalidSelector(format!(
            "illegal job range: {tail}"
        ))));
    }
    Some(Ok(Tail::Range(lo, hi)))
}

/// Parse a selector string. Shapes that are only valid recursively still
/// parse (as [`Selector::Folder`]); resolution decides whether they are
/// acceptable.
pub(crate) fn parse(spec: &str) -> Result<Selector, SessionError> {
    if all_digits(spec) {
        return spec
            .parse()
            .map(Selector::Id)
            .map_err(|_| SessionError::InvalidSelector(format!("job id out of range: {spec}")));
    }

    let (head, tail) = split_head_tail(spec);

    if all_digits(tail) {
        let id = tail
            .parse()
            .map_err(|_| SessionError::InvalidSelector(format!("job id out of range: {tail}")))?;
        return Ok(Selector::Path {
            head,
            tail: Tail::Id(id),
        });
    }
    if tail.contains('*') {
        return Ok(Selector::Path {
            head,
            tail: Tail::All,
        });
    }
    if let Some(range) = parse_range(tail) {
        return Ok(Selector::Path { head, tail: range? });
    }
    Ok(Selector::Folder(spec.to_string()))
}

/// Shell-style matching for folder globs: the last segment of a folder
/// pattern may contain `*`/`?`.
pub(crate) fn glob_matcher(pattern: &str) -> Result<globset::GlobMatcher, SessionError> {
    globset::Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| SessionError::InvalidSelector(format!("bad glob {pattern:?}: {e}")))
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
