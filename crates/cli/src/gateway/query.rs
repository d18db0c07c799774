// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::Url;

const SESSION_PARAM: &str = "session_id";

fn parse_path(path: &str) -> Option<Url> {
    Url::parse("http://kay.invalid").and_then(|base| base.join(path)).ok()
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_owned(),
    }
}

/// Append percent-encoded query `pairs` to `path`.
pub fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return path.to_owned();
    }
    let Some(mut url) = parse_path(path) else {
        return path.to_owned();
    };
    url.query_pairs_mut().extend_pairs(pairs);
    path_and_query(&url)
}

/// Point the `session_id` query parameter of `path` at `session_id`.
///
/// Paths without the parameter are returned unchanged. With `None` the
/// parameter is dropped, leaving the bearer token to identify the caller.
pub fn rewrite_session_param(path: &str, session_id: Option<&str>) -> String {
    let Some(mut url) = parse_path(path) else {
        return path.to_owned();
    };

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if !pairs.iter().any(|(k, _)| k == SESSION_PARAM) {
        return path.to_owned();
    }

    let mut replaced = false;
    let rewritten: Vec<(String, String)> = pairs
        .into_iter()
        .filter_map(|(k, v)| {
            if k != SESSION_PARAM {
                return Some((k, v));
            }
            if replaced {
                return None;
            }
            replaced = true;
            session_id.map(|id| (k, id.to_owned()))
        })
        .collect();

    url.set_query(None);
    if !rewritten.is_empty() {
        url.query_pairs_mut().extend_pairs(rewritten);
    }

    path_and_query(&url)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
