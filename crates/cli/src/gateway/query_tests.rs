// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    no_query         = { "/connections", Some("new"), "/connections" },
    other_params     = { "/ask?mode=fast", Some("new"), "/ask?mode=fast" },
    replaced         = { "/connections?session_id=old", Some("new"), "/connections?session_id=new" },
    removed          = { "/connections?session_id=old", None, "/connections" },
    keeps_order      = { "/x?a=1&session_id=old&b=2", Some("new"), "/x?a=1&session_id=new&b=2" },
    removed_middle   = { "/x?a=1&session_id=old&b=2", None, "/x?a=1&b=2" },
    duplicates       = { "/x?session_id=a&session_id=b", Some("c"), "/x?session_id=c" },
    encodes_value    = { "/x?session_id=old", Some("a b&c"), "/x?session_id=a+b%26c" },
)]
fn rewrite(path: &str, session_id: Option<&str>, expected: &str) {
    assert_eq!(rewrite_session_param(path, session_id), expected);
}

#[yare::parameterized(
    plain     = { "/connections", &[("session_id", "s-1")], "/connections?session_id=s-1" },
    reserved  = { "/connections", &[("session_id", "a&b=c #1")], "/connections?session_id=a%26b%3Dc+%231" },
    appends   = { "/x?a=1", &[("b", "2")], "/x?a=1&b=2" },
    no_pairs  = { "/x", &[], "/x" },
)]
fn query_is_encoded(path: &str, pairs: &[(&str, &str)], expected: &str) {
    assert_eq!(with_query(path, pairs), expected);
}
