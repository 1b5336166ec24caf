// MVCSimple
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Compiled route patterns.

use super::Captures;
use regex::Regex;

/// Expands the shorthand constraint names into regular expressions.
fn expand_constraint(raw: &str) -> &str {
    match raw {
        "i" => r"\d+",
        "a" => r"[A-Za-z0-9]+",
        "c" => r"[A-Za-z0-9_-]+",
        "h" => r"[a-fA-F0-9]+",
        other => other,
    }
}

/// Splits `path` into its segments, ignoring leading and trailing slashes.
fn split(path: &str) -> Vec<&str> {
    let path = path.trim_matches('/');
    if path.is_empty() { vec![] } else { path.split('/').collect() }
}

/// A single segment of a pattern.
#[derive(Debug)]
enum Segment {
    /// Matches this exact text.
    Literal(String),

    /// Matches any non-empty text, optionally restricted by a constraint.
    Capture {
        /// Name under which the matched text is recorded.
        name: String,

        /// Anchored expression the text must match, if any.
        constraint: Option<Regex>,
    },
}

/// A route pattern ready to be matched against request paths.
#[derive(Debug)]
pub(super) struct Pattern {
    /// The segments of the pattern.
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles the `raw` pattern or returns the reason why it is malformed.
    pub(super) fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = vec![];
        for segment in split(raw) {
            let Some(inner) = segment.strip_prefix('{') else {
                if segment.contains(['{', '}']) {
                    return Err(format!("Captures must span a whole segment in '{}'", segment));
                }
                segments.push(Segment::Literal(segment.to_owned()));
                continue;
            };
            let Some(inner) = inner.strip_suffix('}') else {
                return Err(format!("Unterminated capture '{}'", segment));
            };

            let (name, constraint) = match inner.split_once(':') {
                Some((name, constraint)) => (name, Some(constraint)),
                None => (inner, None),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("Invalid capture name in '{}'", segment));
            }
            let duplicate = segments
                .iter()
                .any(|s| matches!(s, Segment::Capture { name: other, .. } if other == name));
            if duplicate {
                return Err(format!("Duplicate capture name '{}'", name));
            }

            let constraint = match constraint {
                None => None,
                Some("") => return Err(format!("Empty constraint in '{}'", segment)),
                Some(raw) => {
                    let re = format!("^(?:{})$", expand_constraint(raw));
                    let re = Regex::new(&re)
                        .map_err(|e| format!("Bad constraint in '{}': {}", segment, e))?;
                    Some(re)
                }
            };
            segments.push(Segment::Capture { name: name.to_owned(), constraint });
        }
        Ok(Self { segments })
    }

    /// Matches `path` against the pattern and returns the captured values on success.
    pub(super) fn matches(&self, path: &str) -> Option<Captures> {
        let parts = split(path);
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captures = Captures::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(text) => {
                    if text != part {
                        return None;
                    }
                }
                Segment::Capture { name, constraint } => {
                    if part.is_empty() {
                        return None;
                    }
                    if let Some(re) = constraint {
                        if !re.is_match(part) {
                            return None;
                        }
                    }
                    captures.push(name, part);
                }
            }
        }
        Some(captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matches `path` against `pattern` and returns the captures as pairs.
    fn try_match(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
        Pattern::parse(pattern)
            .unwrap()
            .matches(path)
            .map(|c| c.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
    }

    /// Shorthand to build expected captures.
    fn caps(pairs: &[(&str, &str)]) -> Option<Vec<(String, String)>> {
        Some(pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect())
    }

    #[test]
    fn test_root() {
        assert_eq!(caps(&[]), try_match("/", "/"));
        assert_eq!(caps(&[]), try_match("", "/"));
        assert_eq!(None, try_match("/", "/users"));
    }

    #[test]
    fn test_literals_are_case_sensitive() {
        assert_eq!(caps(&[]), try_match("/users/new", "/users/new"));
        assert_eq!(None, try_match("/users/new", "/Users/new"));
    }

    #[test]
    fn test_slashes_at_the_edges_are_ignored() {
        assert_eq!(caps(&[]), try_match("users/", "/users"));
        assert_eq!(caps(&[]), try_match("/users", "users/"));
    }

    #[test]
    fn test_captures_in_order() {
        assert_eq!(
            caps(&[("user", "ann"), ("post", "7")]),
            try_match("/users/{user}/posts/{post}", "/users/ann/posts/7")
        );
    }

    #[test]
    fn test_segment_count_must_match() {
        assert_eq!(caps(&[("id", "42")]), try_match("/users/{id}", "/users/42"));
        assert_eq!(None, try_match("/users/{id}", "/users/42/extra"));
        assert_eq!(None, try_match("/users/{id}", "/users"));
    }

    #[test]
    fn test_captures_must_not_be_empty() {
        assert_eq!(None, try_match("/a/{x}/b", "/a//b"));
    }

    #[test]
    fn test_constraints() {
        assert_eq!(caps(&[("id", "42")]), try_match("/users/{id:i}", "/users/42"));
        assert_eq!(None, try_match("/users/{id:i}", "/users/4a"));
        assert_eq!(caps(&[("id", "42")]), try_match(r"/users/{id:\d+}", "/users/42"));
        assert_eq!(None, try_match(r"/users/{id:\d}", "/users/42"));
        assert_eq!(caps(&[("slug", "a-b_c")]), try_match("/p/{slug:c}", "/p/a-b_c"));
        assert_eq!(None, try_match("/p/{slug:a}", "/p/a-b"));
        assert_eq!(caps(&[("h", "beef")]), try_match("/c/{h:h}", "/c/beef"));
        assert_eq!(caps(&[("n", "ab")]), try_match("/x/{n:[ab]{2}}", "/x/ab"));
        assert_eq!(caps(&[("v", "x")]), try_match("/v/{v:x|y}", "/v/x"));
        assert_eq!(None, try_match("/v/{v:x|y}", "/v/xy"));
    }

    #[test]
    fn test_malformed_patterns() {
        for (pattern, error) in [
            ("/users/{id", "Unterminated capture '{id'"),
            ("/users/id}", "Captures must span a whole segment in 'id}'"),
            ("/users/x{id}", "Captures must span a whole segment in 'x{id}'"),
            ("/users/{}", "Invalid capture name in '{}'"),
            ("/users/{a-b}", "Invalid capture name in '{a-b}'"),
            ("/a/{id}/b/{id}", "Duplicate capture name 'id'"),
            ("/a/{id:}", "Empty constraint in '{id:}'"),
        ] {
            assert_eq!(error, Pattern::parse(pattern).unwrap_err(), "{}", pattern);
        }

        let err = Pattern::parse("/a/{id:(}").unwrap_err();
        assert!(err.starts_with("Bad constraint in '{id:(}'"), "{}", err);
    }
}
