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

//! Trivial templating engine used for plain views.

/// Errors raised while expanding a template.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TemplateError {
    /// A `%key%` placeholder references a key with no replacement.
    #[error("No replacement for '{0}'")]
    UnknownKey(String),

    /// More than one replacement was provided for the same key.
    #[error("Found two values for replacement '{0}'")]
    DuplicateKey(String),

    /// The input ends in the middle of a `%key%` placeholder.
    #[error("Unterminated placeholder '%{0}'")]
    Unterminated(String),
}

/// Result type for this module.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Performs various named string replacements in `input` based on `replacements`.
///
/// The `input` string can have `%key%` strings in it where `key` must appear in `replacements` and
/// which will be replaced by its corresponding value.  Raw `%` characters can be escaped via `%%`
/// and nested expansions are not supported.
pub fn apply<K, V>(input: &str, replacements: &[(K, V)]) -> TemplateResult<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut output = String::with_capacity(input.len());
    let mut partial_key: Option<String> = None;
    for ch in input.chars() {
        if ch == '%' {
            match partial_key {
                Some(key) if key.is_empty() => {
                    output.push('%');
                    partial_key = None;
                }
                Some(key) => {
                    let mut found = false;
                    for (candidate_key, value) in replacements {
                        if candidate_key.as_ref() == key {
                            if found {
                                return Err(TemplateError::DuplicateKey(key));
                            }
                            output.push_str(value.as_ref());
                            found = true;
                            // We could "break" here but we don't because we want to check for
                            // duplicates.
                        }
                    }
                    if !found {
                        return Err(TemplateError::UnknownKey(key));
                    }
                    partial_key = None;
                }
                None => partial_key = Some(String::new()),
            }
        } else {
            match partial_key.as_mut() {
                Some(k) => k.push(ch),
                None => output.push(ch),
            }
        }
    }
    match partial_key {
        Some(key) => Err(TemplateError::Unterminated(key)),
        None => Ok(output),
    }
}
