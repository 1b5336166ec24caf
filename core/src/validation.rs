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

//! Rule-based validation of form input.
//!
//! Every field is checked against a list of rules such as `required` or `min:6`, which can be
//! given as a pipe-delimited string (`"required|min:6"`) or as a list of rules.  The supported
//! rules are:
//!
//! *   `nullable`: stops checking the field if its value is empty.
//! *   `required`: the value must not be empty.
//! *   `email`: the value must look like an email address.
//! *   `min:N` and `max:N`: the value must have at least or at most `N` characters.
//!
//! Values are trimmed before checking for emptiness, and the format and length rules never apply
//! to empty values.

use log::warn;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Pattern that valid email addresses must match.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("Hardcoded regex must be valid")
});

/// A single parsed validation rule.
#[derive(Debug, PartialEq)]
enum Rule {
    /// Stop evaluating the field when empty.
    Nullable,

    /// The field must not be empty.
    Required,

    /// The field must be an email address.
    Email,

    /// The field must have at least this many characters.
    Min(usize),

    /// The field must have at most this many characters.
    Max(usize),
}

impl Rule {
    /// Parses a raw rule like `min:6`.  Returns `None` for rules that should be ignored.
    fn parse(raw: &str) -> Option<Rule> {
        let raw = raw.trim();
        let (name, param) = match raw.split_once(':') {
            Some((name, param)) => (name.trim(), Some(param.trim())),
            None => (raw, None),
        };

        let length = |param: Option<&str>| match param.map(str::parse::<usize>) {
            Some(Ok(n)) => Some(n),
            _ => {
                warn!("Ignoring validation rule '{}' with an invalid length", raw);
                None
            }
        };

        match name {
            "" => None,
            "nullable" => Some(Rule::Nullable),
            "required" => Some(Rule::Required),
            "email" => Some(Rule::Email),
            "min" => length(param).map(Rule::Min),
            "max" => length(param).map(Rule::Max),
            _ => {
                warn!("Ignoring unknown validation rule '{}'", raw);
                None
            }
        }
    }
}

/// Sources of rules for a single field.
pub trait RuleList {
    /// Returns the raw rules in evaluation order.
    fn raw_rules(&self) -> Vec<&str>;
}

impl RuleList for &str {
    fn raw_rules(&self) -> Vec<&str> {
        self.split('|').collect()
    }
}

impl RuleList for String {
    fn raw_rules(&self) -> Vec<&str> {
        self.split('|').collect()
    }
}

impl RuleList for &[&str] {
    fn raw_rules(&self) -> Vec<&str> {
        self.to_vec()
    }
}

impl<const N: usize> RuleList for [&str; N] {
    fn raw_rules(&self) -> Vec<&str> {
        self.to_vec()
    }
}

impl RuleList for Vec<&str> {
    fn raw_rules(&self) -> Vec<&str> {
        self.clone()
    }
}

/// Checks `value`, the value of `field`, against `rules` and appends any failures to `errors`.
fn validate_field<R: RuleList>(field: &str, value: &str, rules: &R, errors: &mut Vec<String>) {
    let is_empty = value.trim().is_empty();
    for rule in rules.raw_rules().into_iter().filter_map(Rule::parse) {
        match rule {
            Rule::Nullable => {
                if is_empty {
                    break;
                }
            }

            Rule::Required => {
                if is_empty {
                    errors.push(format!("Field {} must not be empty", field));
                }
            }

            Rule::Email => {
                if !is_empty && !EMAIL_RE.is_match(value.trim()) {
                    errors.push(format!("Field {} must be a valid email address", field));
                }
            }

            Rule::Min(n) => {
                if !is_empty && value.chars().count() < n {
                    errors.push(format!("Field {} must be at least {} characters", field, n));
                }
            }

            Rule::Max(n) => {
                if !is_empty && value.chars().count() > n {
                    errors.push(format!("Field {} must not exceed {} characters", field, n));
                }
            }
        }
    }
}

/// Validates `data` against the per-field `rules`.
///
/// Missing fields are treated as empty.  On failure, returns all error messages in field order and,
/// within each field, in rule order.
pub fn validate<R: RuleList>(
    data: &BTreeMap<String, String>,
    rules: &[(&str, R)],
) -> Result<(), Vec<String>> {
    let mut errors = vec![];
    for (field, field_rules) in rules {
        let value = data.get(*field).map(String::as_str).unwrap_or("");
        validate_field(field, value, field_rules, &mut errors);
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
