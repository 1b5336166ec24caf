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

//! High-level data types.

use mvcsimple_core::db::{DbError, DbResult, Record, Value};
use mvcsimple_core::model::record;
use serde::Serialize;
use std::collections::BTreeMap;

/// Validation rules for the fields of a user form.
pub(crate) const USER_RULES: &[(&str, &str)] = &[
    ("name", "required|max:100"),
    ("email", "required|email|max:255"),
    ("bio", "nullable|max:500"),
];

/// Extracts the text column `name` from `row`.
fn take_text(row: &mut Record, name: &str) -> DbResult<Option<String>> {
    match row.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s)),
        Some(other) => {
            Err(DbError::DataIntegrityError(format!("Column {} is not text: {:?}", name, other)))
        }
    }
}

/// Extracts the non-null text column `name` from `row`.
fn require_text(row: &mut Record, name: &str) -> DbResult<String> {
    take_text(row, name)?
        .ok_or_else(|| DbError::DataIntegrityError(format!("Column {} cannot be null", name)))
}

/// A user of the directory as stored in the database.
#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct User {
    /// Identifier of the user.
    pub(crate) id: i64,

    /// Full name of the user.
    pub(crate) name: String,

    /// Email address of the user.  Unique across users.
    pub(crate) email: String,

    /// Optional free-form description.
    pub(crate) bio: Option<String>,

    /// When the user was created, as a `YYYY-MM-DD HH:MM:SS` UTC timestamp.
    pub(crate) created_at: String,
}

impl TryFrom<Record> for User {
    type Error = DbError;

    fn try_from(mut row: Record) -> DbResult<Self> {
        let id = row
            .remove("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DbError::DataIntegrityError("User without an integer id".to_owned()))?;
        Ok(User {
            id,
            name: require_text(&mut row, "name")?,
            email: require_text(&mut row, "email")?,
            bio: take_text(&mut row, "bio")?,
            created_at: require_text(&mut row, "created_at")?,
        })
    }
}

/// Contents of the form used to create or edit a user.
#[derive(Debug, Default, PartialEq, Serialize)]
pub(crate) struct UserForm {
    /// Full name of the user.
    pub(crate) name: String,

    /// Email address of the user.
    pub(crate) email: String,

    /// Optional free-form description.  Blank values mean no description.
    pub(crate) bio: String,
}

impl UserForm {
    /// Extracts the user fields from the submitted `input`, trimming surrounding whitespace.
    pub(crate) fn from_input(input: &BTreeMap<String, String>) -> Self {
        let field = |name: &str| input.get(name).map(|v| v.trim().to_owned()).unwrap_or_default();
        Self { name: field("name"), email: field("email"), bio: field("bio") }
    }

    /// Fills a form with the current details of `user`.
    pub(crate) fn from_user(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            bio: user.bio.clone().unwrap_or_default(),
        }
    }

    /// Converts the form into the columns to store.
    pub(crate) fn to_record(&self) -> Record {
        let bio = if self.bio.is_empty() { None } else { Some(self.bio.as_str()) };
        record([
            ("name", Value::from(self.name.as_str())),
            ("email", Value::from(self.email.as_str())),
            ("bio", Value::from(bio)),
        ])
    }
}
