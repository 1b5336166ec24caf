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

//! Database abstraction in terms of the operations needed by the controllers.

use crate::model::{User, UserForm};
use mvcsimple_core::db::{DbError, DbResult, Dialect, Executor, Record, run_schema};
use mvcsimple_core::model::{Model, ModelResult, TableSchema};


/// Schema to initialize a PostgreSQL database.
const POSTGRES_SCHEMA: &str = include_str!("postgres.sql");

/// Schema to initialize a SQLite database.
const SQLITE_SCHEMA: &str = include_str!("sqlite.sql");

/// Number of users shown per page in listings.
pub(crate) const PAGE_SIZE: u64 = 10;

/// Access to the `users` table.
const USERS: Model = Model::new(TableSchema {
    name: "users",
    primary_key: "id",
    columns: &["name", "email", "bio", "created_at"],
});

/// Initializes the database schema.
pub(crate) async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    let schema = match ex.dialect() {
        Dialect::Postgres => POSTGRES_SCHEMA,
        Dialect::Sqlite => SQLITE_SCHEMA,
    };
    run_schema(ex, schema).await
}

/// Converts raw rows into users.
fn into_users(rows: Vec<Record>) -> ModelResult<Vec<User>> {
    Ok(rows.into_iter().map(User::try_from).collect::<DbResult<Vec<User>>>()?)
}

/// Gets the user identified by `id`, if it exists.
pub(crate) async fn get_user(ex: &mut Executor, id: i64) -> ModelResult<Option<User>> {
    match USERS.find_by_id(ex, id).await? {
        Some(row) => Ok(Some(User::try_from(row)?)),
        None => Ok(None),
    }
}

/// Gets the 1-based `page` of users in creation order, along with the total number of users.
pub(crate) async fn get_users_page(ex: &mut Executor, page: u64) -> ModelResult<(Vec<User>, i64)> {
    let offset = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
    let rows = USERS.all(ex, &Record::new(), Some(PAGE_SIZE), Some(offset)).await?;
    let total = USERS.count(ex, &Record::new()).await?;
    Ok((into_users(rows)?, total))
}

/// Gets the `n` most recently created users.
pub(crate) async fn get_recent_users(ex: &mut Executor, n: u64) -> ModelResult<Vec<User>> {
    into_users(USERS.latest(ex, &Record::new(), "id", Some(n), None).await?)
}

/// Creates a new user with the details in `form` and returns its identifier.
pub(crate) async fn create_user(ex: &mut Executor, form: &UserForm) -> ModelResult<i64> {
    let id = USERS.create(ex, &form.to_record()).await?;
    match id.as_i64() {
        Some(id) => Ok(id),
        None => Err(DbError::DataIntegrityError(format!("Non-integer user id {}", id)).into()),
    }
}

/// Replaces the details of the user `id` with `form`.  Returns false if the user does not exist.
pub(crate) async fn update_user(ex: &mut Executor, id: i64, form: &UserForm) -> ModelResult<bool> {
    Ok(USERS.update_by_id(ex, id, &form.to_record()).await? > 0)
}

/// Deletes the user `id`.  Returns false if the user does not exist.
pub(crate) async fn delete_user(ex: &mut Executor, id: i64) -> ModelResult<bool> {
    Ok(USERS.delete_by_id(ex, id).await? > 0)
}
