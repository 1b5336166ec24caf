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

//! Table-scoped data access.
//!
//! A `Model` binds a `TableSchema` and exposes the usual CRUD operations over untyped `Record`s.
//! Conditions are conjunctions of column equalities expressed as `Record`s too: an empty set of
//! conditions selects every row.
//!
//! All operations take an `Executor`, which means they work the same against a pooled connection
//! or against an open transaction.

use crate::db::{self, DbError, Executor, Record, Value};
use log::debug;

mod sql;
use sql::{Order, Statement};

/// Errors raised by model operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    /// A delete was requested without conditions, which would wipe the whole table.
    #[error("Refusing to delete without conditions")]
    UnconditionedDelete,

    /// An insert or update was requested without any data.
    #[error("No data provided")]
    EmptyPayload,

    /// A page offset was requested without a page size.
    #[error("An offset requires a limit")]
    OffsetWithoutLimit,

    /// A column name is not part of the table's schema.
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        /// Name of the table.
        table: String,

        /// Name of the rejected column.
        column: String,
    },

    /// The database failed to run the query.
    #[error("Query failed: {0}")]
    Db(#[from] DbError),
}

/// Result type for this module.
pub type ModelResult<T> = Result<T, ModelError>;

/// Builds a `Record` out of `(column, value)` pairs.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Description of a table: its name, primary key and the columns that may be referenced.
///
/// Only names listed here ever make it into SQL text, which is what allows interpolating them as
/// identifiers.  The names themselves must come from trusted code, never from user input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableSchema {
    /// Name of the table.
    pub name: &'static str,

    /// Name of the primary key column.
    pub primary_key: &'static str,

    /// Names of the remaining columns.
    pub columns: &'static [&'static str],
}

impl TableSchema {
    /// Returns true if `column` is the primary key or one of the declared columns.
    pub fn has_column(&self, column: &str) -> bool {
        self.primary_key == column || self.columns.contains(&column)
    }
}

/// Data access object for a single table.
#[derive(Clone, Copy, Debug)]
pub struct Model {
    /// The table this model operates on.
    schema: TableSchema,
}

impl Model {
    /// Creates a model for the table described by `schema`.
    pub const fn new(schema: TableSchema) -> Self {
        Self { schema }
    }

    /// Returns the schema of the table.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the condition set that selects the row whose primary key is `id`.
    fn by_id(&self, id: Value) -> Record {
        let mut conditions = Record::new();
        conditions.insert(self.schema.primary_key.to_owned(), id);
        conditions
    }

    /// Runs a statement that returns rows.
    async fn fetch_all(ex: &mut Executor, stmt: Statement) -> ModelResult<Vec<Record>> {
        Ok(db::fetch_all(ex, &stmt.sql, &stmt.params).await?)
    }

    /// Runs a statement that does not return rows.
    async fn execute(ex: &mut Executor, stmt: Statement) -> ModelResult<u64> {
        Ok(db::execute(ex, &stmt.sql, &stmt.params).await?)
    }

    /// Returns the first row that matches `conditions`, if any.
    pub async fn find(
        &self,
        ex: &mut Executor,
        conditions: &Record,
    ) -> ModelResult<Option<Record>> {
        let stmt = sql::select(
            ex.dialect(),
            &self.schema,
            conditions,
            (self.schema.primary_key, Order::Asc),
            Some(1),
            None,
        )?;
        Ok(Self::fetch_all(ex, stmt).await?.into_iter().next())
    }

    /// Returns the row whose primary key is `id`, if any.
    pub async fn find_by_id<V: Into<Value>>(
        &self,
        ex: &mut Executor,
        id: V,
    ) -> ModelResult<Option<Record>> {
        self.find(ex, &self.by_id(id.into())).await
    }

    /// Returns all rows that match `conditions` in primary key order, optionally paginated.
    ///
    /// `offset` is only valid together with `limit`.
    pub async fn all(
        &self,
        ex: &mut Executor,
        conditions: &Record,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ModelResult<Vec<Record>> {
        let stmt = sql::select(
            ex.dialect(),
            &self.schema,
            conditions,
            (self.schema.primary_key, Order::Asc),
            limit,
            offset,
        )?;
        Self::fetch_all(ex, stmt).await
    }

    /// Returns all rows that match `conditions` sorted by the `order_by` column in descending
    /// order, optionally paginated.
    pub async fn latest(
        &self,
        ex: &mut Executor,
        conditions: &Record,
        order_by: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ModelResult<Vec<Record>> {
        let stmt = sql::select(
            ex.dialect(),
            &self.schema,
            conditions,
            (order_by, Order::Desc),
            limit,
            offset,
        )?;
        Self::fetch_all(ex, stmt).await
    }

    /// Returns the number of rows that match `conditions`.
    pub async fn count(&self, ex: &mut Executor, conditions: &Record) -> ModelResult<i64> {
        let stmt = sql::count(ex.dialect(), &self.schema, conditions)?;
        let rows = Self::fetch_all(ex, stmt).await?;
        match rows.first().and_then(|row| row.get("count")).and_then(Value::as_i64) {
            Some(count) => Ok(count),
            None => Err(DbError::DataIntegrityError("COUNT returned no number".to_owned()).into()),
        }
    }

    /// Inserts a new row with `data` and returns its primary key.
    pub async fn create(&self, ex: &mut Executor, data: &Record) -> ModelResult<Value> {
        let stmt = sql::insert(ex.dialect(), &self.schema, data)?;
        let row = db::fetch_optional(ex, &stmt.sql, &stmt.params).await?;
        let id = row.and_then(|mut row| row.remove(self.schema.primary_key));
        match id {
            Some(id) => {
                debug!("Created row {} in {}", id, self.schema.name);
                Ok(id)
            }
            None => Err(DbError::DataIntegrityError(format!(
                "Insert into {} did not return the new {}",
                self.schema.name, self.schema.primary_key
            ))
            .into()),
        }
    }

    /// Sets `data` on all rows that match `conditions` and returns how many rows changed.
    ///
    /// Unlike `delete`, this accepts empty `conditions`, in which case every row is updated.
    pub async fn update(
        &self,
        ex: &mut Executor,
        conditions: &Record,
        data: &Record,
    ) -> ModelResult<u64> {
        let stmt = sql::update(ex.dialect(), &self.schema, conditions, data)?;
        Self::execute(ex, stmt).await
    }

    /// Sets `data` on the row whose primary key is `id` and returns how many rows changed.
    pub async fn update_by_id<V: Into<Value>>(
        &self,
        ex: &mut Executor,
        id: V,
        data: &Record,
    ) -> ModelResult<u64> {
        self.update(ex, &self.by_id(id.into()), data).await
    }

    /// Deletes all rows that match `conditions` and returns how many were deleted.
    ///
    /// Empty `conditions` are rejected before reaching the database.
    pub async fn delete(&self, ex: &mut Executor, conditions: &Record) -> ModelResult<u64> {
        let stmt = sql::delete(ex.dialect(), &self.schema, conditions)?;
        Self::execute(ex, stmt).await
    }

    /// Deletes the row whose primary key is `id` and returns how many rows were deleted.
    pub async fn delete_by_id<V: Into<Value>>(&self, ex: &mut Executor, id: V) -> ModelResult<u64> {
        self.delete(ex, &self.by_id(id.into())).await
    }
}
