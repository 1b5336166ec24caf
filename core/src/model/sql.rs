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

//! SQL statement builders for table-scoped operations.
//!
//! Every builder checks column names against the schema before emitting any SQL and never
//! interpolates values: these always travel as bound parameters.  `NULL`s are the exception as
//! they are rendered as literals, which keeps their type out of the parameter list.

use crate::db::{Dialect, Record, Value};
use crate::model::{ModelError, ModelResult, TableSchema};

/// A SQL statement ready to be handed to the database layer.
#[derive(Debug, PartialEq)]
pub(crate) struct Statement {
    /// The query text, with placeholders.
    pub(crate) sql: String,

    /// Values for the placeholders, in order.
    pub(crate) params: Vec<Value>,
}

/// Incrementally assembles a statement and keeps track of its placeholders.
struct Builder<'a> {
    /// Dialect to emit.
    dialect: Dialect,

    /// Table the statement operates on.
    schema: &'a TableSchema,

    /// Query text built so far.
    sql: String,

    /// Parameters bound so far.
    params: Vec<Value>,
}

impl<'a> Builder<'a> {
    fn new(dialect: Dialect, schema: &'a TableSchema) -> Self {
        Self { dialect, schema, sql: String::new(), params: vec![] }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Appends the quoted name of `column` after checking that the table has it.
    fn push_column(&mut self, column: &str) -> ModelResult<()> {
        if !self.schema.has_column(column) {
            return Err(ModelError::UnknownColumn {
                table: self.schema.name.to_owned(),
                column: column.to_owned(),
            });
        }
        let quoted = self.dialect.quote(column);
        self.sql.push_str(&quoted);
        Ok(())
    }

    /// Appends the quoted name of the table.
    fn push_table(&mut self) {
        let quoted = self.dialect.quote(self.schema.name);
        self.sql.push_str(&quoted);
    }

    /// Appends a placeholder for `value`, or a literal `NULL`.
    fn push_value(&mut self, value: &Value) {
        if value.is_null() {
            self.sql.push_str("NULL");
        } else {
            self.params.push(value.clone());
            let placeholder = self.dialect.placeholder(self.params.len());
            self.sql.push_str(&placeholder);
        }
    }

    /// Appends a `WHERE` clause that requires every column in `conditions` to equal its value.
    fn push_where(&mut self, conditions: &Record) -> ModelResult<()> {
        for (i, (column, value)) in conditions.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            self.push_column(column)?;
            if value.is_null() {
                self.push(" IS NULL");
            } else {
                self.push(" = ");
                self.push_value(value);
            }
        }
        Ok(())
    }

    /// Appends `LIMIT` and `OFFSET` clauses.  An offset requires a limit.
    fn push_limits(&mut self, limit: Option<u64>, offset: Option<u64>) -> ModelResult<()> {
        match (limit, offset) {
            (None, Some(_)) => return Err(ModelError::OffsetWithoutLimit),
            (None, None) => (),
            (Some(limit), offset) => {
                self.push(" LIMIT ");
                self.push_value(&Value::Int(to_i64(limit)));
                if let Some(offset) = offset {
                    self.push(" OFFSET ");
                    self.push_value(&Value::Int(to_i64(offset)));
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Statement {
        Statement { sql: self.sql, params: self.params }
    }
}

/// Clamps a row count to what the databases accept as a bound integer.
fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Direction of an `ORDER BY` clause.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Order {
    /// Smallest values first.
    Asc,

    /// Largest values first.
    Desc,
}

/// Builds a `SELECT *` over the rows that match `conditions`.
pub(crate) fn select(
    dialect: Dialect,
    schema: &TableSchema,
    conditions: &Record,
    order_by: (&str, Order),
    limit: Option<u64>,
    offset: Option<u64>,
) -> ModelResult<Statement> {
    let mut b = Builder::new(dialect, schema);
    b.push("SELECT * FROM ");
    b.push_table();
    b.push_where(conditions)?;
    b.push(" ORDER BY ");
    b.push_column(order_by.0)?;
    b.push(match order_by.1 {
        Order::Asc => " ASC",
        Order::Desc => " DESC",
    });
    b.push_limits(limit, offset)?;
    Ok(b.finish())
}

/// Builds a `SELECT COUNT(*)` over the rows that match `conditions`.  The count is returned in the
/// `count` column.
pub(crate) fn count(
    dialect: Dialect,
    schema: &TableSchema,
    conditions: &Record,
) -> ModelResult<Statement> {
    let mut b = Builder::new(dialect, schema);
    b.push("SELECT COUNT(*) AS count FROM ");
    b.push_table();
    b.push_where(conditions)?;
    Ok(b.finish())
}

/// Builds an `INSERT` of `data` that returns the primary key of the new row.
pub(crate) fn insert(
    dialect: Dialect,
    schema: &TableSchema,
    data: &Record,
) -> ModelResult<Statement> {
    if data.is_empty() {
        return Err(ModelError::EmptyPayload);
    }

    let mut b = Builder::new(dialect, schema);
    b.push("INSERT INTO ");
    b.push_table();
    b.push(" (");
    for (i, column) in data.keys().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_column(column)?;
    }
    b.push(") VALUES (");
    for (i, value) in data.values().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_value(value);
    }
    b.push(") RETURNING ");
    b.push_column(schema.primary_key)?;
    Ok(b.finish())
}

/// Builds an `UPDATE` that sets `data` on the rows that match `conditions`.
///
/// Empty `conditions` are accepted and update every row.
pub(crate) fn update(
    dialect: Dialect,
    schema: &TableSchema,
    conditions: &Record,
    data: &Record,
) -> ModelResult<Statement> {
    if data.is_empty() {
        return Err(ModelError::EmptyPayload);
    }

    let mut b = Builder::new(dialect, schema);
    b.push("UPDATE ");
    b.push_table();
    b.push(" SET ");
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_column(column)?;
        b.push(" = ");
        b.push_value(value);
    }
    b.push_where(conditions)?;
    Ok(b.finish())
}

/// Builds a `DELETE` of the rows that match `conditions`, which cannot be empty.
pub(crate) fn delete(
    dialect: Dialect,
    schema: &TableSchema,
    conditions: &Record,
) -> ModelResult<Statement> {
    if conditions.is_empty() {
        return Err(ModelError::UnconditionedDelete);
    }

    let mut b = Builder::new(dialect, schema);
    b.push("DELETE FROM ");
    b.push_table();
    b.push_where(conditions)?;
    Ok(b.finish())
}
