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

//! Generic abstraction to access different database systems.
//!
//! The facilities in this module provide an abstraction over different database systems such as
//! PostgreSQL and SQLite.  The PostgreSQL backend is for production use and the SQLite backend is
//! primarily intended to support unit tests and small deployments.
//!
//! Rows travel through this layer untyped: every query returns `Record`s, which map column names
//! to dynamically-typed `Value`s.  Typed access is the business of the callers.

use crate::env::get_optional_var;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Database errors.  Any unexpected errors that come from the database are classified as
/// `BackendError`, but errors we know about have more specific types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DbError {
    /// Indicates that a request to create an entry failed because it already exists.
    #[error("Already exists")]
    AlreadyExists,

    /// Catch-all error type for unexpected database errors.
    #[error("Database error: {0}")]
    BackendError(String),

    /// Indicates a failure processing the data that already exists in the database.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    /// Indicates that a requested entry does not exist.
    #[error("Entity not found")]
    NotFound,

    /// Indicates that the database is not available (maybe because of too many active concurrent
    /// connections).
    #[error("Unavailable")]
    Unavailable,
}

/// Result type for this module.
pub type DbResult<T> = Result<T, DbError>;

/// A dynamically-typed value stored in, or bound to, a database column.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// The SQL `NULL`.
    Null,

    /// A boolean.
    Bool(bool),

    /// Any integer type.
    Int(i64),

    /// Any floating point type.
    Float(f64),

    /// Any textual type.
    Text(String),

    /// Raw binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this is the SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an integer if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Float(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// An untyped database row: column names mapped to their values.
pub type Record = BTreeMap<String, Value>;

/// SQL flavor spoken by a database backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// PostgreSQL: `$n` placeholders.
    Postgres,

    /// SQLite: `?` placeholders.
    Sqlite,
}

impl Dialect {
    /// Returns the placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_owned(),
        }
    }

    /// Quotes the identifier `name` so that it can be interpolated into a query.
    ///
    /// Quoting does not make arbitrary input safe to use as an identifier: callers must only pass
    /// names that have been validated against a known schema.
    pub fn quote(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// A database executor that can talk to multiple database implementations.
///
/// This type provides a generic mechanism to access a typed instance of a database, which is needed
/// by sqlx to offer type safety guarantees.  Users of this type are forced to destructure it and
/// issue different calls for each database, or to go through the untyped helpers in this module.
///
/// Note that this can wrap an executor that talks directly to a pool or to an open transaction.
pub enum Executor {
    /// A PostgreSQL executor that can be used in `sqlx` operations.
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresExecutor),

    /// A SQLite executor that can be used in `sqlx` operations.
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteExecutor),
}

impl Executor {
    /// Returns the SQL dialect understood by this executor.
    pub fn dialect(&self) -> Dialect {
        match self {
            #[cfg(feature = "postgres")]
            Executor::Postgres(_) => Dialect::Postgres,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(_) => Dialect::Sqlite,
        }
    }
}

/// A wrapper for a database executor backed by an open transaction.
///
/// Transactions do not nest: there is no way to begin a transaction from within another one.
pub struct TxExecutor(Executor);

impl TxExecutor {
    /// Returns the executor wrapped by this transaction.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    pub fn ex(&mut self) -> &mut Executor {
        &mut self.0
    }

    /// Commits the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self.0 {
            #[cfg(feature = "postgres")]
            Executor::Postgres(e) => e.commit().await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(e) => e.commit().await,
        }
    }

    /// Rolls back the transaction.  Dropping the transaction has the same effect, but this makes
    /// the intent explicit and surfaces any errors.
    pub async fn rollback(self) -> DbResult<()> {
        match self.0 {
            #[cfg(feature = "postgres")]
            Executor::Postgres(e) => e.rollback().await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(e) => e.rollback().await,
        }
    }
}

/// Abstraction over the database connection.
#[async_trait]
pub trait Db {
    /// Obtains an executor for direct access to the pool.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    async fn ex(&self) -> DbResult<Executor>;

    /// Begins a transaction.
    ///
    /// It is the responsibility of the caller to call `commit` on the returned executor.  Otherwise
    /// the transaction is rolled back on drop.
    async fn begin(&self) -> DbResult<TxExecutor>;

    /// Closes the connection pool.  Must be called before dropping the database.
    async fn close(&self);
}

/// Runs the `sql` query with the positional `params` and returns all rows it produced.
pub async fn fetch_all(ex: &mut Executor, sql: &str, params: &[Value]) -> DbResult<Vec<Record>> {
    debug!("Fetching: {}", sql);
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => ex.fetch_all(sql, params).await,

        #[cfg(feature = "sqlite")]
        Executor::Sqlite(ex) => ex.fetch_all(sql, params).await,
    }
}

/// Runs the `sql` query with the positional `params` and returns the first row, if any.
pub async fn fetch_optional(
    ex: &mut Executor,
    sql: &str,
    params: &[Value],
) -> DbResult<Option<Record>> {
    debug!("Fetching one: {}", sql);
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => ex.fetch_optional(sql, params).await,

        #[cfg(feature = "sqlite")]
        Executor::Sqlite(ex) => ex.fetch_optional(sql, params).await,
    }
}

/// Runs the `sql` statement with the positional `params` and returns the number of affected rows.
pub async fn execute(ex: &mut Executor, sql: &str, params: &[Value]) -> DbResult<u64> {
    debug!("Executing: {}", sql);
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => ex.execute(sql, params).await,

        #[cfg(feature = "sqlite")]
        Executor::Sqlite(ex) => ex.execute(sql, params).await,
    }
}

/// Runs the possibly multi-statement `schema` script, typically to create tables.
pub async fn run_schema(ex: &mut Executor, schema: &str) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => ex.run_schema(schema).await,

        #[cfg(feature = "sqlite")]
        Executor::Sqlite(ex) => ex.run_schema(schema).await,
    }
}

/// Options to establish a connection to any of the supported databases.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum DbOptions {
    /// Connect to a PostgreSQL server.
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresOptions),

    /// Open an SQLite database at the given path, which may be `:memory:`.
    #[cfg(feature = "sqlite")]
    Sqlite(String),
}

impl DbOptions {
    /// Initializes a set of options from the `DB_*` environment variables.
    ///
    /// `DB_CONNECTION` selects the backend and defaults to `postgres` when that backend is compiled
    /// in.  The remaining variables are backend-specific: see `PostgresOptions::from_env` for the
    /// server case, while SQLite only looks at `DB_PATH`.
    pub fn from_env() -> Result<Self, String> {
        let default_connection =
            if cfg!(feature = "postgres") { "postgres" } else { "sqlite" }.to_owned();
        let connection =
            get_optional_var::<String>("DB", "CONNECTION")?.unwrap_or(default_connection);
        match connection.as_str() {
            #[cfg(feature = "postgres")]
            "postgres" | "pgsql" => {
                Ok(DbOptions::Postgres(postgres::PostgresOptions::from_env("DB")?))
            }

            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(DbOptions::Sqlite(
                get_optional_var::<String>("DB", "PATH")?.unwrap_or_else(|| ":memory:".to_owned()),
            )),

            other => Err(format!("Unsupported database connection type '{}'", other)),
        }
    }
}

/// Opens the database described by `opts`.
pub async fn connect(opts: DbOptions) -> DbResult<Box<dyn Db + Send + Sync>> {
    match opts {
        #[cfg(feature = "postgres")]
        DbOptions::Postgres(opts) => Ok(Box::new(postgres::PostgresDb::connect(opts)?)),

        #[cfg(feature = "sqlite")]
        DbOptions::Sqlite(path) => Ok(Box::new(sqlite::connect(&path).await?)),
    }
}

/// Macros to help instantiate tests for multiple database systems.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    pub use paste::paste;

    /// Instantiates the `module::name` test for the database configured by `setup`.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_one_test [
        ( $name:ident, $setup:expr, $module:path $(, #[$extra:meta] )? ) => {
            #[tokio::test]
            $(#[$extra])?
            async fn $name() {
                $crate::db::testutils::paste! {
                    $module :: [< $name >]($setup).await;
                }
            }
        }
    ];

    pub use generate_one_test;

    /// Instantiates a collection of tests for a specific database system.
    ///
    /// The database implementation to run the tests against is determined by the `setup`
    /// expression, which needs to return a database object.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_tests [
        ( #[$extra:meta], $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module, #[$extra]);
            )+
        };

        ( $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module);
            )+
        };
    ];

    pub use generate_tests;
}
