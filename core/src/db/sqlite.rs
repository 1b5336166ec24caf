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

//! Common utilities to interact with an SQLite database.

use crate::db::{Db, DbError, DbResult, Executor, Record, TxExecutor, Value};
use async_trait::async_trait;
use log::{debug, warn};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::RowNotFound => DbError::NotFound,
        e if e.to_string().contains("FOREIGN KEY constraint failed") => DbError::NotFound,
        e if e.to_string().contains("UNIQUE constraint failed") => DbError::AlreadyExists,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Opens the database at `path`, creating it if it does not exist yet.
///
/// `path` may be `:memory:`, in which case the database lives as long as the returned pool.  An
/// in-memory database is limited to a single connection so that uncommitted writes are never
/// observed through a second connection to the shared cache.  That connection is never recycled:
/// the data lives in it.
pub async fn connect(path: &str) -> DbResult<SqliteDb> {
    let options =
        SqliteConnectOptions::from_str(path).map_err(map_sqlx_error)?.create_if_missing(true);
    let mut pool_options = SqlitePoolOptions::new();
    if path == ":memory:" || path == "sqlite::memory:" {
        pool_options = pool_options.max_connections(1).idle_timeout(None).max_lifetime(None);
    }
    debug!("Opening SQLite database {}", path);
    let pool = pool_options.connect_with(options).await.map_err(map_sqlx_error)?;
    Ok(SqliteDb { pool })
}

/// Binds the dynamically-typed `params` to the `sql` query in order.
fn build_query<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(d) => query.bind(*d),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Converts a raw SQLite `row` into an untyped record.
///
/// SQLite values carry their storage class, which is what drives the conversion, regardless of
/// the type affinity the column was declared with.
fn decode_row(row: &SqliteRow) -> DbResult<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(map_sqlx_error)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_owned();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get(i).map_err(map_sqlx_error)?),
                "REAL" => Value::Float(row.try_get(i).map_err(map_sqlx_error)?),
                "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                    Value::Text(row.try_get(i).map_err(map_sqlx_error)?)
                }
                "BLOB" => Value::Bytes(row.try_get(i).map_err(map_sqlx_error)?),
                other => {
                    return Err(DbError::DataIntegrityError(format!(
                        "Unsupported type {} in column {}",
                        other,
                        column.name()
                    )));
                }
            }
        };
        record.insert(column.name().to_owned(), value);
    }
    Ok(record)
}

/// A generic database executor implementation for SQLite.
#[derive(Debug)]
pub enum SqliteExecutor {
    /// An executor backed by a pool.  Operations issued via this executor aren't guaranteed to
    /// happen on the same connection.
    PoolExec(PoolConnection<Sqlite>),

    /// An executor backed by a transaction.
    TxExec(Transaction<'static, Sqlite>),
}

impl SqliteExecutor {
    /// Returns the connection that queries issued through this executor run on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        match self {
            SqliteExecutor::PoolExec(conn) => &mut **conn,
            SqliteExecutor::TxExec(tx) => &mut **tx,
        }
    }

    /// Commits the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Do not call commit on direct executors"),
            SqliteExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }

    /// Rolls back the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn rollback(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Do not call rollback on direct executors"),
            SqliteExecutor::TxExec(tx) => tx.rollback().await.map_err(map_sqlx_error),
        }
    }

    /// Runs `sql` with `params` and returns all resulting rows.
    pub(super) async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Record>> {
        let rows = build_query(sql, params).fetch_all(self.conn()).await.map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }

    /// Runs `sql` with `params` and returns the first resulting row, if any.
    pub(super) async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Option<Record>> {
        let row =
            build_query(sql, params).fetch_optional(self.conn()).await.map_err(map_sqlx_error)?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Runs `sql` with `params` and returns the number of affected rows.
    pub(super) async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let result = build_query(sql, params).execute(self.conn()).await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    /// Runs the possibly multi-statement `schema` script.
    pub(super) async fn run_schema(&mut self, schema: &str) -> DbResult<()> {
        sqlx::raw_sql(schema).execute(self.conn()).await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// A database instance backed by an SQLite database, either on disk or in memory.
pub struct SqliteDb {
    /// Shared SQLite connection pool.  This is a cloneable type that all concurrent
    /// transactions can use concurrently.
    pool: SqlitePool,
}

impl SqliteDb {
    /// Returns an executor of the specific type used by this database.
    pub async fn typed_ex(&self) -> DbResult<SqliteExecutor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(SqliteExecutor::PoolExec(conn))
    }
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("Dropping connection without having called close() first");
        }
    }
}

#[async_trait]
impl Db for SqliteDb {
    async fn ex(&self) -> DbResult<Executor> {
        Ok(Executor::Sqlite(self.typed_ex().await?))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Sqlite(SqliteExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Test utilities for the SQLite connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Initializes the test database.
    pub async fn setup() -> SqliteDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        connect(":memory:").await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::db::tests::generate_db_rw_tests;

    generate_db_rw_tests!(Box::new(setup().await));

    #[tokio::test]
    async fn test_decode_storage_classes() {
        let db = setup().await;
        let mut ex = db.typed_ex().await.unwrap();
        let row = ex
            .fetch_optional("SELECT 1 AS i, 2.5 AS f, 'x' AS t, X'0102' AS b, NULL AS n", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(&Value::Int(1)), row.get("i"));
        assert_eq!(Some(&Value::Float(2.5)), row.get("f"));
        assert_eq!(Some(&Value::Text("x".to_owned())), row.get("t"));
        assert_eq!(Some(&Value::Bytes(vec![1, 2])), row.get("b"));
        assert_eq!(Some(&Value::Null), row.get("n"));

        drop(ex);
        db.close().await;
    }

    #[tokio::test]
    async fn test_unique_violation_is_already_exists() {
        let db = setup().await;
        let mut ex = db.typed_ex().await.unwrap();
        ex.run_schema("CREATE TABLE t (k TEXT PRIMARY KEY); INSERT INTO t (k) VALUES ('a');")
            .await
            .unwrap();
        assert_eq!(
            DbError::AlreadyExists,
            ex.execute("INSERT INTO t (k) VALUES (?)", &[Value::from("a")]).await.unwrap_err()
        );

        drop(ex);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_file_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let db = connect(&path.to_string_lossy()).await.unwrap();
        db.typed_ex().await.unwrap().run_schema("CREATE TABLE t (i INTEGER)").await.unwrap();
        db.close().await;
        assert!(path.exists());
    }
}
