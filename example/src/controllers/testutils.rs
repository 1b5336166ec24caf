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

//! Test utilities for the controllers.

use crate::controllers::routes;
use crate::db;
use crate::model::{User, UserForm};
use axum::Router;
use mvcsimple_core::config::AppConfig;
use mvcsimple_core::db::Db;
use mvcsimple_core::server::{App, app_router};
use std::path::PathBuf;
use std::sync::Arc;

/// State of an application under test, backed by an in-memory database.
pub(crate) struct TestContext {
    /// The application under test.
    app: Arc<App>,
}

impl TestContext {
    /// Creates an application with an empty database and the real views.
    pub(crate) async fn setup() -> Self {
        let db = Box::new(mvcsimple_core::db::sqlite::testutils::setup().await);
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();

        let config = AppConfig {
            name: "Directory".to_owned(),
            views_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("views"),
            ..AppConfig::default()
        };
        Self { app: App::new(config, routes(), db) }
    }

    /// Returns a router to send requests to the application.
    pub(crate) fn app(&self) -> Router {
        app_router(self.app.clone())
    }

    /// Creates a user directly in the database and returns its identifier.
    pub(crate) async fn create_user(&self, name: &str, email: &str) -> i64 {
        let form = UserForm { name: name.to_owned(), email: email.to_owned(), bio: String::new() };
        db::create_user(&mut self.app.db().ex().await.unwrap(), &form).await.unwrap()
    }

    /// Gets a user directly from the database.
    pub(crate) async fn get_user(&self, id: i64) -> Option<User> {
        db::get_user(&mut self.app.db().ex().await.unwrap(), id).await.unwrap()
    }

    /// Counts the users in the database.
    pub(crate) async fn count_users(&self) -> i64 {
        db::get_users_page(&mut self.app.db().ex().await.unwrap(), 1).await.unwrap().1
    }
}
