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

//! Sample server-rendered application that maintains a directory of users.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use mvcsimple_core::config::AppConfig;
use mvcsimple_core::db::{Db, DbOptions, connect};
use mvcsimple_core::server::{self, App};
use std::error::Error;

mod controllers;
mod db;
pub(crate) mod model;

/// Instantiates all resources to serve the application as described by `config`, storing data in
/// the database described by `db_opts`.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
pub async fn serve(config: AppConfig, db_opts: DbOptions) -> Result<(), Box<dyn Error>> {
    let db = connect(db_opts).await?;
    db::init_schema(&mut db.ex().await?).await?;

    let bind_addr = config.bind_addr;
    let app = App::new(config, controllers::routes(), db);
    let result = server::serve(bind_addr, app.clone()).await;
    app.db().close().await;
    Ok(result?)
}
