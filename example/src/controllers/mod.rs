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

//! Request handlers and the route table that maps requests to them.
//!
//! Every handler lives in its own file named after the resource and the action it implements.

use mvcsimple_core::routing::{Captures, HandlerError, RouteCollector};
use mvcsimple_core::server::Context;

mod about;
mod home;
#[cfg(test)]
mod testutils;
mod users_create;
mod users_destroy;
mod users_edit;
mod users_index;
mod users_show;
mod users_store;
mod users_update;

/// Extracts the user identifier captured from the path.
///
/// Routes only admit digits here, but the value may still not fit an identifier.  No user can
/// have such an identifier so it is reported as not found.
fn user_id(captures: &Captures) -> Result<i64, HandlerError> {
    match captures.get("id") {
        Some(raw) => raw.parse::<i64>().map_err(|_| HandlerError::NotFound),
        None => captures.parse::<i64>("id"),
    }
}

/// Creates the route table of the application.
pub(crate) fn routes() -> RouteCollector<Context> {
    let mut routes = RouteCollector::new();
    routes
        .get("/", home::handler)
        .get("/about", about::handler)
        .get("/users", users_index::handler)
        .get("/users/create", users_create::handler)
        .post("/users", users_store::handler)
        .get("/users/{id:i}", users_show::handler)
        .get("/users/{id:i}/edit", users_edit::handler)
        .post("/users/{id:i}", users_update::handler)
        .put("/users/{id:i}", users_update::handler)
        .post("/users/{id:i}/delete", users_destroy::handler)
        .delete("/users/{id:i}", users_destroy::handler);
    routes
}
