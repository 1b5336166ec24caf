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

//! Rudimentary framework to build server-rendered web applications.
//!
//! Applications built using this framework adhere to a classic model-view-controller layout:
//!
//! 1.  `routes`: The application registers `(method, pattern, handler)` triples against a
//!     `routing::RouteCollector` at startup.  The resulting table is handed to a
//!     `routing::Dispatcher` and never modified again.
//!
//! 1.  `controllers`: Handlers receive a `server::Context`, which carries the `request::Request`
//!     (with its `session::Session`) and the shared `server::App` state, plus the values captured
//!     from the path.  They return anything that converts into an HTTP response.
//!
//! 1.  `models`: Every table is described by a `model::TableSchema` and accessed through a
//!     `model::Model`, which translates CRUD operations into parameterized SQL run against a
//!     `db::Executor`.
//!
//! 1.  `views`: Templates live under a views directory and are rendered by `view::Views`, which
//!     prefers rich templates and falls back to plain ones.
//!
//! 1.  `main`: This is the app launcher.  Its sole purpose is to gather configuration data from
//!     environment variables and call `server::serve` to start the application.
//!
//! There are result and error types in every layer, such as `DbResult` and `DbError`.  Errors can
//! transparently float to the top of a handler using the `?` operator, being translated to an
//! HTTP 500 page once they leave the handler.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod config;
pub mod db;
pub mod env;
pub mod model;
pub mod request;
pub mod routing;
pub mod server;
pub mod session;
pub mod template;
pub mod validation;
pub mod view;
