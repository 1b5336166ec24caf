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

//! Route registration and dispatching.
//!
//! Applications register `(method, pattern, handler)` triples in a `RouteCollector` at startup and
//! then hand the collector to a `Dispatcher`, which owns the resulting table for the rest of the
//! process lifetime.
//!
//! Patterns are `/`-delimited paths in which a segment of the form `{name}` captures the
//! corresponding segment of the request path.  A capture may be constrained with a regular
//! expression that the whole segment must match, as in `{id:\d+}`, or with one of the shorthand
//! constraints `i` (digits), `a` (alphanumeric), `c` (alphanumeric plus `-` and `_`) and `h`
//! (hexadecimal), as in `{id:i}`.
//!
//! Pattern syntax is not checked at registration time.  A malformed pattern only causes an error
//! once a request reaches it during matching.

use crate::db::DbError;
use crate::model::ModelError;
use crate::session::SessionError;
use crate::view::ViewError;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::Method;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

mod dispatcher;
mod pattern;

pub use dispatcher::{DispatchError, DispatchResult, Dispatched, Dispatcher};

/// Errors that handlers can raise.
///
/// Any of these terminates the request with an error page.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The requested entity does not exist.  Rendered as a 404 page.
    #[error("Not found")]
    NotFound,

    /// A model operation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A raw database operation failed.
    #[error("Query failed: {0}")]
    Db(#[from] DbError),

    /// A view could not be rendered.
    #[error(transparent)]
    View(#[from] ViewError),

    /// The session could not be updated.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Any other failure.
    #[error("{0}")]
    Internal(String),
}

/// Result type for handlers.
pub type HandlerResult = Result<Response, HandlerError>;

/// Values captured from the request path, in the order in which they appear in the pattern.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Captures(Vec<(String, String)>);

impl Captures {
    /// Returns the value captured under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Returns the value of the capture at position `index`.
    pub fn at(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|(_, v)| v.as_str())
    }

    /// Parses the value captured under `name` into `T`.
    ///
    /// Handlers should only call this for captures they declared, so failures are reported as
    /// internal errors.  Constrain the capture to make sure it parses.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, HandlerError> {
        let raw = self
            .get(name)
            .ok_or_else(|| HandlerError::Internal(format!("No capture named {}", name)))?;
        raw.parse::<T>()
            .map_err(|_| HandlerError::Internal(format!("Invalid value '{}' for {}", raw, name)))
    }

    /// Returns the number of captured values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the `(name, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Appends a captured value.
    fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.to_owned(), value.to_owned()));
    }
}

/// A request handler that receives a context of type `C`.
///
/// This is implemented for all async functions of the form
/// `async fn(C, Captures) -> Result<impl IntoResponse, HandlerError>`.
pub trait Handler<C>: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, ctx: C, captures: Captures) -> BoxFuture<'static, HandlerResult>;
}

impl<C, F, Fut, R> Handler<C> for F
where
    F: Fn(C, Captures) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, ctx: C, captures: Captures) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx, captures);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

/// A registered route.
pub struct Route<C> {
    /// The raw pattern as registered.
    pub pattern: String,

    /// The handler to invoke on a match.
    pub handler: Arc<dyn Handler<C>>,
}

/// Collects the routes of an application, in registration order.
pub struct RouteCollector<C> {
    /// Routes grouped by method, with methods in the order they were first seen.
    table: Vec<(Method, Vec<Route<C>>)>,
}

impl<C> Default for RouteCollector<C> {
    fn default() -> Self {
        Self { table: vec![] }
    }
}

impl<C: 'static> RouteCollector<C> {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for requests with `method` whose path matches `pattern`.
    ///
    /// Routes are never deduplicated: if two routes match a request, the one registered first
    /// wins.
    pub fn add_route<P: Into<String>, H: Handler<C>>(
        &mut self,
        method: Method,
        pattern: P,
        handler: H,
    ) -> &mut Self {
        let route = Route { pattern: pattern.into(), handler: Arc::new(handler) };
        match self.table.iter_mut().find(|(m, _)| *m == method) {
            Some((_, routes)) => routes.push(route),
            None => self.table.push((method, vec![route])),
        }
        self
    }

    /// Registers a `GET` route.
    pub fn get<P: Into<String>, H: Handler<C>>(&mut self, pattern: P, handler: H) -> &mut Self {
        self.add_route(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<P: Into<String>, H: Handler<C>>(&mut self, pattern: P, handler: H) -> &mut Self {
        self.add_route(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<P: Into<String>, H: Handler<C>>(&mut self, pattern: P, handler: H) -> &mut Self {
        self.add_route(Method::PUT, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<P: Into<String>, H: Handler<C>>(&mut self, pattern: P, handler: H) -> &mut Self {
        self.add_route(Method::PATCH, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<P: Into<String>, H: Handler<C>>(&mut self, pattern: P, handler: H) -> &mut Self {
        self.add_route(Method::DELETE, pattern, handler)
    }

    /// Returns the routes registered so far, grouped by method.
    pub fn routes(&self) -> &[(Method, Vec<Route<C>>)] {
        &self.table
    }

    /// Consumes the collector and returns its routes, grouped by method.
    pub fn into_routes(self) -> Vec<(Method, Vec<Route<C>>)> {
        self.table
    }
}

/// Normalizes the path of a request for matching: decodes percent-escapes, drops trailing
/// slashes and maps the empty path to `/`.
///
/// Paths that do not decode to valid UTF-8 are left encoded.
pub fn normalize_path(raw: &str) -> String {
    let decoded = match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    };
    let trimmed = decoded.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_owned() } else { trimmed.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: (), _captures: Captures) -> Result<&'static str, HandlerError> {
        Ok("noop")
    }

    #[test]
    fn test_captures_accessors() {
        let mut captures = Captures::default();
        assert!(captures.is_empty());
        captures.push("user", "ann");
        captures.push("id", "42");

        assert_eq!(2, captures.len());
        assert_eq!(Some("ann"), captures.get("user"));
        assert_eq!(Some("42"), captures.at(1));
        assert_eq!(None, captures.get("missing"));
        assert_eq!(None, captures.at(2));
        assert_eq!(vec![("user", "ann"), ("id", "42")], captures.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_captures_parse() {
        let mut captures = Captures::default();
        captures.push("id", "42");
        captures.push("name", "x");
        assert_eq!(42, captures.parse::<i64>("id").unwrap());
        match captures.parse::<i64>("name") {
            Err(HandlerError::Internal(msg)) => assert_eq!("Invalid value 'x' for name", msg),
            e => panic!("Must have failed with Internal but got: {:?}", e),
        }
        match captures.parse::<i64>("other") {
            Err(HandlerError::Internal(msg)) => assert_eq!("No capture named other", msg),
            e => panic!("Must have failed with Internal but got: {:?}", e),
        }
    }

    #[test]
    fn test_collector_keeps_registration_order() {
        let mut collector = RouteCollector::<()>::new();
        collector.get("/a", noop).post("/a", noop).get("/b", noop).delete("/a", noop);
        collector.add_route(Method::GET, "/a", noop);

        let summary = collector
            .routes()
            .iter()
            .map(|(m, routes)| {
                (m.clone(), routes.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                (Method::GET, vec!["/a", "/b", "/a"]),
                (Method::POST, vec!["/a"]),
                (Method::DELETE, vec!["/a"]),
            ],
            summary
        );
    }

    #[test]
    fn test_collector_does_not_validate() {
        let mut collector = RouteCollector::<()>::new();
        collector.put("/{broken", noop).patch("/x/{id:(}", noop);
        assert_eq!(2, collector.into_routes().len());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!("/", normalize_path(""));
        assert_eq!("/", normalize_path("/"));
        assert_eq!("/", normalize_path("///"));
        assert_eq!("/users", normalize_path("/users/"));
        assert_eq!("/users/42", normalize_path("/users/42"));
        assert_eq!("/files/a b", normalize_path("/files/a%20b"));
        assert_eq!("/caf\u{e9}", normalize_path("/caf%C3%A9"));
        assert_eq!("/bad%FF", normalize_path("/bad%FF"));
    }
}
