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

//! Matching of requests against the route table.

use super::pattern::Pattern;
use super::{Captures, Handler, HandlerError, RouteCollector};
use axum::response::Response;
use http::Method;
use log::debug;
use std::sync::Arc;

/// Outcome of dispatching a request that did not fail.
#[derive(Debug)]
pub enum Dispatched {
    /// A route matched and its handler produced this response.
    Matched(Response),

    /// No route matches the path under any method.
    NotFound,

    /// No route matches the path under the requested method, but some do under these methods.
    MethodNotAllowed(Vec<Method>),
}

/// Errors raised while dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The handler of the matching route failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A route reached during matching has a malformed pattern.
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as registered.
        pattern: String,

        /// Why the pattern is malformed.
        reason: String,
    },
}

/// Result type for dispatching.
pub type DispatchResult = Result<Dispatched, DispatchError>;

/// A route with its pattern compiled ahead of time.
struct CompiledRoute<C> {
    /// The raw pattern as registered.
    raw: String,

    /// The compiled pattern, or the reason why it could not be compiled.
    pattern: Result<Pattern, String>,

    /// The handler to invoke on a match.
    handler: Arc<dyn Handler<C>>,
}

impl<C> CompiledRoute<C> {
    /// Matches `path` against this route.  Fails if the route's pattern is malformed.
    fn matches(&self, path: &str) -> Result<Option<Captures>, DispatchError> {
        match &self.pattern {
            Ok(pattern) => Ok(pattern.matches(path)),
            Err(reason) => Err(DispatchError::InvalidPattern {
                pattern: self.raw.clone(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Immutable route table that maps requests to handlers.
///
/// Routes are tried in registration order and the first one that matches wins.
pub struct Dispatcher<C> {
    /// Routes grouped by method, with methods in the order they were first registered.
    table: Vec<(Method, Vec<CompiledRoute<C>>)>,
}

impl<C: 'static> Dispatcher<C> {
    /// Takes ownership of the routes in `collector`.
    pub fn new(collector: RouteCollector<C>) -> Self {
        let table = collector
            .into_routes()
            .into_iter()
            .map(|(method, routes)| {
                let routes = routes
                    .into_iter()
                    .map(|route| CompiledRoute {
                        pattern: Pattern::parse(&route.pattern),
                        raw: route.pattern,
                        handler: route.handler,
                    })
                    .collect();
                (method, routes)
            })
            .collect();
        Self { table }
    }

    /// Returns the routes registered for `method`, if any.
    fn routes_for(&self, method: &Method) -> Option<&[CompiledRoute<C>]> {
        self.table.iter().find(|(m, _)| m == method).map(|(_, routes)| routes.as_slice())
    }

    /// Dispatches a request for `path` with `method`, passing `ctx` to the handler on a match.
    ///
    /// `path` should have gone through `normalize_path`.  `HEAD` requests are served by the `GET`
    /// routes unless there are explicit `HEAD` routes.
    pub async fn dispatch(&self, method: &Method, path: &str, ctx: C) -> DispatchResult {
        let effective = match self.routes_for(method) {
            None if *method == Method::HEAD => Method::GET,
            _ => method.clone(),
        };

        for route in self.routes_for(&effective).unwrap_or_default() {
            if let Some(captures) = route.matches(path)? {
                debug!("{} {} matched route {}", method, path, route.raw);
                let response = route.handler.call(ctx, captures).await?;
                return Ok(Dispatched::Matched(response));
            }
        }

        let mut allowed = vec![];
        for (other, routes) in &self.table {
            if *other == effective {
                continue;
            }
            for route in routes {
                if route.matches(path)?.is_some() {
                    allowed.push(other.clone());
                    break;
                }
            }
        }

        if allowed.is_empty() {
            Ok(Dispatched::NotFound)
        } else {
            Ok(Dispatched::MethodNotAllowed(allowed))
        }
    }
}
