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

//! Handler for the static about page.

use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// GET handler for the about page.
pub(crate) async fn handler(
    ctx: Context,
    _captures: Captures,
) -> Result<Html<String>, HandlerError> {
    ctx.view(
        "pages.about",
        &json!({
            "name": ctx.app.config().name,
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/about".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_text(&format!(
                "Directory runs version {} of the directory",
                regex::escape(env!("CARGO_PKG_VERSION"))
            ))
            .await;
    }

    #[tokio::test]
    async fn test_trailing_slash() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/about/"))
            .send_empty()
            .await
            .expect_text("<h1>About Directory</h1>")
            .await;
    }
}
