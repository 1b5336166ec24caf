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

//! Handler for the landing page.

use crate::db;
use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// Number of recently-created users to show.
const RECENT_USERS: u64 = 5;

/// GET handler for the landing page.
pub(crate) async fn handler(
    ctx: Context,
    _captures: Captures,
) -> Result<Html<String>, HandlerError> {
    let mut ex = ctx.ex().await?;
    let recent = db::get_recent_users(&mut ex, RECENT_USERS).await?;
    let (_, total) = db::get_users_page(&mut ex, 1).await?;
    drop(ex);

    ctx.view("pages.home", &json!({"recent": recent, "total": total}))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/".to_owned())
    }

    #[tokio::test]
    async fn test_empty() {
        let context = TestContext::setup().await;

        let body = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("Welcome to Directory"));
        assert!(body.contains("The directory has 0 user(s)."));
        assert!(!body.contains("Recently added"));
    }

    #[tokio::test]
    async fn test_recent_users() {
        let context = TestContext::setup().await;
        for i in 0..7 {
            context.create_user(&format!("user{}", i), &format!("u{}@example.com", i)).await;
        }

        let body = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("The directory has 7 user(s)."));
        assert!(body.contains("Recently added"));
        assert!(body.contains(">user6<"));
        assert!(body.contains(">user2<"));
        assert!(!body.contains(">user1<"));
    }
}
