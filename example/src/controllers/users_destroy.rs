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

//! Handler to delete a user.

use crate::controllers::user_id;
use crate::db;
use axum::response::Response;
use log::info;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::{Context, redirect};

/// POST and DELETE handler to remove a user.
pub(crate) async fn handler(ctx: Context, captures: Captures) -> Result<Response, HandlerError> {
    let id = user_id(&captures)?;

    let mut tx = ctx.begin().await?;
    let Some(user) = db::get_user(tx.ex(), id).await? else {
        return Err(HandlerError::NotFound);
    };
    if !db::delete_user(tx.ex(), id).await? {
        return Err(HandlerError::NotFound);
    }
    tx.commit().await?;
    info!("Deleted user {} with email {}", id, user.email);

    ctx.session().flash_success([format!("User {} deleted", user.name)])?;
    Ok(redirect("/users"))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::POST, format!("/users/{}/delete", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;
        let other = context.create_user("Bob", "bob@example.com").await;

        let response = OneShotBuilder::new(context.app(), route(id))
            .send_empty()
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, "/users");
        let cookie = response.cookie().unwrap();
        response.verify();

        assert!(context.get_user(id).await.is_none());
        assert!(context.get_user(other).await.is_some());

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/users"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("User Ann deleted"));
        assert!(body.contains("Users (1)"));
    }

    #[tokio::test]
    async fn test_delete_method() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;

        OneShotBuilder::new(context.app(), (http::Method::DELETE, format!("/users/{}", id)))
            .send_empty()
            .await
            .expect_redirect("/users");

        assert_eq!(0, context.count_users().await);
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(5))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_text("Page not found")
            .await;
    }
}
