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

//! Handler to show the form that edits a user.

use crate::controllers::user_id;
use crate::db;
use crate::model::UserForm;
use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// GET handler for the user edit form.
///
/// The form shows the input rejected by a previous submission, if any, and the stored details of
/// the user otherwise.
pub(crate) async fn handler(
    ctx: Context,
    captures: Captures,
) -> Result<Html<String>, HandlerError> {
    let id = user_id(&captures)?;
    let user = db::get_user(&mut ctx.ex().await?, id).await?.ok_or(HandlerError::NotFound)?;

    let old = ctx.session().old_input_for(&format!("/users/{}", id));
    let form = if old.is_empty() { UserForm::from_user(&user) } else { UserForm::from_input(&old) };
    ctx.view("users.edit", &json!({"user": user, "form": form}))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::GET, format!("/users/{}/edit", id))
    }

    #[tokio::test]
    async fn test_prefilled_from_user() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;

        let body = OneShotBuilder::new(context.app(), route(id))
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("<h1>Edit Ann</h1>"));
        assert!(body.contains(r#"name="name" value="Ann""#));
        assert!(body.contains(r#"name="email" value="ann@example.com""#));
        assert!(body.contains(&format!(r#"action="/users/{}""#, id)));
        assert!(body.contains(&format!(r#"action="/users/{}/delete""#, id)));
    }

    #[tokio::test]
    async fn test_ignores_input_rejected_by_other_forms() {
        let context = TestContext::setup().await;
        let ann = context.create_user("Ann", "ann@example.com").await;
        let bob = context.create_user("Bob", "bob@example.com").await;

        let response = OneShotBuilder::new(context.app(), (http::Method::POST, "/users"))
            .send_form([("name", "Mallory"), ("email", "bad")])
            .await
            .expect_status(http::StatusCode::FOUND);
        let cookie = response.cookie().unwrap();
        response.verify();

        let body = OneShotBuilder::new(context.app(), route(ann))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains(r#"name="name" value="Ann""#));
        assert!(body.contains(r#"name="email" value="ann@example.com""#));
        assert!(!body.contains("Mallory"));

        OneShotBuilder::new(context.app(), (http::Method::POST, format!("/users/{}", bob)))
            .with_cookie(&cookie)
            .send_form([("name", "Robert"), ("email", "bad")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .verify();

        let body = OneShotBuilder::new(context.app(), route(ann))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains(r#"name="name" value="Ann""#));
        assert!(!body.contains("Robert"));

        let body = OneShotBuilder::new(context.app(), route(bob))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains(r#"name="name" value="Robert""#));
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(3))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_text("Page not found")
            .await;
    }
}
