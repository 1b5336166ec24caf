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

//! Handler to update the details of a user.

use crate::controllers::user_id;
use crate::db;
use crate::model::{USER_RULES, UserForm};
use axum::response::Response;
use log::info;
use mvcsimple_core::db::DbError;
use mvcsimple_core::model::ModelError;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::{Context, back, redirect};

/// POST and PUT handler for the user edit form.
pub(crate) async fn handler(ctx: Context, captures: Captures) -> Result<Response, HandlerError> {
    let id = user_id(&captures)?;

    let input = ctx.request.all();
    if !ctx.request.validate_data(USER_RULES, &input)? {
        return Ok(back(&ctx.request));
    }
    let form = UserForm::from_input(&input);

    match db::update_user(&mut ctx.ex().await?, id, &form).await {
        Ok(true) => (),
        Ok(false) => return Err(HandlerError::NotFound),
        Err(ModelError::Db(DbError::AlreadyExists)) => {
            ctx.request.set_old_input(Some(&input))?;
            ctx.session().flash_error([format!("Email {} is already taken", form.email)])?;
            return Ok(back(&ctx.request));
        }
        Err(e) => return Err(e.into()),
    }
    info!("Updated user {}", id);

    ctx.session().clear_old_input();
    ctx.session().flash_success([format!("User {} updated", form.name)])?;
    Ok(redirect(&format!("/users/{}", id)))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route(id: i64) -> (http::Method, String) {
        (http::Method::POST, format!("/users/{}", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;

        let response = OneShotBuilder::new(context.app(), route(id))
            .send_form([("name", "Ann B"), ("email", "annb@example.com"), ("bio", "Gardener")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, &format!("/users/{}", id));
        let cookie = response.cookie().unwrap();
        response.verify();

        let user = context.get_user(id).await.unwrap();
        assert_eq!("Ann B", user.name);
        assert_eq!("annb@example.com", user.email);
        assert_eq!(Some("Gardener".to_owned()), user.bio);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, format!("/users/{}", id)))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("User Ann B updated"));
        assert!(body.contains("<dd>Gardener</dd>"));
    }

    #[tokio::test]
    async fn test_put() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;

        OneShotBuilder::new(context.app(), (http::Method::PUT, format!("/users/{}", id)))
            .send_form([("name", "Ann"), ("email", "other@example.com")])
            .await
            .expect_redirect(&format!("/users/{}", id));

        assert_eq!("other@example.com", context.get_user(id).await.unwrap().email);
    }

    #[tokio::test]
    async fn test_validation_errors_keep_input() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;
        let edit = format!("/users/{}/edit", id);

        let response = OneShotBuilder::new(context.app(), route(id))
            .with_header(http::header::REFERER, edit.as_str())
            .send_form([("name", "Ann"), ("email", "broken")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, &edit);
        let cookie = response.cookie().unwrap();
        response.verify();

        assert_eq!("ann@example.com", context.get_user(id).await.unwrap().email);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, edit))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("Field email must be a valid email address"));
        assert!(body.contains(r#"name="email" value="broken""#));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let context = TestContext::setup().await;
        let id = context.create_user("Ann", "ann@example.com").await;
        context.create_user("Bob", "bob@example.com").await;

        let response = OneShotBuilder::new(context.app(), route(id))
            .send_form([("name", "Ann"), ("email", "bob@example.com")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, "/");
        let cookie = response.cookie().unwrap();
        response.verify();

        assert_eq!("ann@example.com", context.get_user(id).await.unwrap().email);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("Email bob@example.com is already taken"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(8))
            .send_form([("name", "Ann"), ("email", "ann@example.com")])
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_text("Page not found")
            .await;
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::PATCH, "/users/1"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::METHOD_NOT_ALLOWED)
            .expect_header(http::header::ALLOW, "GET, POST, PUT, DELETE")
            .expect_text("Method not allowed")
            .await;
    }
}
