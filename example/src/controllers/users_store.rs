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

//! Handler to create a new user.

use crate::db;
use crate::model::{USER_RULES, UserForm};
use axum::response::Response;
use log::info;
use mvcsimple_core::db::DbError;
use mvcsimple_core::model::ModelError;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::{Context, back, redirect};

/// POST handler for the user creation form.
pub(crate) async fn handler(ctx: Context, _captures: Captures) -> Result<Response, HandlerError> {
    let input = ctx.request.all();
    if !ctx.request.validate_data(USER_RULES, &input)? {
        return Ok(back(&ctx.request));
    }
    let form = UserForm::from_input(&input);

    let id = match db::create_user(&mut ctx.ex().await?, &form).await {
        Ok(id) => id,
        Err(ModelError::Db(DbError::AlreadyExists)) => {
            ctx.request.set_old_input(Some(&input))?;
            ctx.session().flash_error([format!("Email {} is already taken", form.email)])?;
            return Ok(back(&ctx.request));
        }
        Err(e) => return Err(e.into()),
    };
    info!("Created user {} with email {}", id, form.email);

    ctx.session().clear_old_input();
    ctx.session().flash_success([format!("User {} created", form.name)])?;
    Ok(redirect(&format!("/users/{}", id)))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/users".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(context.app(), route())
            .send_form([("name", "  Ann  "), ("email", "ann@example.com"), ("bio", "")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, "/users/1");
        let cookie = response.cookie().unwrap();
        response.verify();

        let user = context.get_user(1).await.unwrap();
        assert_eq!("Ann", user.name);
        assert_eq!("ann@example.com", user.email);
        assert_eq!(None, user.bio);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/users/1"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("User Ann created"));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(context.app(), route())
            .with_header(http::header::REFERER, "/users/create")
            .send_form([("name", ""), ("email", "not-an-email")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, "/users/create");
        let cookie = response.cookie().unwrap();
        response.verify();
        assert_eq!(0, context.count_users().await);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/users/create"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("Field name must not be empty"));
        assert!(body.contains("Field email must be a valid email address"));
        assert!(body.contains(r#"name="email" value="not-an-email""#));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let context = TestContext::setup().await;
        context.create_user("Ann", "ann@example.com").await;

        let response = OneShotBuilder::new(context.app(), route())
            .with_header(http::header::REFERER, "/users/create")
            .send_form([("name", "Other Ann"), ("email", "ann@example.com")])
            .await
            .expect_status(http::StatusCode::FOUND)
            .expect_header(http::header::LOCATION, "/users/create");
        let cookie = response.cookie().unwrap();
        response.verify();
        assert_eq!(1, context.count_users().await);

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/users/create"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("Email ann@example.com is already taken"));
        assert!(body.contains(r#"name="name" value="Other Ann""#));
    }

    #[tokio::test]
    async fn test_old_input_cleared_after_success() {
        let context = TestContext::setup().await;

        let cookie = {
            let response = OneShotBuilder::new(context.app(), route())
                .send_form([("name", "Ann"), ("email", "bad")])
                .await
                .expect_status(http::StatusCode::FOUND);
            let cookie = response.cookie().unwrap();
            response.verify();
            cookie
        };

        OneShotBuilder::new(context.app(), route())
            .with_cookie(&cookie)
            .send_form([("name", "Ann"), ("email", "ann@example.com")])
            .await
            .expect_redirect("/users/1");

        let body = OneShotBuilder::new(context.app(), (http::Method::GET, "/users/create"))
            .with_cookie(&cookie)
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains(r#"name="email" value="""#));
    }
}
