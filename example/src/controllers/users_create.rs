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

//! Handler to show the form that creates a user.

use crate::model::UserForm;
use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// GET handler for the user creation form, prefilled with any input rejected earlier.
pub(crate) async fn handler(
    ctx: Context,
    _captures: Captures,
) -> Result<Html<String>, HandlerError> {
    let form = UserForm::from_input(&ctx.session().old_input_for("/users"));
    ctx.view("users.create", &json!({"form": form}))
}

#[cfg(test)]
mod tests {
    use crate::controllers::testutils::*;
    use axum::http;
    use mvcsimple_core::server::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/users/create".to_owned())
    }

    #[tokio::test]
    async fn test_blank_form() {
        let context = TestContext::setup().await;

        let body = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .take_body_as_text()
            .await;
        assert!(body.contains("<h1>New user</h1>"));
        assert!(body.contains(r#"name="name" value="""#));
        assert!(body.contains(r#"name="email" value="""#));
        assert!(body.contains(">Create<"));
    }

    #[tokio::test]
    async fn test_create_does_not_match_show() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/users/create/edit"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_text("Page not found")
            .await;
    }
}
