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

//! Handler to show the details of a user.

use crate::controllers::user_id;
use crate::db;
use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// GET handler for a single user.
pub(crate) async fn handler(
    ctx: Context,
    captures: Captures,
) -> Result<Html<String>, HandlerError> {
    let id = user_id(&captures)?;
    let user = db::get_user(&mut ctx.ex().await?, id).await?.ok_or(HandlerError::NotFound)?;
    ctx.view("users.show", &json!({"user": user}))
}
