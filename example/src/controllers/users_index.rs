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

//! Handler to list all users, one page at a time.

use crate::db::{self, PAGE_SIZE};
use axum::response::Html;
use mvcsimple_core::routing::{Captures, HandlerError};
use mvcsimple_core::server::Context;
use serde_json::json;

/// GET handler for the user listing.  The optional `page` query parameter is 1-based and
/// defaults to the first page when missing or invalid.
pub(crate) async fn handler(
    ctx: Context,
    _captures: Captures,
) -> Result<Html<String>, HandlerError> {
    let page = match ctx.request.input("page", "1").parse::<u64>() {
        Ok(page) if page > 0 => page,
        _ => 1,
    };

    let (users, total) = db::get_users_page(&mut ctx.ex().await?, page).await?;
    let total_u64 = u64::try_from(total).unwrap_or(0);
    let pages = total_u64.div_ceil(PAGE_SIZE).max(1);

    ctx.view(
        "users.index",
        &json!({
            "users": users,
            "page": page,
            "pages": pages,
            "total": total,
        }),
    )
}
