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

//! Entry point to the sample application.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use mvcsimple_core::config::AppConfig;
use mvcsimple_core::db::DbOptions;
use mvcsimple_core::env::load_dotenv;
use mvcsimple_example::serve;
use std::error::Error;

/// Path to the optional file with environment settings, relative to the working directory.
const DOTENV_PATH: &str = ".env";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    load_dotenv(DOTENV_PATH)?;
    let config = AppConfig::from_env()?;
    let db_opts = DbOptions::from_env()?;

    serve(config, db_opts).await
}
