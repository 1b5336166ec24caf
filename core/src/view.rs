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

//! View rendering.
//!
//! Views are addressed by dotted names: `users.show` refers to `users/show` under the views root.
//! A rich template, `users/show.jinja`, is rendered with minijinja and may extend or include other
//! templates under the same root.  If there is none, a plain template, `users/show.html`, is
//! expanded with the `%key%` syntax of the `template` module.

use crate::template;
use log::debug;
use minijinja::{AutoEscape, Environment, path_loader};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of rich templates.
const RICH_EXTENSION: &str = "jinja";

/// Extension of plain templates.
const PLAIN_EXTENSION: &str = "html";

/// Errors raised while rendering views.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// Neither form of the view exists.
    #[error("View {view} not found (tried {} and {})", rich.display(), plain.display())]
    NotFound {
        /// Dotted name of the view.
        view: String,

        /// Path of the rich template that was looked up.
        rich: PathBuf,

        /// Path of the plain template that was looked up.
        plain: PathBuf,
    },

    /// The view name cannot be mapped to a path under the views root.
    #[error("Invalid view name '{0}'")]
    InvalidName(String),

    /// The template exists but rendering it failed.
    #[error("Cannot render view {view}: {message}")]
    Render {
        /// Dotted name of the view.
        view: String,

        /// Details about the failure.
        message: String,
    },
}

/// Result type for this module.
pub type ViewResult<T> = Result<T, ViewError>;

/// Converts a dotted view `name` into a relative path without extension.
fn view_path(name: &str) -> ViewResult<String> {
    let segments = name.split('.').collect::<Vec<&str>>();
    let valid = segments.iter().all(|s| {
        !s.is_empty() && !s.contains('/') && !s.contains('\\') && *s != ".."
    });
    if !valid {
        return Err(ViewError::InvalidName(name.to_owned()));
    }
    Ok(segments.join("/"))
}

/// Converts a template variable into the text inserted by a plain template.
fn plain_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders the views stored under a directory.
///
/// Rich templates always produce HTML, so their variables are escaped unless marked `safe`.
/// Plain templates insert values verbatim.
pub struct Views {
    /// Directory holding the templates.
    root: PathBuf,

    /// Rich template engine, loading templates from `root`.
    env: Environment<'static>,
}

impl Views {
    /// Creates a renderer for the templates under `root`.  `debug` makes rich template errors
    /// carry source context.
    pub fn new<P: Into<PathBuf>>(root: P, debug: bool) -> Self {
        let root = root.into();
        let mut env = Environment::new();
        env.set_loader(path_loader(&root));
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_debug(debug);
        Self { root, env }
    }

    /// Returns the directory holding the templates.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Renders the view `name` with `data` as its variables.
    ///
    /// `data` should be an object.  Plain templates can only reference its top-level keys.
    ///
    /// Rich templates escape every value for HTML but plain templates insert values verbatim.
    /// Never pass untrusted data, such as user input, to a view backed by a plain template.
    pub fn render(&self, name: &str, data: &JsonValue) -> ViewResult<String> {
        let rel = view_path(name)?;

        let rich_name = format!("{}.{}", rel, RICH_EXTENSION);
        let rich = self.root.join(&rich_name);
        if rich.is_file() {
            debug!("Rendering {} from {}", name, rich.display());
            return self.render_rich(name, &rich_name, data);
        }

        let plain = self.root.join(format!("{}.{}", rel, PLAIN_EXTENSION));
        if plain.is_file() {
            debug!("Rendering {} from {}", name, plain.display());
            return render_plain(name, &plain, data);
        }

        Err(ViewError::NotFound { view: name.to_owned(), rich, plain })
    }

    /// Renders the page `page`, which lives under `pages`.
    pub fn render_page(&self, page: &str, data: &JsonValue) -> ViewResult<String> {
        self.render(&format!("pages.{}", page), data)
    }

    /// Renders the error page for the HTTP status `code`, which lives under `errors`.
    pub fn render_error(&self, code: u16, data: &JsonValue) -> ViewResult<String> {
        self.render(&format!("errors.{}", code), data)
    }

    /// Renders the rich template `template` on behalf of the view `name`.
    fn render_rich(&self, name: &str, template: &str, data: &JsonValue) -> ViewResult<String> {
        let to_error = |e: minijinja::Error| ViewError::Render {
            view: name.to_owned(),
            message: format!("{:#}", e),
        };
        let tmpl = self.env.get_template(template).map_err(to_error)?;
        tmpl.render(data).map_err(to_error)
    }
}

/// Renders the plain template at `path` on behalf of the view `name`.
fn render_plain(name: &str, path: &Path, data: &JsonValue) -> ViewResult<String> {
    let contents = fs::read_to_string(path).map_err(|e| ViewError::Render {
        view: name.to_owned(),
        message: format!("Cannot read {}: {}", path.display(), e),
    })?;

    let replacements = match data {
        JsonValue::Object(map) => {
            map.iter().map(|(k, v)| (k.as_str(), plain_text(v))).collect::<Vec<(&str, String)>>()
        }
        _ => vec![],
    };
    template::apply(&contents, &replacements)
        .map_err(|e| ViewError::Render { view: name.to_owned(), message: e.to_string() })
}
