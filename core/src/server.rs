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

//! HTTP server glue.
//!
//! The server hands every request to a single axum fallback handler, which builds a `Request`,
//! attaches the client's session, runs the `Dispatcher` and turns its outcome into a response.
//! Dispatch failures never reach the client as raw errors: they are logged and rendered with the
//! `errors.<code>` views.

use crate::config::AppConfig;
use crate::db::{Db, DbResult, Executor, TxExecutor};
use crate::request::{Request, UploadedFile, parse_form};
use crate::routing::{
    DispatchError, Dispatched, Dispatcher, HandlerError, RouteCollector, normalize_path,
};
use crate::session::{Session, SessionStore};
use crate::view::Views;
use axum::Router;
use axum::extract::{ConnectInfo, FromRequest, Multipart, State};
use axum::response::{Html, IntoResponse, Response};
use http::header::{ALLOW, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderValue, StatusCode};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Maximum size of a URL-encoded request body.
const MAX_FORM_SIZE: usize = 1024 * 1024;

/// How often expired sessions are purged from the store.
const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Message shown in production instead of the details of an internal error.
const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

/// Shared state of a running application.
pub struct App {
    /// Route table of the application.
    dispatcher: Dispatcher<Context>,

    /// Renderer for the views of the application.
    views: Views,

    /// Connection to the database.
    db: Arc<dyn Db + Send + Sync>,

    /// Sessions of all clients.
    sessions: SessionStore,

    /// Application settings.
    config: AppConfig,
}

impl App {
    /// Assembles an application that serves `routes` with the given database and settings.
    pub fn new(
        config: AppConfig,
        routes: RouteCollector<Context>,
        db: Box<dyn Db + Send + Sync>,
    ) -> Arc<Self> {
        let views = Views::new(&config.views_dir, config.debug_enabled());
        let sessions = SessionStore::new(config.session.clone());
        Arc::from(Self {
            dispatcher: Dispatcher::new(routes),
            views,
            db: Arc::from(db),
            sessions,
            config,
        })
    }

    /// Returns the database of the application.
    pub fn db(&self) -> &(dyn Db + Send + Sync) {
        self.db.as_ref()
    }

    /// Returns the view renderer.
    pub fn views(&self) -> &Views {
        &self.views
    }

    /// Returns the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Returns the application settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the `app` variable exposed to all templates.
    fn template_globals(&self) -> JsonValue {
        json!({
            "name": self.config.name,
            "env": self.config.environment.as_str(),
            "timezone": self.config.timezone,
            "debug": self.config.debug_enabled(),
        })
    }

    /// Renders the error page for `status` carrying `message`.
    ///
    /// Falls back to a plain-text body if the page cannot be rendered.
    fn error_page(&self, status: StatusCode, message: &str) -> Response {
        let data = json!({
            "app": self.template_globals(),
            "code": status.as_u16(),
            "message": message,
        });
        match self.views.render_error(status.as_u16(), &data) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                debug!("Falling back to a plain error page: {}", e);
                let mut text = status.to_string();
                if !message.is_empty() {
                    text = format!("{}: {}", text, message);
                }
                (status, text).into_response()
            }
        }
    }
}

/// Per-request context given to every handler.
#[derive(Clone)]
pub struct Context {
    /// The request being served.
    pub request: Request,

    /// The application serving the request.
    pub app: Arc<App>,
}

impl Context {
    /// Returns the request being served.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the session of the client.
    pub fn session(&self) -> &Session {
        self.request.session()
    }

    /// Obtains an executor for direct access to the database.
    pub async fn ex(&self) -> DbResult<Executor> {
        self.app.db.ex().await
    }

    /// Begins a database transaction.
    pub async fn begin(&self) -> DbResult<TxExecutor> {
        self.app.db.begin().await
    }

    /// Renders the view `name` with `data`, which must serialize into an object.
    ///
    /// On top of `data`, the view receives `app` (application settings), `flash` (the `error`
    /// and `success` flash messages, which are consumed) and `old` (the last submitted input).
    /// Keys in `data` win over these.
    pub fn view<T: Serialize>(&self, name: &str, data: &T) -> Result<Html<String>, HandlerError> {
        let data = match serde_json::to_value(data) {
            Ok(JsonValue::Object(map)) => map,
            Ok(JsonValue::Null) => Map::default(),
            Ok(other) => {
                return Err(HandlerError::Internal(format!(
                    "View data for {} must be an object but got {}",
                    name, other
                )));
            }
            Err(e) => {
                return Err(HandlerError::Internal(format!(
                    "Cannot serialize view data for {}: {}",
                    name, e
                )));
            }
        };

        let session = self.session();
        let mut vars = Map::default();
        vars.insert("app".to_owned(), self.app.template_globals());
        vars.insert(
            "flash".to_owned(),
            json!({
                "error": session.take_flash("error"),
                "success": session.take_flash("success"),
            }),
        );
        vars.insert("old".to_owned(), json!(session.old_input()));
        vars.extend(data);

        let html = self.app.views.render(name, &JsonValue::Object(vars))?;
        Ok(Html(html))
    }
}

/// Returns a response that redirects the client to `url` with a 302 status.
pub fn redirect(url: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, url.to_owned())]).into_response()
}

/// Returns a response that redirects the client to the page that issued `request`, or to the
/// root if unknown.
pub fn back(request: &Request) -> Response {
    redirect(request.referer().unwrap_or("/"))
}

/// Input fields and files sent in a request body.
type BodyInput = (BTreeMap<String, String>, BTreeMap<String, UploadedFile>);

/// Extracts the form fields and files from the body of `request`.
///
/// Only URL-encoded and multipart forms are understood.  Any other body is ignored.
async fn read_body(request: axum::extract::Request) -> Result<BodyInput, String> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok());
    let Some(content_type) = content_type else {
        return Ok(BodyInput::default());
    };

    if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_FORM_SIZE)
            .await
            .map_err(|e| format!("Cannot read form: {}", e))?;
        return Ok((parse_form(&String::from_utf8_lossy(&bytes)), BTreeMap::default()));
    }

    if content_type.type_() == mime::MULTIPART && content_type.subtype() == mime::FORM_DATA {
        let mut multipart =
            Multipart::from_request(request, &()).await.map_err(|e| e.body_text())?;
        let mut fields = BTreeMap::default();
        let mut files = BTreeMap::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_owned);
                    let data = field.bytes().await.map_err(|e| e.body_text())?;
                    files.insert(
                        name,
                        UploadedFile { file_name: Some(file_name), content_type, data },
                    );
                }
                None => {
                    fields.insert(name, field.text().await.map_err(|e| e.body_text())?);
                }
            }
        }
        return Ok((fields, files));
    }

    Ok(BodyInput::default())
}

/// Serves any request by dispatching it through the application's route table.
async fn handle(
    State(app): State<Arc<App>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: axum::extract::Request,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let path = normalize_path(uri.path());

    let (body, files) = match read_body(request).await {
        Ok(input) => input,
        Err(e) => {
            warn!("{} {} has a malformed body: {}", method, path, e);
            return app.error_page(StatusCode::BAD_REQUEST, &e);
        }
    };

    let session = app.sessions.load(&headers).await;
    let request = Request::new(method.clone(), path.clone(), headers, session.clone())
        .with_query(uri.query().map(parse_form).unwrap_or_default())
        .with_body(body)
        .with_files(files)
        .with_peer(peer.map(|ConnectInfo(addr)| addr));
    let ctx = Context { request, app: app.clone() };

    let mut response = match app.dispatcher.dispatch(&method, &path, ctx).await {
        Ok(Dispatched::Matched(response)) => response,

        Ok(Dispatched::NotFound) | Err(DispatchError::Handler(HandlerError::NotFound)) => {
            debug!("{} {} not found", method, path);
            app.error_page(StatusCode::NOT_FOUND, "")
        }

        Ok(Dispatched::MethodNotAllowed(allowed)) => {
            debug!("{} {} not allowed", method, path);
            let allowed = allowed.iter().map(|m| m.as_str()).collect::<Vec<&str>>().join(", ");
            let mut response = app.error_page(StatusCode::METHOD_NOT_ALLOWED, "");
            if let Ok(value) = HeaderValue::from_str(&allowed) {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        }

        Err(e) => {
            error!("{} {} failed: {}", method, path, e);
            let message = if app.config.is_production() {
                GENERIC_ERROR_MESSAGE.to_owned()
            } else {
                e.to_string()
            };
            app.error_page(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
    };

    match app.sessions.save(&session).await {
        Ok(Some(cookie)) => match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Cannot encode session cookie: {}", e),
        },
        Ok(None) => (),
        Err(e) => error!("Failed to save session: {}", e),
    }

    response
}

/// Creates the router that serves `app`.
pub fn app_router(app: Arc<App>) -> Router {
    Router::new().fallback(handle).with_state(app)
}

/// Serves `app` on `bind_addr` until the server fails.
pub async fn serve(bind_addr: impl Into<SocketAddr>, app: Arc<App>) -> io::Result<()> {
    let bind_addr = bind_addr.into();

    let sessions = app.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_PERIOD);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.cleanup().await {
                warn!("Session cleanup failed: {}", e);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app_router(app).into_make_service_with_connect_info::<SocketAddr>())
        .await
}

/// Common test code for applications built on the server.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use axum::body::Body;
    use http::HeaderName;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 64 * 1024;

    /// Boundary used to separate the parts of multipart bodies.
    const BOUNDARY: &str = "mvcsimple-test-boundary";

    /// A part of a multipart body sent by `OneShotBuilder::send_multipart`.
    pub enum Part<'a> {
        /// A text field with its name and value.
        Field(&'a str, &'a str),

        /// A file with its field name, file name, content type and contents.
        File(&'a str, &'a str, &'a str, &'a [u8]),
    }

    /// Builder for a single request to the application.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
            let builder = http::Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Extends the URI in the request with a `query`.
        pub fn with_query<Q: Serialize>(mut self, query: Q) -> Self {
            let uri = self.builder.uri_ref().unwrap().to_string();
            assert!(!uri.contains('?'), "URI already contains a query: {}", uri);
            self.builder = self.builder.uri(format!(
                "{}?{}",
                uri,
                serde_urlencoded::to_string(query).unwrap()
            ));
            self
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Sends the `name=value` `cookie` with the request, as returned by
        /// `ResponseChecker::cookie`.
        pub fn with_cookie<C: AsRef<str>>(self, cookie: C) -> Self {
            self.with_header(http::header::COOKIE, cookie.as_ref())
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a form encoded in the body as the
        /// payload.
        pub async fn send_form<T: Serialize>(self, form: T) -> ResponseChecker {
            let request = self
                .builder
                .header(CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
                .body(Body::from(serde_urlencoded::to_string(&form).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a multipart form made of `parts`.
        pub async fn send_multipart(self, parts: &[Part<'_>]) -> ResponseChecker {
            let mut body = vec![];
            for part in parts {
                body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
                match part {
                    Part::Field(name, value) => {
                        body.extend_from_slice(
                            format!(
                                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                                name, value
                            )
                            .as_bytes(),
                        );
                    }
                    Part::File(name, file_name, content_type, data) => {
                        body.extend_from_slice(
                            format!(
                                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                                 Content-Type: {}\r\n\r\n",
                                name, file_name, content_type
                            )
                            .as_bytes(),
                        );
                        body.extend_from_slice(data);
                        body.extend_from_slice(b"\r\n");
                    }
                }
            }
            body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

            let request = self
                .builder
                .header(CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
                .body(Body::from(body))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: Response,

        /// Expected HTTP status code in the response above.
        exp_status: StatusCode,
    }

    impl From<Response> for ResponseChecker {
        fn from(response: Response) -> Self {
            Self { response, exp_status: StatusCode::OK }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Returns the `name=value` pair of the cookie set by the response, if any.
        pub fn cookie(&self) -> Option<String> {
            self.response
                .headers()
                .get(SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(';').next())
                .map(str::to_owned)
        }

        /// Expects the header `name` of the response to be `value`.
        pub fn expect_header(self, name: HeaderName, value: &str) -> Self {
            let actual = self.response.headers().get(&name).map(|v| v.to_str().unwrap());
            assert_eq!(Some(value), actual, "Unexpected value for header {}", name);
            self
        }

        /// Finishes checking the response and expects it to redirect to `location` with a 302.
        pub fn expect_redirect(self, location: &str) {
            self.expect_status(StatusCode::FOUND).expect_header(LOCATION, location).verify();
        }

        /// Finishes checking the response and expects it to contain an empty body.
        pub async fn expect_empty(self) {
            let body = self.take_body_as_text().await;
            assert!(body.is_empty(), "Body not empty; got {}", body);
        }

        /// Finishes checking the response and expects its body to be valid UTF-8 and to match
        /// `exp_re`.
        pub async fn expect_text(self, exp_re: &str) {
            assert!(!exp_re.is_empty(), "Use expect_empty to validate empty responses");

            let body = self.take_body_as_text().await;
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(re.is_match(&body), "Body content '{}' does not match re '{}'", body, exp_re);
        }

        /// Finishes checking the response and returns the body of the response as UTF-8.
        pub async fn take_body_as_text(self) -> String {
            self.verify();

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            String::from_utf8(body.to_vec()).unwrap()
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub fn take_response(self) -> Response {
            self.verify();

            self.response
        }
    }
}
