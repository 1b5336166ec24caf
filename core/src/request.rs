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

//! Read-only view of the incoming HTTP request.
//!
//! A `Request` is populated once when the request enters the server and is then handed to the
//! handler as part of its context.  Input comes from two maps: the query string and the body.
//! Whenever both maps are consulted, the body takes precedence.

use crate::session::{Session, SessionResult};
use crate::validation::{self, RuleList};
use bytes::Bytes;
use http::{HeaderMap, Method};
use log::warn;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Parses a `application/x-www-form-urlencoded` string, such as a query string, into a map.
///
/// Repeated keys keep their last value.  Malformed input yields an empty map.
pub fn parse_form(raw: &str) -> BTreeMap<String, String> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            warn!("Ignoring malformed form data: {}", e);
            BTreeMap::default()
        }
    }
}

/// A file uploaded as part of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedFile {
    /// Name of the file as given by the client, if any.
    pub file_name: Option<String>,

    /// Content type of the file as given by the client, if any.
    pub content_type: Option<String>,

    /// Contents of the file.
    pub data: Bytes,
}

impl UploadedFile {
    /// Returns the size of the file in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// An incoming HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: BTreeMap<String, String>,
    body: BTreeMap<String, String>,
    files: BTreeMap<String, UploadedFile>,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    session: Session,
}

impl Request {
    /// Creates a request for `method` on the already-normalized `path` with no input.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        session: Session,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::default(),
            body: BTreeMap::default(),
            files: BTreeMap::default(),
            headers,
            peer: None,
            session,
        }
    }

    /// Sets the query parameters of the request.
    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Sets the form fields sent in the body of the request.
    pub fn with_body(mut self, body: BTreeMap<String, String>) -> Self {
        self.body = body;
        self
    }

    /// Sets the files uploaded with the request.
    pub fn with_files(mut self, files: BTreeMap<String, UploadedFile>) -> Self {
        self.files = files;
        self
    }

    /// Sets the address of the peer that sent the request.
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns true if the request method is `method`, ignoring case.
    pub fn is_method(&self, method: &str) -> bool {
        self.method.as_str().eq_ignore_ascii_case(method)
    }

    /// Returns the decoded request path.
    pub fn uri(&self) -> &str {
        &self.path
    }

    /// Returns the query parameter `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns all query parameters.
    pub fn query_all(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Returns the body field `key`.
    pub fn post(&self, key: &str) -> Option<&str> {
        self.body.get(key).map(String::as_str)
    }

    /// Returns all body fields.
    pub fn post_all(&self) -> &BTreeMap<String, String> {
        &self.body
    }

    /// Returns the input `key` from the body or, if absent there, from the query string.
    pub fn input<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.post(key).or_else(|| self.query(key)).unwrap_or(default)
    }

    /// Returns the query parameters merged with the body fields.  Body fields win.
    pub fn all(&self) -> BTreeMap<String, String> {
        let mut all = self.query.clone();
        all.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// Returns the subset of `all()` whose keys are in `keys`.
    pub fn only(&self, keys: &[&str]) -> BTreeMap<String, String> {
        let mut all = self.all();
        all.retain(|k, _| keys.contains(&k.as_str()));
        all
    }

    /// Returns the subset of `all()` whose keys are not in `keys`.
    pub fn except(&self, keys: &[&str]) -> BTreeMap<String, String> {
        let mut all = self.all();
        all.retain(|k, _| !keys.contains(&k.as_str()));
        all
    }

    /// Returns the file uploaded under `key`.
    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key)
    }

    /// Returns true if a file with a name was uploaded under `key`.
    pub fn has_file(&self, key: &str) -> bool {
        self.file(key).and_then(|f| f.file_name.as_deref()).is_some_and(|name| !name.is_empty())
    }

    /// Returns true if any file was uploaded.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Returns the header `key`, matched case-insensitively, or `default` if it is absent or not
    /// valid text.
    pub fn header<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.headers.get(key).and_then(|v| v.to_str().ok()).unwrap_or(default)
    }

    /// Returns all request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns true if the request was issued by a script, as flagged by `X-Requested-With`.
    pub fn is_ajax(&self) -> bool {
        self.header("X-Requested-With", "").eq_ignore_ascii_case("XMLHttpRequest")
    }

    /// Returns the address of the client.
    ///
    /// Proxy headers are trusted: `Client-IP` wins, then the first address in `X-Forwarded-For`,
    /// then the address of the peer.
    pub fn ip(&self) -> String {
        if let Some(ip) = self.headers.get("Client-IP").and_then(|v| v.to_str().ok()) {
            return ip.trim().to_owned();
        }
        let forwarded = self
            .headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_owned();
        }
        match self.peer {
            Some(peer) => peer.ip().to_string(),
            None => "Unknown".to_owned(),
        }
    }

    /// Returns the page that linked to this request, if known.
    pub fn referer(&self) -> Option<&str> {
        self.headers.get(http::header::REFERER).and_then(|v| v.to_str().ok())
    }

    /// Returns the session of the client.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Validates all the request input against `rules`.  See `validate_data`.
    pub fn validate<R: RuleList>(&self, rules: &[(&str, R)]) -> SessionResult<bool> {
        self.validate_data(rules, &self.all())
    }

    /// Validates `data` against `rules`.
    ///
    /// On failure, `data` is recorded as the old input of the form at this request's path and the
    /// error messages are flashed under the `error` category so that the next page can show them.
    pub fn validate_data<R: RuleList>(
        &self,
        rules: &[(&str, R)],
        data: &BTreeMap<String, String>,
    ) -> SessionResult<bool> {
        match validation::validate(data, rules) {
            Ok(()) => Ok(true),
            Err(errors) => {
                self.session.set_old_input(&self.path, data)?;
                self.session.flash_error(errors)?;
                Ok(false)
            }
        }
    }

    /// Records `data` as the old input in the session, as submitted to this request's path.
    ///
    /// Without `data`, records `all()` unless the request carries no input at all.
    pub fn set_old_input(&self, data: Option<&BTreeMap<String, String>>) -> SessionResult<()> {
        match data {
            Some(data) => self.session.set_old_input(&self.path, data),
            None => {
                let all = self.all();
                if all.is_empty() { Ok(()) } else { self.session.set_old_input(&self.path, &all) }
            }
        }
    }
}
