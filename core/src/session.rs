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

//! Per-client sessions and flash messages.
//!
//! A session is a key/value store that survives across requests of the same client, which is
//! identified by a cookie.  On top of arbitrary application keys, sessions hold two well-known
//! entries:
//!
//! *   `old`: the input of the last submitted form, used to refill it after a failed validation.
//!     `old.form` records the path that the form was submitted to.
//! *   `flash.<category>`: lists of messages that are shown once.  Reading them removes them.

use crate::config::SessionConfig;
use async_session::{MemoryStore, SessionStore as _};
use http::HeaderMap;
use http::header::COOKIE;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key holding the last submitted form input.
const OLD_KEY: &str = "old";

/// Key holding the path that the last form input was submitted to.
const OLD_FORM_KEY: &str = "old.form";

/// Prefix of the keys holding flash messages.
const FLASH_PREFIX: &str = "flash.";

/// Session errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    /// A value could not be serialized for storage.
    #[error("Cannot serialize session value for {key}: {message}")]
    Serialize {
        /// Key being written.
        key: String,

        /// Details about the failure.
        message: String,
    },

    /// The backing store failed.
    #[error("Session store error: {0}")]
    Store(String),
}

/// Result type for this module.
pub type SessionResult<T> = Result<T, SessionError>;

/// Returns the session key that holds the flash messages of `category`.
fn flash_key(category: &str) -> String {
    format!("{}{}", FLASH_PREFIX, category)
}

/// Handle to the session of the current request.
///
/// Clones refer to the same session.  The handle is meant to be used from a single request at a
/// time and its lock is never held across suspension points.
#[derive(Clone, Debug)]
pub struct Session(Arc<Mutex<async_session::Session>>);

impl Default for Session {
    fn default() -> Self {
        Self::from(async_session::Session::new())
    }
}

impl From<async_session::Session> for Session {
    fn from(inner: async_session::Session) -> Self {
        Self(Arc::from(Mutex::from(inner)))
    }
}

impl Session {
    /// Locks the underlying session.  A poisoned lock is recovered because session data is
    /// always left consistent between individual operations.
    fn lock(&self) -> MutexGuard<'_, async_session::Session> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value stored under `key`, if any and if it has the expected type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lock().get(key)
    }

    /// Stores `value` under `key`.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SessionResult<()> {
        self.lock().insert(key, value).map_err(|e| SessionError::Serialize {
            key: key.to_owned(),
            message: e.to_string(),
        })
    }

    /// Removes the value stored under `key`, if any.
    pub fn forget(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Returns the value of the input field `key` as last submitted.
    pub fn old(&self, key: &str) -> Option<String> {
        self.old_input().remove(key)
    }

    /// Returns all the input fields as last submitted, regardless of the form they came from.
    pub fn old_input(&self) -> BTreeMap<String, String> {
        self.get(OLD_KEY).unwrap_or_default()
    }

    /// Returns the input fields as last submitted, but only if they were submitted to `form`.
    ///
    /// Pages that prefill a form should use this instead of `old_input` so that a rejected
    /// submission of one form does not leak into another.
    pub fn old_input_for(&self, form: &str) -> BTreeMap<String, String> {
        match self.get::<String>(OLD_FORM_KEY) {
            Some(origin) if origin == form => self.old_input(),
            _ => BTreeMap::default(),
        }
    }

    /// Records `data` as the last input submitted to the path `form`.
    pub fn set_old_input(&self, form: &str, data: &BTreeMap<String, String>) -> SessionResult<()> {
        self.put(OLD_KEY, data)?;
        self.put(OLD_FORM_KEY, form)
    }

    /// Forgets the last submitted input.
    pub fn clear_old_input(&self) {
        self.forget(OLD_KEY);
        self.forget(OLD_FORM_KEY);
    }

    /// Replaces the flash messages of `category` with `messages`.
    pub fn flash<S: Into<String>, I: IntoIterator<Item = S>>(
        &self,
        category: &str,
        messages: I,
    ) -> SessionResult<()> {
        let messages = messages.into_iter().map(Into::into).collect::<Vec<String>>();
        self.put(&flash_key(category), &messages)
    }

    /// Replaces the `error` flash messages.
    pub fn flash_error<S: Into<String>, I: IntoIterator<Item = S>>(
        &self,
        messages: I,
    ) -> SessionResult<()> {
        self.flash("error", messages)
    }

    /// Replaces the `success` flash messages.
    pub fn flash_success<S: Into<String>, I: IntoIterator<Item = S>>(
        &self,
        messages: I,
    ) -> SessionResult<()> {
        self.flash("success", messages)
    }

    /// Returns the flash messages of `category` and removes them from the session.
    pub fn take_flash(&self, category: &str) -> Vec<String> {
        let key = flash_key(category);
        let mut inner = self.lock();
        let messages = inner.get::<Vec<String>>(&key).unwrap_or_default();
        inner.remove(&key);
        messages
    }

    /// Returns true if there are flash messages of `category` waiting to be taken.
    pub fn has_flash(&self, category: &str) -> bool {
        self.get::<Vec<String>>(&flash_key(category)).is_some_and(|m| !m.is_empty())
    }

    /// Moves the underlying session out of the handle, leaving a blank one behind.
    ///
    /// Clones of a new session lack the cookie value that the store hands out for it.
    fn take(&self) -> async_session::Session {
        std::mem::replace(&mut *self.lock(), async_session::Session::new())
    }
}

/// Extracts the value of the cookie `name` from the request `headers`.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
}

/// Keeps the sessions of all clients and maps them to and from cookies.
#[derive(Clone, Debug)]
pub struct SessionStore {
    /// Storage for the sessions.
    store: MemoryStore,

    /// Settings of the session cookie.
    config: SessionConfig,
}

impl SessionStore {
    /// Creates an empty in-memory store whose sessions follow `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self { store: MemoryStore::new(), config }
    }

    /// Returns the session identified by the cookie in the request `headers`, or a new session if
    /// there is no cookie or if it does not refer to a live session.
    pub async fn load(&self, headers: &HeaderMap) -> Session {
        if let Some(value) = cookie_value(headers, &self.config.cookie) {
            match self.store.load_session(value).await {
                Ok(Some(session)) => return Session::from(session),
                Ok(None) => debug!("Session cookie refers to an unknown or expired session"),
                Err(e) => warn!("Failed to load session; starting a new one: {}", e),
            }
        }

        let mut session = async_session::Session::new();
        session.expire_in(self.config.ttl);
        Session::from(session)
    }

    /// Persists `session` if it has changes and returns the `Set-Cookie` header value to send
    /// back, if the store hands out a cookie for it.
    ///
    /// This consumes the contents of `session`: all of its handles are left empty afterwards.
    pub async fn save(&self, session: &Session) -> SessionResult<Option<String>> {
        let inner = session.take();
        if !inner.data_changed() {
            return Ok(None);
        }

        let value = self
            .store
            .store_session(inner)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        Ok(value.map(|value| self.set_cookie(&value)))
    }

    /// Formats the `Set-Cookie` header value that carries the session identifier `value`.
    fn set_cookie(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.config.cookie,
            value,
            self.config.ttl.as_secs()
        );
        if self.config.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Removes expired sessions from the store.
    pub async fn cleanup(&self) -> SessionResult<()> {
        self.store.cleanup().await.map_err(|e| SessionError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::time::Duration;

    #[test]
    fn test_get_put_forget() {
        let session = Session::default();
        assert_eq!(None, session.get::<String>("user"));

        session.put("user", "ann").unwrap();
        assert_eq!(Some("ann".to_owned()), session.get::<String>("user"));
        assert_eq!(None, session.get::<i32>("user"));

        session.forget("user");
        assert_eq!(None, session.get::<String>("user"));
    }

    #[test]
    fn test_clones_share_data() {
        let session = Session::default();
        let other = session.clone();
        session.put("n", &3).unwrap();
        assert_eq!(Some(3), other.get::<i32>("n"));
    }

    #[test]
    fn test_old_input() {
        let session = Session::default();
        assert!(session.old_input().is_empty());
        assert_eq!(None, session.old("email"));

        let mut data = BTreeMap::new();
        data.insert("email".to_owned(), "ann@example.com".to_owned());
        session.set_old_input("/users", &data).unwrap();
        assert_eq!(Some("ann@example.com".to_owned()), session.old("email"));
        assert_eq!(data, session.old_input());
        assert_eq!(data, session.old_input_for("/users"));
        assert!(session.old_input_for("/users/1").is_empty());

        // Old input is not consumed by reading it.
        assert_eq!(Some("ann@example.com".to_owned()), session.old("email"));

        session.clear_old_input();
        assert!(session.old_input().is_empty());
        assert!(session.old_input_for("/users").is_empty());
    }

    #[test]
    fn test_old_input_replaced_by_other_form() {
        let session = Session::default();
        let mut data = BTreeMap::new();
        data.insert("name".to_owned(), "first".to_owned());
        session.set_old_input("/users", &data).unwrap();

        data.insert("name".to_owned(), "second".to_owned());
        session.set_old_input("/users/7", &data).unwrap();
        assert!(session.old_input_for("/users").is_empty());
        assert_eq!(Some("second".to_owned()), session.old_input_for("/users/7").remove("name"));
    }

    #[test]
    fn test_flash_consumed_once() {
        let session = Session::default();
        session.flash_error(["first", "second"]).unwrap();
        assert!(session.has_flash("error"));
        assert!(!session.has_flash("success"));

        assert_eq!(vec!["first".to_owned(), "second".to_owned()], session.take_flash("error"));
        assert!(session.take_flash("error").is_empty());
        assert!(!session.has_flash("error"));
    }

    #[test]
    fn test_flash_replaces() {
        let session = Session::default();
        session.flash_success(["one"]).unwrap();
        session.flash_success(vec!["two".to_owned()]).unwrap();
        assert_eq!(vec!["two".to_owned()], session.take_flash("success"));
    }

    #[test]
    fn test_flash_empty_is_not_pending() {
        let session = Session::default();
        session.flash("info", Vec::<String>::new()).unwrap();
        assert!(!session.has_flash("info"));
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(None, cookie_value(&headers, "sid"));

        headers.append(COOKIE, HeaderValue::from_static("a=1; sid=abc=="));
        headers.append(COOKIE, HeaderValue::from_static("other=2"));
        assert_eq!(Some("abc==".to_owned()), cookie_value(&headers, "sid"));
        assert_eq!(Some("2".to_owned()), cookie_value(&headers, "other"));
        assert_eq!(None, cookie_value(&headers, "missing"));
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = SessionStore::new(SessionConfig {
            cookie: "sid".to_owned(),
            ttl: Duration::from_secs(60),
            secure: true,
        });

        let session = store.load(&HeaderMap::new()).await;
        session.flash_success(["Saved"]).unwrap();
        let set_cookie = store.save(&session).await.unwrap().unwrap();
        assert!(set_cookie.starts_with("sid="));
        assert!(set_cookie.ends_with("; Path=/; Max-Age=60; HttpOnly; SameSite=Strict; Secure"));

        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        let session = store.load(&headers).await;
        assert_eq!(vec!["Saved".to_owned()], session.take_flash("success"));

        store.save(&session).await.unwrap();
        let session = store.load(&headers).await;
        assert!(!session.has_flash("success"));
    }

    #[tokio::test]
    async fn test_store_new_session_saved_through_clone() {
        let store = SessionStore::new(SessionConfig::default());

        let session = store.load(&HeaderMap::new()).await;
        let handle = session.clone();
        let data = BTreeMap::from([("n".to_owned(), "1".to_owned())]);
        handle.set_old_input("/users", &data).unwrap();
        let set_cookie = store.save(&session).await.unwrap().unwrap();
        assert!(set_cookie.starts_with("mvcsimple_session="));
        assert!(handle.old_input().is_empty());

        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        let session = store.load(&headers).await;
        assert_eq!(Some("1".to_owned()), session.old_input_for("/users").remove("n"));

        // The client already holds the cookie of a loaded session.
        session.clear_old_input();
        assert_eq!(None, store.save(&session).await.unwrap());
        let session = store.load(&headers).await;
        assert!(session.old_input().is_empty());
    }

    #[tokio::test]
    async fn test_store_unchanged_session_not_persisted() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.load(&HeaderMap::new()).await;
        assert_eq!(None, store.save(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_unknown_cookie_starts_new_session() {
        let store = SessionStore::new(SessionConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("mvcsimple_session=bogus"));
        let session = store.load(&headers).await;
        assert!(session.old_input().is_empty());
        store.cleanup().await.unwrap();
    }
}
