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

//! Application-wide configuration.

use crate::env::get_optional_var;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a session cookie: 30 days.
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 30;

/// Deployment environment the application runs in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Environment {
    /// Production deployment.  Internal error details are hidden from responses.
    Production,

    /// Any other deployment, named by its `APP_ENV` value (`local`, `staging`, ...).
    Other(String),
}

impl Environment {
    /// Interprets the raw value of `APP_ENV`.
    pub(crate) fn parse(raw: &str) -> Self {
        match raw {
            "production" => Environment::Production,
            other => Environment::Other(other.to_owned()),
        }
    }

    /// Returns the name of the environment as configured.
    pub fn as_str(&self) -> &str {
        match self {
            Environment::Production => "production",
            Environment::Other(name) => name,
        }
    }
}

/// Settings for the session cookie.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    /// Name of the cookie that carries the session identifier.
    pub cookie: String,

    /// How long sessions and their cookies live.
    pub ttl: Duration,

    /// Whether the cookie should only travel over HTTPS.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: "mvcsimple_session".to_owned(),
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            secure: false,
        }
    }
}

impl SessionConfig {
    /// Initializes the session settings from `SESSION_COOKIE`, `SESSION_TTL` (in seconds) and
    /// `SESSION_SECURE`.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            cookie: get_optional_var::<String>("SESSION", "COOKIE")?.unwrap_or(defaults.cookie),
            ttl: get_optional_var::<u64>("SESSION", "TTL")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            secure: get_optional_var::<bool>("SESSION", "SECURE")?.unwrap_or(defaults.secure),
        })
    }
}

/// Configuration of the application, typically gathered from `APP_*` variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppConfig {
    /// Human-readable name of the application.  Exposed to templates as `app.name`.
    pub name: String,

    /// The deployment environment.
    pub environment: Environment,

    /// Whether debugging aids (such as verbose template errors) are enabled.
    pub debug: bool,

    /// IANA name of the timezone the application reports times in.  Exposed to templates as
    /// `app.timezone`.
    pub timezone: String,

    /// Directory holding the view templates.
    pub views_dir: PathBuf,

    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Session cookie settings.
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "MVCSimple".to_owned(),
            environment: Environment::Other("local".to_owned()),
            debug: false,
            timezone: "UTC".to_owned(),
            views_dir: PathBuf::from("views"),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Initializes the configuration from the environment, falling back to the defaults for any
    /// variable that is not set.
    ///
    /// This will use variables such as `APP_NAME`, `APP_ENV`, `APP_DEBUG`, `APP_TIMEZONE`,
    /// `APP_VIEWS_DIR` and `APP_BIND`, plus the `SESSION_*` family.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            name: get_optional_var::<String>("APP", "NAME")?.unwrap_or(defaults.name),
            environment: get_optional_var::<String>("APP", "ENV")?
                .map(|raw| Environment::parse(&raw))
                .unwrap_or(defaults.environment),
            debug: get_optional_var::<bool>("APP", "DEBUG")?.unwrap_or(defaults.debug),
            timezone: get_optional_var::<String>("APP", "TIMEZONE")?.unwrap_or(defaults.timezone),
            views_dir: get_optional_var::<PathBuf>("APP", "VIEWS_DIR")?
                .unwrap_or(defaults.views_dir),
            bind_addr: get_optional_var::<SocketAddr>("APP", "BIND")?
                .unwrap_or(defaults.bind_addr),
            session: SessionConfig::from_env()?,
        })
    }

    /// Returns true if the application runs in production.
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Returns true if debugging aids should be enabled, which never happens in production.
    pub fn debug_enabled(&self) -> bool {
        self.debug && !self.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Names of all variables read by `AppConfig::from_env`.
    const ALL_VARS: &[&str] = &[
        "APP_NAME",
        "APP_ENV",
        "APP_DEBUG",
        "APP_TIMEZONE",
        "APP_VIEWS_DIR",
        "APP_BIND",
        "SESSION_COOKIE",
        "SESSION_TTL",
        "SESSION_SECURE",
    ];

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(ALL_VARS, || {
            assert_eq!(AppConfig::default(), AppConfig::from_env().unwrap());
        });
    }

    #[test]
    fn test_from_env_all_present() {
        temp_env::with_vars(
            [
                ("APP_NAME", Some("Directory")),
                ("APP_ENV", Some("production")),
                ("APP_DEBUG", Some("true")),
                ("APP_TIMEZONE", Some("Asia/Ho_Chi_Minh")),
                ("APP_VIEWS_DIR", Some("/srv/views")),
                ("APP_BIND", Some("0.0.0.0:8080")),
                ("SESSION_COOKIE", Some("sid")),
                ("SESSION_TTL", Some("60")),
                ("SESSION_SECURE", Some("1")),
            ],
            || {
                let config = AppConfig::from_env().unwrap();
                assert_eq!(
                    AppConfig {
                        name: "Directory".to_owned(),
                        environment: Environment::Production,
                        debug: true,
                        timezone: "Asia/Ho_Chi_Minh".to_owned(),
                        views_dir: PathBuf::from("/srv/views"),
                        bind_addr: "0.0.0.0:8080".parse().unwrap(),
                        session: SessionConfig {
                            cookie: "sid".to_owned(),
                            ttl: Duration::from_secs(60),
                            secure: true,
                        },
                    },
                    config
                );
                assert!(config.is_production());
                assert!(!config.debug_enabled());
            },
        );
    }

    #[test]
    fn test_from_env_bad_type() {
        temp_env::with_var("APP_DEBUG", Some("sometimes"), || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.contains("APP_DEBUG"));
            assert!(err.contains("Invalid bool"));
        });
    }

    #[test]
    fn test_debug_enabled_outside_production() {
        let config = AppConfig { debug: true, ..Default::default() };
        assert!(!config.is_production());
        assert!(config.debug_enabled());
        assert_eq!("local", config.environment.as_str());
    }
}
