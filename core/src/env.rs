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

//! Utilities to deal with environment variables.
//!
//! Variables are looked up in the process environment first and then in the contents of the
//! `.env` file loaded by `load_dotenv`, if any.  The process environment always wins so that a
//! deployment can override what the file says without editing it.

use log::{debug, warn};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Result type for environment errors.
type Result<T> = std::result::Result<T, String>;

/// Variables loaded from a `.env` file.  Set at most once per process.
static DOTENV: OnceLock<HashMap<String, String>> = OnceLock::new();

/// Wrapper around an environment variable's value to support conversions to other types.
pub struct Value(String);

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        Ok(value.0)
    }
}

impl TryFrom<Value> for PathBuf {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        Ok(PathBuf::from(value.0))
    }
}

impl TryFrom<Value> for bool {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value.0.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(format!("Invalid bool: '{}' is not a boolean", other)),
        }
    }
}

/// Generates a `TryFrom<Value>` for a type that can be parsed by `FromStr`.
macro_rules! tryfrom_value_for_fromstr [
    ( $t:ty ) => {
        impl TryFrom<Value> for $t {
            type Error = String;

            fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
                value.0.parse::<$t>().map_err(|e| format!("Invalid {}: {}", stringify!($t), e))
            }
        }
    }
];

tryfrom_value_for_fromstr!(i32);
tryfrom_value_for_fromstr!(i64);
tryfrom_value_for_fromstr!(u16);
tryfrom_value_for_fromstr!(u32);
tryfrom_value_for_fromstr!(u64);
tryfrom_value_for_fromstr!(usize);
tryfrom_value_for_fromstr!(SocketAddr);

/// Parses the contents of a `.env` file.
///
/// Every non-empty line that is not a `#` comment must have the form `KEY=VALUE`, optionally
/// prefixed by `export`.  Values wrapped in matching single or double quotes are unquoted.
fn parse_dotenv(contents: &str) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::default();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => return Err(format!("Invalid line {} in .env file: missing '='", i + 1)),
        };
        if key.is_empty() {
            return Err(format!("Invalid line {} in .env file: empty key", i + 1));
        }

        let value = match (value.chars().next(), value.chars().last()) {
            (Some('"'), Some('"')) | (Some('\''), Some('\'')) if value.len() >= 2 => {
                &value[1..value.len() - 1]
            }
            _ => value,
        };
        vars.insert(key.to_owned(), value.to_owned());
    }
    Ok(vars)
}

/// Loads the `.env` file at `path` so that its variables become visible to the getters in this
/// module.
///
/// A missing file is not an error because deployments commonly configure everything through the
/// real environment.  Only the first successful call has any effect.
pub fn load_dotenv<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No environment file at {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(format!("Cannot read {}: {}", path.display(), e)),
    };

    let vars = parse_dotenv(&contents)?;
    debug!("Loaded {} variables from {}", vars.len(), path.display());
    if DOTENV.set(vars).is_err() {
        warn!("Environment file already loaded; ignoring {}", path.display());
    }
    Ok(())
}

/// Looks up the raw value of the variable `name`.
fn lookup(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => {
            Ok(DOTENV.get().and_then(|vars| vars.get(name)).cloned())
        }
        Err(env::VarError::NotUnicode(_)) => {
            Err(format!("Invalid value in environment variable {}", name))
        }
    }
}

/// Converts the raw `value` of the variable `name` to the target type `T`.
fn convert<T: TryFrom<Value, Error = String>>(name: &str, value: String) -> Result<T> {
    Value(value)
        .try_into()
        .map_err(|e| format!("Invalid type in environment variable {}: {}", name, e))
}

/// Gets a required environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
pub fn get_required_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<T> {
    let name = format!("{}_{}", prefix, suffix);
    match lookup(&name)? {
        Some(value) => convert(&name, value),
        None => Err(format!("Required environment variable {} not present", name)),
    }
}

/// Gets an optional environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
pub fn get_optional_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<Option<T>> {
    let name = format!("{}_{}", prefix, suffix);
    match lookup(&name)? {
        Some(value) => convert(&name, value).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_value_to_string() {
        assert_eq!("foo bar", &TryInto::<String>::try_into(Value("foo bar".to_owned())).unwrap());
    }

    #[test]
    fn test_value_to_fromstr() {
        assert_eq!(1234u16, TryInto::<u16>::try_into(Value("1234".to_owned())).unwrap());

        let err = TryInto::<u16>::try_into(Value("-1".to_owned())).unwrap_err();
        assert!(err.starts_with("Invalid u16:"));
    }

    #[test]
    fn test_value_to_bool() {
        for raw in ["1", "true", "TRUE", "yes", "on"] {
            assert!(TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap(), "{}", raw);
        }
        for raw in ["", "0", "false", "No", "off"] {
            assert!(!TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap(), "{}", raw);
        }
        let err = TryInto::<bool>::try_into(Value("maybe".to_owned())).unwrap_err();
        assert!(err.starts_with("Invalid bool:"));
    }

    #[test]
    fn test_get_required_var_ok() {
        temp_env::with_var("PREFIX_PRESENT", Some("1234"), || {
            assert_eq!("1234", &get_required_var::<String>("PREFIX", "PRESENT").unwrap());
        });
    }

    #[test]
    fn test_get_required_var_missing() {
        temp_env::with_var_unset("PREFIX_MISSING", || {
            assert_eq!(
                "Required environment variable PREFIX_MISSING not present",
                &get_required_var::<String>("PREFIX", "MISSING").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_not_utf8() {
        temp_env::with_var("PREFIX_INVALID", Some(OsStr::from_bytes(b"\xc3\x28")), || {
            assert_eq!(
                "Invalid value in environment variable PREFIX_INVALID",
                &get_required_var::<String>("PREFIX", "INVALID").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_bad_type() {
        temp_env::with_var("PREFIX_BAD", Some("b4d"), || {
            let err = get_required_var::<u16>("PREFIX", "BAD").unwrap_err();
            assert!(
                err.starts_with("Invalid type in environment variable PREFIX_BAD: Invalid u16")
            );
        });
    }

    #[test]
    fn test_get_optional_var_present_and_missing() {
        temp_env::with_vars([("OPT_SET", Some("42")), ("OPT_UNSET", None)], || {
            assert_eq!(Some(42u32), get_optional_var::<u32>("OPT", "SET").unwrap());
            assert_eq!(None, get_optional_var::<u32>("OPT", "UNSET").unwrap());
        });
    }

    #[test]
    fn test_parse_dotenv_ok() {
        let vars = parse_dotenv(
            "# A comment\n\
             APP_NAME=MVCSimple\n\
             \n\
             export APP_ENV = production\n\
             DB_PASS=\"with spaces\"\n\
             DB_USER='root'\n\
             EMPTY=\n",
        )
        .unwrap();
        assert_eq!(5, vars.len());
        assert_eq!("MVCSimple", vars["APP_NAME"]);
        assert_eq!("production", vars["APP_ENV"]);
        assert_eq!("with spaces", vars["DB_PASS"]);
        assert_eq!("root", vars["DB_USER"]);
        assert_eq!("", vars["EMPTY"]);
    }

    #[test]
    fn test_parse_dotenv_errors() {
        assert_eq!(
            "Invalid line 2 in .env file: missing '='",
            parse_dotenv("A=b\njust text\n").unwrap_err()
        );
        assert_eq!("Invalid line 1 in .env file: empty key", parse_dotenv("=value").unwrap_err());
    }

    #[test]
    fn test_load_dotenv_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        load_dotenv(dir.path().join(".env")).unwrap();
    }
}
