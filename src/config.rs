//! Configuration parsing.

use std::fs;
use std::path::Path;

use log::debug;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::models::Duration;

const INTERPOLATE_RE: &str = r"(?m)\$\{([A-Z][A-Z0-9_]*)(?:=([^}]+))?\}";

/// Process-wide configuration, typically read from a `.toml` file.
///
/// Values of the form `${VAR}` or `${VAR=default}` in the file are
/// interpolated from the environment before parsing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Configuration for the Redis key namespace.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Configuration for connecting to Redis.
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Config {
    /// Read configuration from a file into a new Config struct.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());

        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(err.to_string()),
        };

        let conf: Config = match toml::from_str(&Self::interpolate_env(&data)) {
            Ok(conf) => conf,
            Err(err) => return Err(err.to_string()),
        };

        Ok(conf)
    }

    /// Get the Redis URL to use for connecting to a Redis server, with the
    /// configured database selected.
    pub fn redis_url(&self) -> String {
        format!(
            "{}/{}",
            self.redis.url.trim_end_matches('/'),
            self.redis.database
        )
    }

    fn interpolate_env(raw_toml: &str) -> std::borrow::Cow<str> {
        let re = Regex::new(INTERPOLATE_RE).expect("failed to compile interpolation regex");

        re.replace_all(raw_toml, |captures: &Captures| {
            let var_name = captures.get(1).expect("capture should have at least 1 group");

            match std::env::var(var_name.as_str()) {
                Ok(env_val) => env_val,
                Err(_) => captures
                    .get(2)
                    .map_or_else(String::new, |v| v.as_str().to_owned()),
            }
        })
    }
}

/// Configuration for the Redis key namespace.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Prefix added to every Redis key written by this process. Avoids key
    /// collisions when the Redis server is shared with other applications.
    /// Defaults to "convoy:".
    pub prefix: String,

    /// How long a day's error log is kept before Redis expires it.
    /// Defaults to "7days".
    pub log_ttl: Duration,
}

impl Default for KeysConfig {
    fn default() -> Self {
        KeysConfig {
            prefix: "convoy:".to_owned(),
            log_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Configuration for connecting to Redis.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL to connect to. Defaults to "redis://127.0.0.1".
    pub url: String,

    /// Redis database to select. Defaults to 0.
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://127.0.0.1".to_owned(),
            database: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let conf = Config::default();
        assert_eq!(conf.keys.prefix, "convoy:");
        assert_eq!(conf.keys.log_ttl, Duration::from_secs(604_800));
        assert_eq!(conf.redis.url, "redis://127.0.0.1");
        assert_eq!(conf.redis.database, 0);
        assert_eq!(conf.redis_url(), "redis://127.0.0.1/0");
    }

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[keys]
prefix = "jobs:"

[redis]
url = "redis://convoy-redis"
"#;
        let conf: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(conf.keys.prefix, "jobs:");
        assert_eq!(conf.redis_url(), "redis://convoy-redis/0");
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[keys]
prefix = "myapp:convoy:"
log_ttl = "30days"

[redis]
url = "redis://example.com:6379"
database = 3
"#;
        let conf: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(conf.keys.prefix, "myapp:convoy:");
        assert_eq!(conf.keys.log_ttl, Duration::from_secs(2_592_000));
        assert_eq!(conf.redis_url(), "redis://example.com:6379/3");
    }

    #[test]
    fn interpolation_regex_no_match() {
        let re = Regex::new(INTERPOLATE_RE).unwrap();
        assert!(re.captures("").is_none());
        assert!(re.captures("foo").is_none());
        assert!(re.captures("{foo").is_none());
        assert!(re.captures("${foo}").is_none());
        assert!(re.captures("${123FOO}").is_none());
    }

    #[test]
    fn interpolation_regex_match() {
        let re = Regex::new(INTERPOLATE_RE).unwrap();
        let capture = re.captures("prefix = \"${VALUE}\"").unwrap();
        assert_eq!(capture.get(1).unwrap().as_str(), "VALUE");

        let capture = re.captures("prefix = \"${VALUE=convoy:}\"").unwrap();
        assert_eq!(capture.get(1).unwrap().as_str(), "VALUE");
        assert_eq!(capture.get(2).unwrap().as_str(), "convoy:");
    }

    #[test]
    fn interpolation_from_env_defaults() {
        let conf = r#"
[keys]
prefix = "${CONVOYTEST_PREFIX=convoy:}"

[redis]
url = "redis://${CONVOYTEST_REDIS_HOST=localhost}:${CONVOYTEST_REDIS_PORT=6379}"
database = ${CONVOYTEST_REDIS_DB=0}
        "#;

        let expected = r#"
[keys]
prefix = "convoy:"

[redis]
url = "redis://localhost:6379"
database = 0
        "#;

        assert_eq!(Config::interpolate_env(conf), expected);
    }

    #[test]
    fn interpolation_from_env() {
        std::env::set_var("CONVOYTEST_B_PREFIX", "staging:");
        std::env::set_var("CONVOYTEST_B_REDIS_HOST", "example.com");

        let conf = r#"
[keys]
prefix = "${CONVOYTEST_B_PREFIX=convoy:}"

[redis]
url = "redis://${CONVOYTEST_B_REDIS_HOST=localhost}:${CONVOYTEST_B_REDIS_PORT=6379}"
        "#;

        let expected = r#"
[keys]
prefix = "staging:"

[redis]
url = "redis://example.com:6379"
        "#;

        assert_eq!(Config::interpolate_env(conf), expected);
    }
}
