//! Environment variable loading utilities
//!
//! Typed lookups with fallback defaults, used by the configuration layer.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Load an environment variable with a string default
pub fn load_env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable with type conversion and default
pub fn load_env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load an environment variable as an `Option<T>`
pub fn load_env_optional<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for loading multiple environment variables with consistent prefix
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string value with default
    pub fn load_string(&self, suffix: &str, default: &str) -> String {
        load_env_string(&self.key(suffix), default)
    }

    /// Load a parsed value with default
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        load_env_parsed(&self.key(suffix), default)
    }

    /// Load an optional value
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        load_env_optional(&self.key(suffix))
    }

    /// Load a duration expressed in milliseconds
    pub fn load_duration_ms(&self, suffix: &str, default: Duration) -> Duration {
        let millis = self.load_parsed(suffix, default.as_millis() as u64);
        Duration::from_millis(millis)
    }

    /// Load a duration expressed in whole seconds
    pub fn load_duration_secs(&self, suffix: &str, default: Duration) -> Duration {
        let secs = self.load_parsed(suffix, default.as_secs());
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_env_string() {
        let key = "CATALOG_SEARCH_TEST_STRING_VAR";
        let default = "default_value";

        env::remove_var(key);
        assert_eq!(load_env_string(key, default), default);

        env::set_var(key, "test_value");
        assert_eq!(load_env_string(key, default), "test_value");

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_load_env_parsed_falls_back_on_garbage() {
        let key = "CATALOG_SEARCH_TEST_PARSED_VAR";

        env::set_var(key, "not-a-number");
        assert_eq!(load_env_parsed(key, 42u32), 42);

        env::set_var(key, "7");
        assert_eq!(load_env_parsed(key, 42u32), 7);

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_env_loader_prefix_and_durations() {
        let loader = EnvLoader::new("CATALOG_SEARCH_TEST");
        env::set_var("CATALOG_SEARCH_TEST_TIMEOUT_MS", "250");
        env::set_var("CATALOG_SEARCH_TEST_TTL_SECONDS", "90");

        assert_eq!(
            loader.load_duration_ms("TIMEOUT_MS", Duration::from_secs(1)),
            Duration::from_millis(250)
        );
        assert_eq!(
            loader.load_duration_secs("TTL_SECONDS", Duration::from_secs(10)),
            Duration::from_secs(90)
        );
        assert_eq!(loader.load_optional::<u32>("MISSING"), None);

        env::remove_var("CATALOG_SEARCH_TEST_TIMEOUT_MS");
        env::remove_var("CATALOG_SEARCH_TEST_TTL_SECONDS");
    }
}
