//! Small helper for the environment-variable-with-default config pattern
//! used by every service's config module.

use std::env;
use std::str::FromStr;

/// Parse an environment variable, falling back to `default` when unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Read an environment variable as a string, falling back to `default` when unset.
pub fn env_or_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a comma-separated environment variable into a `Vec<String>`, trimming
/// whitespace and dropping empty entries. Falls back to `default` when unset.
pub fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_when_unset() {
        assert_eq!(env_or::<u64>("GLADYS_TEST_UNSET_VAR_XYZ", 42), 42);
    }

    #[test]
    fn test_env_csv_default_when_unset() {
        let v = env_csv("GLADYS_TEST_UNSET_CSV_XYZ", &["undo", "revert"]);
        assert_eq!(v, vec!["undo".to_string(), "revert".to_string()]);
    }

    #[test]
    fn test_env_csv_parses_and_trims() {
        std::env::set_var("GLADYS_TEST_CSV_VAR", "a, b ,c");
        let v = env_csv("GLADYS_TEST_CSV_VAR", &[]);
        assert_eq!(v, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        std::env::remove_var("GLADYS_TEST_CSV_VAR");
    }
}
