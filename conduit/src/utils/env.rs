//! Environment variable helpers for the configuration overlay.

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or return `default`.
///
/// Unset and unparsable values both fall back to the default.
pub(crate) fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get an environment variable parsed as `T`, if set and valid.
pub(crate) fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_falls_back_to_default() {
        let value: usize = env_get("__CONDUIT_TEST_UNSET__", 42);
        assert_eq!(value, 42);

        let value: Option<u16> = env_get_opt("__CONDUIT_TEST_UNSET__");
        assert_eq!(value, None);
    }
}
