use std::env::var;
use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;

/// Get the value of ENV var, or a default
///
/// Only when:
/// - It is set
/// - It is not empty
pub fn env_var_or_else(var_name: &'static str, or_else: fn() -> String) -> String {
    env_var(var_name).unwrap_or_else(or_else)
}

/// Get the value of ENV var, when set and not empty
pub fn env_var(var_name: &'static str) -> Option<String> {
    var(var_name).ok().filter(|value| !value.is_empty())
}

/// Parse the value of ENV var, or use a default when it is not set
///
/// An unparsable value is an error, not a reason to fall back to the default
pub fn env_var_parse<T>(var_name: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_var(var_name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid value for `{var_name}`: {value}")),
        None => Ok(default),
    }
}
