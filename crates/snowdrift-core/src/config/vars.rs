//! Environment variable interpolation for config files.
//!
//! - `$VAR` and `${VAR}` substitute the variable and fail when it is unset
//! - `${VAR:-fallback}` uses the fallback when VAR is unset or empty
//! - `${VAR-fallback}` uses the fallback only when VAR is unset
//! - `$$` is a literal `$`, for file patterns anchored at the end
//!
//! Tokens and storage credentials are expected to arrive this way rather than
//! being written into the YAML itself.

use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{(?P<braced>\w+)(?:(?P<op>:?-)(?P<fallback>[^}]*))?\}|\$(?P<bare>[A-Za-z_]\w*)")
        .expect("placeholder pattern is valid")
});

/// Substitute environment variables in `input`.
///
/// Every unset variable is reported in one error.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let text = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        let fallback = caps.name("fallback").map(|m| m.as_str());
        let empty_is_unset = caps.name("op").is_some_and(|op| op.as_str() == ":-");

        match (env::var(name.as_str()), fallback) {
            (Ok(value), Some(fallback)) if value.is_empty() && empty_is_unset => fallback.to_string(),
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.to_string(),
            (Err(_), None) => {
                missing.push(name.as_str().to_string());
                caps[0].to_string()
            }
        }
    });

    if missing.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(ConfigError::EnvInterpolation {
            message: format!("environment variable(s) not set: {}", missing.join(", ")),
        })
    }
}
