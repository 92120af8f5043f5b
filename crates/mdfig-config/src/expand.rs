//! `${VAR}` expansion for configuration strings.

use crate::ConfigError;

/// Lookup failure for a variable without a default.
struct Unset {
    name: String,
}

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// An unset variable is an error unless the reference carries a default.
/// Bare `$VAR` is left alone.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| -> Result<Option<String>, Unset> {
        match std::env::var(name) {
            Ok(found) => Ok(Some(found)),
            // `Ok(None)` makes shellexpand fall back to the default.
            Err(_) if value.contains(&format!("${{{name}:-")) => Ok(None),
            Err(_) => Err(Unset {
                name: name.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.name),
    })
}
