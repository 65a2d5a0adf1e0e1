//! Shared utility functions for service adapters.

use ca_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`]. Adapters re-wrap these into their service-specific
/// variants at the call site.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve an API key from the environment. An empty variable name means
/// the backend is unauthenticated.
pub(crate) fn resolve_api_key(env_var: &str) -> Option<String> {
    if env_var.is_empty() {
        return None;
    }
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => Some(key),
        _ => {
            tracing::warn!(
                env_var = env_var,
                "API key env var not set — calling backend unauthenticated"
            );
            None
        }
    }
}
