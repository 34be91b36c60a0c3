pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod webhooks;

use crate::error::ApiError;

/// Parses a path segment, mapping failures to 400.
pub(crate) fn parse_id<T: std::str::FromStr>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id {raw:?}: {e}")))
}
