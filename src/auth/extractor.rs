//! Bearer credential extraction from HTTP request headers.

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::auth::error::{AuthErrorKind, AuthorizationError};
use crate::types::RawCredential;

const BEARER_SCHEME: &str = "bearer";

/// Pull the bearer token out of the `Authorization` header.
///
/// The header must consist of exactly two whitespace-separated parts, the
/// first of which is `Bearer` (any case). The token is returned verbatim,
/// whatever its length.
pub fn extract(headers: &HeaderMap) -> Result<RawCredential, AuthorizationError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthorizationError::new(AuthErrorKind::MissingAuthHeader))?;

    let header = value.to_str().map_err(|_| {
        AuthorizationError::with_description(
            AuthErrorKind::MalformedAuthHeader,
            "Authorization header contains invalid characters.",
        )
    })?;

    let parts: Vec<&str> = header.split_whitespace().collect();
    let [scheme, token] = parts.as_slice() else {
        return Err(AuthorizationError::new(AuthErrorKind::MalformedAuthHeader));
    };

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthorizationError::with_description(
            AuthErrorKind::MalformedAuthHeader,
            "Authorization header must have bearer keyword.",
        ));
    }

    RawCredential::new(*token)
        .ok_or_else(|| AuthorizationError::new(AuthErrorKind::MalformedAuthHeader))
}
