//! Authorization error taxonomy.
//!
//! Every failure inside the auth core ends up as an [`AuthorizationError`].
//! Raw library errors (jsonwebtoken, reqwest, serde) are logged where they
//! occur and never copied into the description handed to clients.

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;

/// The kind of authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// No `Authorization` header on the request.
    MissingAuthHeader,
    /// Header present but not of the shape `Bearer <token>`.
    MalformedAuthHeader,
    /// Token header unparseable or without a key id.
    InvalidHeader,
    /// No signing key matches the token's key id, even after a refresh.
    KeyNotFound,
    /// The key endpoint is unreachable, slow, or returned garbage.
    KeyDirectoryUnavailable,
    /// Signature mismatch or disallowed algorithm.
    InvalidSignature,
    /// The token is at or past its expiry.
    TokenExpired,
    /// Audience, issuer or another standard claim is wrong or missing.
    InvalidClaims,
    /// Anything else that went wrong while processing the token.
    TokenUnprocessable,
    /// The token has no `permissions` claim at all.
    PermissionsClaimMissing,
    /// The `permissions` claim lacks the required permission.
    PermissionDenied,
}

impl AuthErrorKind {
    /// Machine-readable code surfaced in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader => "authorization_header_missing",
            Self::MalformedAuthHeader => "malformed_authorization_header",
            Self::InvalidHeader => "invalid_header",
            Self::KeyNotFound => "key_not_found",
            Self::KeyDirectoryUnavailable => "key_directory_unavailable",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims => "invalid_claims",
            Self::TokenUnprocessable => "token_unprocessable",
            Self::PermissionsClaimMissing => "invalid_permissions",
            Self::PermissionDenied => "unauthorized",
        }
    }

    /// HTTP status the boundary layer should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedAuthHeader | Self::InvalidHeader | Self::TokenUnprocessable => {
                StatusCode::BAD_REQUEST
            }
            Self::KeyDirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingAuthHeader
            | Self::KeyNotFound
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::InvalidClaims
            | Self::PermissionsClaimMissing
            | Self::PermissionDenied => StatusCode::UNAUTHORIZED,
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader => "Authorization header not found.",
            Self::MalformedAuthHeader => "Authorization header is malformed.",
            Self::InvalidHeader => "Authorization malformed.",
            Self::KeyNotFound => "Unable to find the appropriate key.",
            Self::KeyDirectoryUnavailable => "Signing keys are temporarily unavailable.",
            Self::InvalidSignature => "Token signature is invalid.",
            Self::TokenExpired => "Token expired.",
            Self::InvalidClaims => "Incorrect claims. Please, check the audience and issuer.",
            Self::TokenUnprocessable => "Unable to parse authentication token.",
            Self::PermissionsClaimMissing => "Permissions not included in JWT.",
            Self::PermissionDenied => "Permission not found.",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A client-facing authorization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationError {
    kind: AuthErrorKind,
    description: Cow<'static, str>,
}

impl AuthorizationError {
    /// Create an error with the kind's standard description.
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            description: Cow::Borrowed(kind.default_description()),
        }
    }

    /// Create an error with a specific description.
    ///
    /// The description is shown to clients; pass fixed text only.
    pub fn with_description(kind: AuthErrorKind, description: &'static str) -> Self {
        Self {
            kind,
            description: Cow::Borrowed(description),
        }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl From<AuthErrorKind> for AuthorizationError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.description)
    }
}

impl std::error::Error for AuthorizationError {}
