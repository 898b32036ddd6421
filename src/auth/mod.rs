//! Bearer-token authorization.
//!
//! Protected routes call [`AuthorizationGate::authorize`] with the permission
//! they require. The gate runs three stages and stops at the first failure:
//!
//! - **Extract**: take the token out of `Authorization: Bearer <token>`
//! - **Verify**: check the signature against the authority's JWKS keys and
//!   validate `exp`, `aud`, `iss`
//! - **Enforce**: require the permission in the token's `permissions` claim
//!
//! ## Security Model
//!
//! - Signing keys are fetched from the authority, never bundled, and cached
//!   for a short TTL; an unknown `kid` triggers at most one refresh
//! - Only algorithms in the configured allowlist are accepted, and only with
//!   keys of the matching type
//! - A [`ClaimSet`] only exists for tokens that passed every check
//! - Failures are reported as an [`AuthorizationError`]; library error text
//!   stays in the logs
//!
//! ## Usage
//!
//! ```ignore
//! let gate = AuthorizationGate::from_config(&config)?;
//! let claims = gate.authorize(POST_DRINKS, &headers).await?;
//! create_drink(&store, &claims, body).await
//! ```

mod claims;
mod config;
mod error;
mod extractor;
mod gate;
pub mod jwks;
mod permissions;
mod verifier;

pub use claims::ClaimSet;
pub use config::{
    AuthConfig, DEFAULT_AUTHORIZATION_TIMEOUT_MS, DEFAULT_CACHE_TTL_SECONDS,
    DEFAULT_JWKS_TIMEOUT_MS,
};
pub use error::{AuthErrorKind, AuthorizationError};
pub use extractor::extract;
pub use gate::{AuthorizationGate, AuthorizationStage};
pub use jwks::{KeyDirectory, KeyDirectoryError, SigningKey, SigningKeySet};
pub use permissions::{DELETE_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS, enforce};
pub use verifier::TokenVerifier;
