//! The authorization entry point for protected operations.
//!
//! A single pass per request: extract the credential, verify it, enforce the
//! required permission. The first failure is returned unchanged.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tracing::{debug, info, warn};

use crate::auth::claims::ClaimSet;
use crate::auth::config::AuthConfig;
use crate::auth::error::{AuthErrorKind, AuthorizationError};
use crate::auth::extractor::extract;
use crate::auth::jwks::KeyDirectory;
use crate::auth::permissions::enforce;
use crate::auth::verifier::TokenVerifier;

/// How far a request got before it was granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStage {
    Unauthenticated,
    CredentialExtracted,
    SignatureVerified,
    ClaimsValidated,
    PermissionGranted,
}

impl AuthorizationStage {
    /// The last stage passed before a verifier failure of `kind`.
    fn reached_before(kind: AuthErrorKind) -> Self {
        match kind {
            AuthErrorKind::TokenExpired
            | AuthErrorKind::InvalidClaims
            | AuthErrorKind::TokenUnprocessable => Self::SignatureVerified,
            _ => Self::CredentialExtracted,
        }
    }
}

/// Composes extraction, verification and permission enforcement.
pub struct AuthorizationGate {
    verifier: TokenVerifier,
    timeout: Duration,
}

impl AuthorizationGate {
    pub fn new(verifier: TokenVerifier, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Build the gate and its key directory from configuration.
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let keys = Arc::new(KeyDirectory::from_config(config)?);
        Ok(Self::new(
            TokenVerifier::new(keys, config),
            config.authorization_timeout(),
        ))
    }

    pub fn key_directory(&self) -> &Arc<KeyDirectory> {
        self.verifier.key_directory()
    }

    /// Authorize a request for `permission`.
    ///
    /// Returns the verified claims to pass on to the protected operation.
    /// The pass is abandoned once the gate's timeout elapses; dropping the
    /// returned future abandons it as well, and no claims are produced.
    pub async fn authorize(
        &self,
        permission: &str,
        headers: &HeaderMap,
    ) -> Result<ClaimSet, AuthorizationError> {
        match tokio::time::timeout(self.timeout, self.authorize_once(permission, headers)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Authorization for '{}' timed out after {:?}",
                    permission, self.timeout
                );
                Err(AuthorizationError::with_description(
                    AuthErrorKind::KeyDirectoryUnavailable,
                    "Authorization timed out.",
                ))
            }
        }
    }

    async fn authorize_once(
        &self,
        permission: &str,
        headers: &HeaderMap,
    ) -> Result<ClaimSet, AuthorizationError> {
        let credential = extract(headers)
            .map_err(|e| denied(AuthorizationStage::Unauthenticated, permission, e))?;
        debug!(
            "Authorization stage {:?} for '{}'",
            AuthorizationStage::CredentialExtracted,
            permission
        );

        let claims = self.verifier.verify(credential).await.map_err(|e| {
            let stage = AuthorizationStage::reached_before(e.kind());
            denied(stage, permission, e)
        })?;
        debug!(
            "Authorization stage {:?} for '{}' (subject {})",
            AuthorizationStage::ClaimsValidated,
            permission,
            claims.subject()
        );

        let claims = enforce(permission, claims)
            .map_err(|e| denied(AuthorizationStage::ClaimsValidated, permission, e))?;
        debug!(
            "Authorization stage {:?} for '{}'",
            AuthorizationStage::PermissionGranted,
            permission
        );

        Ok(claims)
    }
}

fn denied(
    stage: AuthorizationStage,
    permission: &str,
    err: AuthorizationError,
) -> AuthorizationError {
    info!(
        "Authorization for '{}' denied after {:?}: {}",
        permission,
        stage,
        err.code()
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http::header::AUTHORIZATION;

    fn offline_gate() -> AuthorizationGate {
        let config = AuthConfig::for_domain("tenant.example.com", "drinks");
        AuthorizationGate::from_config(&config).unwrap()
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = AuthConfig::for_domain("tenant.example.com", "");
        assert!(AuthorizationGate::from_config(&config).is_err());
    }

    #[test]
    fn test_stage_reached_before_failure() {
        assert_eq!(
            AuthorizationStage::reached_before(AuthErrorKind::TokenExpired),
            AuthorizationStage::SignatureVerified
        );
        assert_eq!(
            AuthorizationStage::reached_before(AuthErrorKind::InvalidSignature),
            AuthorizationStage::CredentialExtracted
        );
    }

    #[tokio::test]
    async fn test_missing_header_short_circuits() {
        let gate = offline_gate();
        let err = gate
            .authorize("get:drinks-detail", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MissingAuthHeader);
        assert_eq!(gate.key_directory().refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_header_short_circuits() {
        let gate = offline_gate();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));

        let err = gate.authorize("post:drinks", &headers).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MalformedAuthHeader);
        assert_eq!(gate.key_directory().refresh_count(), 0);
    }
}
