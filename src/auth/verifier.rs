//! Signature and claim verification for bearer tokens.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use tracing::debug;

use crate::auth::claims::{ClaimSet, VerifiedPayload};
use crate::auth::config::AuthConfig;
use crate::auth::error::{AuthErrorKind, AuthorizationError};
use crate::auth::jwks::{KeyDirectory, KeyDirectoryError};
use crate::types::RawCredential;

/// Claims every accepted token must carry.
const REQUIRED_CLAIMS: [&str; 4] = ["exp", "aud", "iss", "sub"];

/// Verifies tokens against the authority's published keys.
pub struct TokenVerifier {
    keys: Arc<KeyDirectory>,
    audience: String,
    issuer: String,
    algorithms: Vec<Algorithm>,
    leeway: u64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyDirectory>, config: &AuthConfig) -> Self {
        Self {
            keys,
            audience: config.audience.clone(),
            issuer: config.issuer(),
            algorithms: config.algorithms.clone(),
            leeway: config.leeway_seconds,
        }
    }

    pub fn key_directory(&self) -> &Arc<KeyDirectory> {
        &self.keys
    }

    /// Verify a raw token and decode its claims.
    ///
    /// 1. read the unverified header for `kid` and check `alg` is allowed
    /// 2. resolve the key (one refresh on a miss)
    /// 3. check the algorithm suits the key, then the signature
    /// 4. validate `exp`, `aud`, `iss`, `sub` and `nbf`
    pub async fn verify(&self, credential: RawCredential) -> Result<ClaimSet, AuthorizationError> {
        let token = credential.as_str();

        let header = decode_header(token).map_err(|e| {
            debug!("Rejecting token with unparseable header: {}", e);
            AuthorizationError::new(AuthErrorKind::InvalidHeader)
        })?;

        let kid = header.kid.as_deref().ok_or_else(|| {
            debug!("Rejecting token without kid");
            AuthorizationError::new(AuthErrorKind::InvalidHeader)
        })?;

        // Checked before the lookup so such tokens never cause a JWKS fetch.
        if !self.algorithms.contains(&header.alg) {
            debug!(
                "Rejecting token signed with {:?} (allowed: {:?})",
                header.alg, self.algorithms
            );
            return Err(algorithm_not_accepted());
        }

        let key = self.keys.lookup(kid).await?;

        if !key.accepts(header.alg) {
            debug!(
                "Rejecting token signed with {:?} for {:?} key {}",
                header.alg,
                key.family(),
                key.kid()
            );
            return Err(algorithm_not_accepted());
        }

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);
        validation.validate_nbf = true;
        validation.leeway = self.leeway;

        let payload = decode::<VerifiedPayload>(token, key.decoding_key(), &validation)
            .map_err(map_jwt_error)?
            .claims;

        // jsonwebtoken accepts a token in the second it expires; we do not.
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        if now >= payload.expiry().saturating_add(self.leeway) {
            return Err(AuthorizationError::new(AuthErrorKind::TokenExpired));
        }

        let claims = ClaimSet::from_verified(payload);
        debug!("Token verified for subject: {}", claims.subject());
        Ok(claims)
    }
}

impl From<KeyDirectoryError> for AuthorizationError {
    fn from(err: KeyDirectoryError) -> Self {
        match err {
            KeyDirectoryError::KeyNotFound(kid) => {
                debug!("No signing key for kid {}", kid);
                AuthorizationError::new(AuthErrorKind::KeyNotFound)
            }
            other => {
                tracing::warn!("Key directory unavailable: {}", other);
                AuthorizationError::new(AuthErrorKind::KeyDirectoryUnavailable)
            }
        }
    }
}

fn algorithm_not_accepted() -> AuthorizationError {
    AuthorizationError::with_description(
        AuthErrorKind::InvalidSignature,
        "Token signing algorithm is not accepted.",
    )
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthorizationError {
    let kind = match err.kind() {
        ErrorKind::ExpiredSignature => AuthErrorKind::TokenExpired,
        ErrorKind::InvalidAudience
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => AuthErrorKind::InvalidClaims,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidKeyFormat => AuthErrorKind::InvalidSignature,
        _ => AuthErrorKind::TokenUnprocessable,
    };
    debug!("Token rejected ({}): {}", kind, err);
    AuthorizationError::new(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use std::time::Duration;

    fn offline_verifier() -> TokenVerifier {
        let config = AuthConfig::for_domain("tenant.example.com", "drinks");
        let keys = KeyDirectory::new(
            config.jwks_url(),
            Duration::from_secs(600),
            Duration::from_secs(1),
            false,
        )
        .unwrap();
        TokenVerifier::new(Arc::new(keys), &config)
    }

    #[test]
    fn test_map_jwt_error() {
        let cases = [
            (ErrorKind::ExpiredSignature, AuthErrorKind::TokenExpired),
            (ErrorKind::InvalidAudience, AuthErrorKind::InvalidClaims),
            (ErrorKind::InvalidIssuer, AuthErrorKind::InvalidClaims),
            (
                ErrorKind::MissingRequiredClaim("aud".to_string()),
                AuthErrorKind::InvalidClaims,
            ),
            (ErrorKind::ImmatureSignature, AuthErrorKind::InvalidClaims),
            (ErrorKind::InvalidSignature, AuthErrorKind::InvalidSignature),
            (ErrorKind::InvalidAlgorithm, AuthErrorKind::InvalidSignature),
            (ErrorKind::InvalidToken, AuthErrorKind::TokenUnprocessable),
        ];

        for (jwt_kind, expected) in cases {
            let err = map_jwt_error(jsonwebtoken::errors::Error::from(jwt_kind));
            assert_eq!(err.kind(), expected);
        }
    }

    #[test]
    fn test_key_directory_error_mapping() {
        let err: AuthorizationError = KeyDirectoryError::KeyNotFound("k".to_string()).into();
        assert_eq!(err.kind(), AuthErrorKind::KeyNotFound);

        let err: AuthorizationError = KeyDirectoryError::Timeout.into();
        assert_eq!(err.kind(), AuthErrorKind::KeyDirectoryUnavailable);

        let err: AuthorizationError = KeyDirectoryError::NoValidKeys.into();
        assert_eq!(err.kind(), AuthErrorKind::KeyDirectoryUnavailable);
    }

    #[tokio::test]
    async fn test_unparseable_token_is_invalid_header() {
        let verifier = offline_verifier();
        let err = verifier
            .verify(RawCredential::new("not-a-jwt").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidHeader);
        assert_eq!(err.description(), "Authorization malformed.");
    }

    #[tokio::test]
    async fn test_token_without_kid_is_invalid_header() {
        let verifier = offline_verifier();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "u", "exp": 4102444800u64 }),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let err = verifier
            .verify(RawCredential::new(token).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidHeader);
        // No kid means no key lookup, so nothing was fetched.
        assert_eq!(verifier.key_directory().refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_disallowed_algorithm_rejected_without_fetch() {
        let verifier = offline_verifier();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("unknown-kid".to_string());
        let token = encode(
            &header,
            &json!({ "sub": "u", "exp": 4102444800u64 }),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let err = verifier
            .verify(RawCredential::new(token).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidSignature);
        assert_eq!(verifier.key_directory().refresh_count(), 0);
    }
}
