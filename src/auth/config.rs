//! Authorization configuration.

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Default JWKS cache TTL in seconds (10 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;

/// Default timeout for one JWKS fetch, in milliseconds.
pub const DEFAULT_JWKS_TIMEOUT_MS: u64 = 5_000;

/// Default upper bound for a whole authorization pass, in milliseconds.
pub const DEFAULT_AUTHORIZATION_TIMEOUT_MS: u64 = 10_000;

/// Settings for verifying bearer tokens issued by the trusted authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Domain of the trusted authority, e.g. `example.eu.auth0.com`
    pub domain: String,
    /// Expected `aud` claim (the API identifier)
    pub audience: String,
    /// Signature algorithms a token may use
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
    /// Expected `iss` claim; derived from `domain` when unset
    #[serde(default)]
    pub issuer: Option<String>,
    /// JWKS endpoint; derived from `domain` when unset
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// JWKS cache TTL in seconds (default: 600)
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
    /// Timeout for one JWKS fetch in milliseconds (default: 5000)
    #[serde(default = "default_jwks_timeout_ms")]
    pub jwks_timeout_ms: u64,
    /// Whether to fall back to a stale key set when a refresh fails
    #[serde(default)]
    pub allow_stale_jwks: bool,
    /// Clock leeway applied to `exp`/`nbf` in seconds (default: 0)
    #[serde(default)]
    pub leeway_seconds: u64,
    /// Upper bound for one authorization pass in milliseconds (default: 10000)
    #[serde(default = "default_authorization_timeout_ms")]
    pub authorization_timeout_ms: u64,
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

fn default_jwks_cache_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_jwks_timeout_ms() -> u64 {
    DEFAULT_JWKS_TIMEOUT_MS
}

fn default_authorization_timeout_ms() -> u64 {
    DEFAULT_AUTHORIZATION_TIMEOUT_MS
}

impl AuthConfig {
    /// Create a config for an authority domain and API audience, with
    /// RS256 only and all other settings at their defaults.
    pub fn for_domain(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            algorithms: default_algorithms(),
            issuer: None,
            jwks_url: None,
            jwks_cache_seconds: DEFAULT_CACHE_TTL_SECONDS,
            jwks_timeout_ms: DEFAULT_JWKS_TIMEOUT_MS,
            allow_stale_jwks: false,
            leeway_seconds: 0,
            authorization_timeout_ms: DEFAULT_AUTHORIZATION_TIMEOUT_MS,
        }
    }

    /// Override the JWKS endpoint (used for non-standard layouts and tests).
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    /// Override the expected issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Replace the allowed algorithm set.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Set the JWKS fetch timeout.
    pub fn with_jwks_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The expected `iss` claim: `https://<domain>/` unless overridden.
    pub fn issuer(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| format!("https://{}/", self.domain.trim_end_matches('/')))
    }

    /// The JWKS endpoint: `https://<domain>/.well-known/jwks.json` unless
    /// overridden.
    pub fn jwks_url(&self) -> String {
        self.jwks_url.clone().unwrap_or_else(|| {
            format!(
                "https://{}/.well-known/jwks.json",
                self.domain.trim_end_matches('/')
            )
        })
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_seconds)
    }

    pub fn jwks_timeout(&self) -> Duration {
        Duration::from_millis(self.jwks_timeout_ms)
    }

    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_millis(self.authorization_timeout_ms)
    }

    /// Check that the config can be used at all.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.domain.trim().is_empty() {
            anyhow::bail!("authority domain must not be empty");
        }
        if self.audience.trim().is_empty() {
            anyhow::bail!("audience must not be empty");
        }
        if self.algorithms.is_empty() {
            anyhow::bail!("at least one signature algorithm must be allowed");
        }
        if let Some(alg) = self.algorithms.iter().find(|alg| is_symmetric(**alg)) {
            anyhow::bail!(
                "{:?} is a shared-secret algorithm and cannot be verified with published keys",
                alg
            );
        }
        if self.jwks_timeout_ms >= self.authorization_timeout_ms {
            anyhow::bail!(
                "JWKS timeout ({} ms) must be shorter than the authorization timeout ({} ms)",
                self.jwks_timeout_ms,
                self.authorization_timeout_ms
            );
        }
        Ok(())
    }
}

/// HMAC algorithms need a shared secret, which a JWKS never provides.
pub(crate) fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_domain_defaults() {
        let config = AuthConfig::for_domain("tenant.eu.auth0.com", "drinks");
        assert_eq!(config.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.issuer(), "https://tenant.eu.auth0.com/");
        assert_eq!(
            config.jwks_url(),
            "https://tenant.eu.auth0.com/.well-known/jwks.json"
        );
        assert_eq!(config.jwks_cache_seconds, DEFAULT_CACHE_TTL_SECONDS);
        assert!(!config.allow_stale_jwks);
        assert_eq!(config.leeway_seconds, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = AuthConfig::for_domain("tenant.example.com", "drinks")
            .with_issuer("http://127.0.0.1:9000/")
            .with_jwks_url("http://127.0.0.1:9000/jwks")
            .with_jwks_timeout(Duration::from_millis(250));
        assert_eq!(config.issuer(), "http://127.0.0.1:9000/");
        assert_eq!(config.jwks_url(), "http://127.0.0.1:9000/jwks");
        assert_eq!(config.jwks_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(AuthConfig::for_domain("", "drinks").validate().is_err());
        assert!(AuthConfig::for_domain("tenant", "").validate().is_err());
        assert!(
            AuthConfig::for_domain("tenant", "drinks")
                .with_algorithms(vec![])
                .validate()
                .is_err()
        );
        assert!(
            AuthConfig::for_domain("tenant", "drinks")
                .with_algorithms(vec![Algorithm::RS256, Algorithm::HS256])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_requires_fetch_timeout_below_gate_timeout() {
        let mut config = AuthConfig::for_domain("tenant", "drinks");
        config.authorization_timeout_ms = 2_000;

        assert!(config.clone().with_jwks_timeout(Duration::from_millis(1_999)).validate().is_ok());
        assert!(config.clone().with_jwks_timeout(Duration::from_millis(2_000)).validate().is_err());
        assert!(config.with_jwks_timeout(Duration::from_secs(60)).validate().is_err());
    }

    #[test]
    fn test_jwks_timeout_saturates() {
        let config = AuthConfig::for_domain("tenant", "drinks").with_jwks_timeout(Duration::MAX);
        assert_eq!(config.jwks_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{ "domain": "tenant.auth0.com", "audience": "drinks" }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.jwks_timeout_ms, DEFAULT_JWKS_TIMEOUT_MS);
        assert_eq!(
            config.authorization_timeout(),
            Duration::from_millis(DEFAULT_AUTHORIZATION_TIMEOUT_MS)
        );
    }
}
