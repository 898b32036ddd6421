//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! The trusted authority publishes its public signing keys at a well-known
//! endpoint. [`KeyDirectory`] fetches that document, converts every usable
//! entry into a [`SigningKey`] once, and keeps the result as one immutable
//! [`SigningKeySet`]. A refresh builds a complete new set and swaps it in, so
//! concurrent readers see either the old set or the new one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::{Host, Url};

use crate::auth::config::AuthConfig;
use crate::types::KeyId;

/// Maximum age of a key set that may still be used when a refresh fails
/// and stale fallback is enabled (1 hour).
pub const MAX_STALE_CACHE_SECONDS: u64 = 3600;

/// RSA moduli below this size are not trusted.
const MIN_RSA_MODULUS_BITS: usize = 2048;

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    /// Key ID, matched against the token header `kid`
    pub kid: Option<String>,
    /// Algorithm the key is meant for (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    /// EC curve name (e.g., "P-256")
    pub crv: Option<String>,
    /// EC x coordinate (base64url)
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    pub y: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Which algorithms a key's material can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
}

impl KeyFamily {
    /// Whether a token signed with `alg` can be verified by this key type.
    pub fn supports(&self, alg: Algorithm) -> bool {
        match self {
            Self::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            Self::EcP256 => alg == Algorithm::ES256,
            Self::EcP384 => alg == Algorithm::ES384,
        }
    }
}

/// A public key resolved from the key set, ready for signature checks.
#[derive(Clone)]
pub struct SigningKey {
    kid: KeyId,
    algorithm: Option<Algorithm>,
    family: KeyFamily,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn kid(&self) -> &KeyId {
        &self.kid
    }

    /// The algorithm pinned by the JWK's `alg`, if it declared one.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether this key may verify a token whose header declares `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.supports(alg) && self.algorithm.is_none_or(|pinned| pinned == alg)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

/// An immutable snapshot of the authority's signing keys.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: BTreeMap<KeyId, SigningKey>,
    fetched_at: Instant,
}

impl SigningKeySet {
    /// Convert a JWKS document into a key set.
    ///
    /// Encryption keys, keys without a `kid` and keys that fail conversion
    /// are skipped. Fails if nothing usable is left.
    pub fn from_document(document: JwksDocument) -> Result<Self, KeyDirectoryError> {
        let mut keys = BTreeMap::new();

        for jwk in document.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key {:?}", jwk.kid);
                continue;
            }

            let Some(kid) = jwk.kid.clone() else {
                debug!("Skipping {} key without kid", jwk.kty);
                continue;
            };

            match jwk_to_signing_key(KeyId::new(kid.clone()), &jwk) {
                Ok(key) => {
                    debug!("Cached key with kid: {}", kid);
                    keys.insert(key.kid.clone(), key);
                }
                Err(e) => {
                    warn!("Skipping unusable JWK {}: {}", kid, e);
                }
            }
        }

        if keys.is_empty() {
            return Err(KeyDirectoryError::NoValidKeys);
        }

        Ok(Self {
            keys,
            fetched_at: Instant::now(),
        })
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &KeyId> {
        self.keys.keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time since this set was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Convert a JWK to a [`SigningKey`].
fn jwk_to_signing_key(kid: KeyId, jwk: &Jwk) -> Result<SigningKey, KeyDirectoryError> {
    let algorithm = jwk
        .alg
        .as_deref()
        .map(|alg| {
            Algorithm::from_str(alg)
                .map_err(|_| KeyDirectoryError::ParseError(format!("Unsupported alg '{}'", alg)))
        })
        .transpose()?;

    let (family, decoding_key) = match jwk.kty.as_str() {
        "RSA" => {
            let n = required_component(&jwk.n, "n")?;
            let e = required_component(&jwk.e, "e")?;
            let bits = rsa_modulus_bits(n)?;
            if bits < MIN_RSA_MODULUS_BITS {
                return Err(KeyDirectoryError::ParseError(format!(
                    "RSA modulus too short ({} bits)",
                    bits
                )));
            }
            let key = DecodingKey::from_rsa_components(n, e).map_err(|e| {
                KeyDirectoryError::ParseError(format!("Invalid RSA components: {}", e))
            })?;
            (KeyFamily::Rsa, key)
        }
        "EC" => {
            let family = match jwk.crv.as_deref() {
                Some("P-256") => KeyFamily::EcP256,
                Some("P-384") => KeyFamily::EcP384,
                other => {
                    return Err(KeyDirectoryError::ParseError(format!(
                        "Unsupported EC curve {:?}",
                        other
                    )));
                }
            };
            let x = required_component(&jwk.x, "x")?;
            let y = required_component(&jwk.y, "y")?;
            let key = DecodingKey::from_ec_components(x, y).map_err(|e| {
                KeyDirectoryError::ParseError(format!("Invalid EC components: {}", e))
            })?;
            (family, key)
        }
        other => {
            return Err(KeyDirectoryError::ParseError(format!(
                "Unsupported key type '{}'",
                other
            )));
        }
    };

    if let Some(alg) = algorithm
        && !family.supports(alg)
    {
        return Err(KeyDirectoryError::ParseError(format!(
            "alg {:?} does not match key type {}",
            alg, jwk.kty
        )));
    }

    Ok(SigningKey {
        kid,
        algorithm,
        family,
        decoding_key,
    })
}

fn required_component<'a>(
    value: &'a Option<String>,
    name: &str,
) -> Result<&'a str, KeyDirectoryError> {
    value
        .as_deref()
        .ok_or_else(|| KeyDirectoryError::ParseError(format!("Missing '{}' in JWK", name)))
}

/// Bit length of a base64url-encoded big-endian modulus.
fn rsa_modulus_bits(n: &str) -> Result<usize, KeyDirectoryError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(n.trim_end_matches('='))
        .map_err(|e| KeyDirectoryError::ParseError(format!("Invalid modulus encoding: {}", e)))?;

    let Some(first) = bytes.iter().position(|b| *b != 0) else {
        return Ok(0);
    };
    let significant = &bytes[first..];
    Ok(significant.len() * 8 - significant[0].leading_zeros() as usize)
}

/// Client for the authority's key endpoint with a short-lived cache.
pub struct KeyDirectory {
    /// The JWKS endpoint URL.
    jwks_url: String,
    /// How long a fetched key set is trusted without refreshing.
    cache_ttl: Duration,
    /// Whether to fall back to a stale set on fetch failure.
    allow_stale: bool,
    /// Current key set, replaced as a whole on refresh.
    current: RwLock<Option<Arc<SigningKeySet>>>,
    /// Held for the whole of a refresh; refreshes install sets in the order
    /// they were requested.
    refresh_lock: Mutex<()>,
    /// Number of fetch attempts made so far.
    refresh_count: AtomicU64,
    /// HTTP client for fetching JWKS; carries the fetch timeout.
    client: reqwest::Client,
}

impl KeyDirectory {
    /// Create a new key directory.
    ///
    /// The URL must use https, except for loopback hosts.
    pub fn new(
        jwks_url: String,
        cache_ttl: Duration,
        fetch_timeout: Duration,
        allow_stale: bool,
    ) -> anyhow::Result<Self> {
        validate_jwks_url(&jwks_url)?;

        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;

        Ok(Self {
            jwks_url,
            cache_ttl,
            allow_stale,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_count: AtomicU64::new(0),
            client,
        })
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        Self::new(
            config.jwks_url(),
            config.jwks_cache_ttl(),
            config.jwks_timeout(),
            config.allow_stale_jwks,
        )
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Resolve a key id to a signing key.
    ///
    /// Served from the cache when the cached set is fresh and knows `kid`.
    /// Otherwise the set is refreshed exactly once and consulted again. A
    /// request that waited on someone else's refresh uses that set if it
    /// now knows `kid`.
    pub async fn lookup(&self, kid: &str) -> Result<SigningKey, KeyDirectoryError> {
        let cached = self.current().await;

        if let Some(set) = &cached
            && set.age() < self.cache_ttl
            && let Some(key) = set.get(kid)
        {
            return Ok(key.clone());
        }

        let _guard = self.refresh_lock.lock().await;

        let latest = self.current().await;
        if let Some(set) = &latest
            && !same_set(&cached, &latest)
            && set.age() < self.cache_ttl
            && let Some(key) = set.get(kid)
        {
            debug!("Key {} arrived with a concurrent refresh", kid);
            return Ok(key.clone());
        }

        match self.fetch_locked().await {
            Ok(set) => set
                .get(kid)
                .cloned()
                .ok_or_else(|| KeyDirectoryError::KeyNotFound(kid.to_string())),
            Err(e) => {
                if self.allow_stale
                    && let Some(set) = &latest
                    && set.age() < Duration::from_secs(MAX_STALE_CACHE_SECONDS)
                    && let Some(key) = set.get(kid)
                {
                    warn!("JWKS fetch failed, using stale key {}: {}", kid, e);
                    return Ok(key.clone());
                }

                Err(e)
            }
        }
    }

    /// Fetch the key set from the JWKS endpoint and replace the cache.
    ///
    /// Waits for any refresh already in flight, so a slower earlier fetch
    /// can never overwrite a newer set.
    pub async fn fetch(&self) -> Result<Arc<SigningKeySet>, KeyDirectoryError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_locked().await
    }

    /// Caller must hold `refresh_lock`.
    async fn fetch_locked(&self) -> Result<Arc<SigningKeySet>, KeyDirectoryError> {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        debug!("Fetching JWKS from {}", self.jwks_url);

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KeyDirectoryError::Timeout
                } else {
                    KeyDirectoryError::FetchError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(KeyDirectoryError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let document: JwksDocument = response.json().await.map_err(|e| {
            if e.is_timeout() {
                KeyDirectoryError::Timeout
            } else {
                KeyDirectoryError::ParseError(e.to_string())
            }
        })?;

        let set = Arc::new(SigningKeySet::from_document(document)?);

        *self.current.write().await = Some(set.clone());

        debug!("Successfully cached {} keys", set.len());
        Ok(set)
    }

    /// The currently cached key set, if any.
    pub async fn current(&self) -> Option<Arc<SigningKeySet>> {
        self.current.read().await.clone()
    }

    /// Check if the cache has any keys.
    pub async fn has_keys(&self) -> bool {
        self.current().await.is_some_and(|set| !set.is_empty())
    }

    /// Get the number of cached keys.
    pub async fn key_count(&self) -> usize {
        self.current().await.map(|set| set.len()).unwrap_or(0)
    }

    /// Number of fetch attempts since construction.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Drop the cached key set.
    pub async fn clear(&self) {
        *self.current.write().await = None;
    }
}

fn same_set(a: &Option<Arc<SigningKeySet>>, b: &Option<Arc<SigningKeySet>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn validate_jwks_url(jwks_url: &str) -> anyhow::Result<()> {
    let url = Url::parse(jwks_url)
        .map_err(|e| anyhow::anyhow!("JWKS URL '{}' is invalid: {}", jwks_url, e))?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };

    match url.scheme() {
        "https" => Ok(()),
        "http" if loopback => Ok(()),
        scheme => Err(anyhow::anyhow!(
            "JWKS URL must use https (got '{}' for {})",
            scheme,
            jwks_url
        )),
    }
}

/// Errors that can occur when working with the key directory.
#[derive(Debug, Clone)]
pub enum KeyDirectoryError {
    /// Failed to fetch JWKS from endpoint.
    FetchError(String),
    /// The endpoint did not answer within the fetch timeout.
    Timeout,
    /// Failed to parse JWKS response.
    ParseError(String),
    /// No valid keys found in JWKS.
    NoValidKeys,
    /// Key with specified kid not found after a refresh.
    KeyNotFound(String),
}

impl fmt::Display for KeyDirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::Timeout => write!(f, "Timed out fetching JWKS"),
            Self::ParseError(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
        }
    }
}

impl std::error::Error for KeyDirectoryError {}
