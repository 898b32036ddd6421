//! Helpers shared by the in-crate tests: RSA signing keys, a local JWKS
//! server and token minting.

#![cfg(test)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::auth::AuthConfig;

pub const AUDIENCE: &str = "drinks-api";

/// An RSA key pair standing in for one of the authority's signing keys.
pub struct TestKey {
    pub kid: &'static str,
    private: RsaPrivateKey,
}

impl TestKey {
    fn generate(kid: &'static str) -> Self {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa key");
        Self { kid, private }
    }

    /// JWK entry for this key, pinned to RS256.
    pub fn jwk(&self) -> Value {
        let mut jwk = self.jwk_without_alg();
        jwk["alg"] = json!("RS256");
        jwk
    }

    /// JWK entry that does not declare an algorithm.
    pub fn jwk_without_alg(&self) -> Value {
        let public = self.private.to_public_key();
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_as(Algorithm::RS256, self.kid, claims)
    }

    /// Sign with an explicit algorithm and header `kid`.
    pub fn sign_as(&self, alg: Algorithm, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(kid.to_string());
        let pem = self.private.to_pkcs1_pem(Default::default()).expect("pem");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key");
        jsonwebtoken::encode(&header, claims, &key).expect("token")
    }

    /// PEM of the public key, as an attacker would use for an HMAC secret.
    pub fn public_pem(&self) -> String {
        self.private
            .to_public_key()
            .to_pkcs1_pem(Default::default())
            .expect("public pem")
    }
}

/// Two keys shared by every test in the binary; generation is slow.
pub fn test_keys() -> &'static (TestKey, TestKey) {
    static KEYS: OnceLock<(TestKey, TestKey)> = OnceLock::new();
    KEYS.get_or_init(|| (TestKey::generate("key-a"), TestKey::generate("key-b")))
}

/// A P-256 key pair for ES256 tokens.
pub struct EcTestKey {
    pub kid: &'static str,
    secret: p256::SecretKey,
}

impl EcTestKey {
    pub fn jwk(&self) -> Value {
        let point = self.secret.public_key().to_encoded_point(false);
        json!({
            "kty": "EC",
            "kid": self.kid,
            "use": "sig",
            "alg": "ES256",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate")),
            "y": URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate")),
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.to_string());
        let pem = self.secret.to_pkcs8_pem(LineEnding::LF).expect("pem");
        let key = EncodingKey::from_ec_pem(pem.as_bytes()).expect("encoding key");
        jsonwebtoken::encode(&header, claims, &key).expect("token")
    }
}

pub fn ec_test_key() -> &'static EcTestKey {
    static KEY: OnceLock<EcTestKey> = OnceLock::new();
    KEY.get_or_init(|| EcTestKey {
        kid: "ec-key",
        secret: p256::SecretKey::random(&mut rand::thread_rng()),
    })
}

pub fn jwks_of(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

struct Behaviour {
    document: Value,
    status: StatusCode,
    delay: Duration,
}

struct JwksState {
    hits: AtomicUsize,
    behaviour: Mutex<Behaviour>,
}

/// A local JWKS endpoint whose response can be changed mid-test.
pub struct JwksServer {
    pub addr: SocketAddr,
    state: Arc<JwksState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl JwksServer {
    pub async fn spawn(document: Value) -> Self {
        let state = Arc::new(JwksState {
            hits: AtomicUsize::new(0),
            behaviour: Mutex::new(Behaviour {
                document,
                status: StatusCode::OK,
                delay: Duration::ZERO,
            }),
        });

        let app = Router::new()
            .route("/.well-known/jwks.json", get(serve_jwks))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn issuer(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn jwks_url(&self) -> String {
        format!("http://{}/.well-known/jwks.json", self.addr)
    }

    /// Number of requests the endpoint has received.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn set_document(&self, document: Value) {
        self.state.behaviour.lock().unwrap().document = document;
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state.behaviour.lock().unwrap().status = status;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.behaviour.lock().unwrap().delay = delay;
    }

    /// Auth config pointing at this server.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::for_domain(self.addr.to_string(), AUDIENCE)
            .with_issuer(self.issuer())
            .with_jwks_url(self.jwks_url())
    }
}

async fn serve_jwks(State(state): State<Arc<JwksState>>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let (document, status, delay) = {
        let behaviour = state.behaviour.lock().unwrap();
        (
            behaviour.document.clone(),
            behaviour.status,
            behaviour.delay,
        )
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (status, Json(document)).into_response()
}

/// Claims for a token that passes every check against `issuer`.
pub fn claims_for(issuer: &str, permissions: &[&str]) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": "auth0|barista",
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 300,
        "permissions": permissions,
    })
}
