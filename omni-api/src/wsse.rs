//! WS-Security UsernameToken header used to authenticate every request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Name of the header carrying the token.
pub const HEADER: &str = "X-WSSE";

/// Digest for one nonce/timestamp pair: base64(SHA-1(nonce + created + secret)).
pub fn password_digest(nonce: &str, created: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(created.as_bytes());
    hasher.update(secret.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Header value for a given nonce and creation time.
pub fn token_at(username: &str, secret: &str, nonce: &str, created: DateTime<Utc>) -> String {
    let created = created.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
    let digest = password_digest(nonce, &created, secret);
    format!(
        "UsernameToken Username=\"{}\", PasswordDigest=\"{}\", Nonce=\"{}\", Created=\"{}\"",
        username,
        digest,
        STANDARD.encode(nonce.as_bytes()),
        created
    )
}

/// Fresh header value; a new nonce is drawn on every call.
pub fn token(username: &str, secret: &str) -> String {
    let nonce = Uuid::new_v4().to_string();
    token_at(username, secret, &nonce, Utc::now())
}
