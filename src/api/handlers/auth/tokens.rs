//! Access and refresh token primitives.
//!
//! Access tokens are short-lived HS256 JWTs so protected endpoints verify
//! them without a database round trip. Refresh tokens are opaque random
//! values persisted in `refresh_tokens`, which is what makes them revocable.

use super::state::AuthConfig;
use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

const TOKEN_TYPE_ACCESS: &str = "access";
const REFRESH_TOKEN_BYTES: usize = 48;

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(rename = "type")]
    token_type: String,
}

/// Signs and verifies access tokens with a process-wide secret fixed at startup.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_seconds: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.token_secret().expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_seconds: config.access_ttl_seconds(),
        }
    }

    /// Issue a signed access token for `subject_id`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access_token(&self, subject_id: i64) -> Result<String> {
        self.issue_access_token_at(subject_id, Utc::now().timestamp())
    }

    fn issue_access_token_at(&self, subject_id: i64, issued_at: i64) -> Result<String> {
        let claims = AccessClaims {
            sub: subject_id.to_string(),
            iat: issued_at,
            exp: issued_at + self.access_ttl_seconds,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign access token")
    }

    /// Verify signature, algorithm, expiry and token type, returning the
    /// subject id. Every failure mode collapses to `None`; callers must not
    /// learn why a token was rejected.
    #[must_use]
    pub fn decode_access_token(&self, token: &str) -> Option<i64> {
        let mut validation = Validation::new(Algorithm::HS256);
        // No grace period after expiry.
        validation.leeway = 0;
        let data = decode::<AccessClaims>(token, &self.decoding_key, &validation).ok()?;
        if data.claims.token_type != TOKEN_TYPE_ACCESS {
            return None;
        }
        data.claims.sub.parse().ok()
    }
}

/// Generate an opaque refresh token value. The value only becomes a live
/// session once the caller persists it.
pub(super) fn generate_refresh_token_value() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn service() -> TokenService {
        let config = AuthConfig::new(
            SecretString::from("test-signing-secret".to_string()),
            "http://localhost:5173".to_string(),
        );
        TokenService::new(&config)
    }

    #[test]
    fn issue_and_decode_round_trip() {
        let service = service();
        let token = service.issue_access_token(42).unwrap();
        assert_eq!(service.decode_access_token(&token), Some(42));
    }

    #[test]
    fn decode_rejects_expired() {
        let service = service();
        let issued_at = Utc::now().timestamp() - (15 * 60) - 5;
        let token = service.issue_access_token_at(7, issued_at).unwrap();
        assert_eq!(service.decode_access_token(&token), None);
    }

    #[test]
    fn decode_rejects_tampered() {
        let service = service();
        let mut token = service.issue_access_token(42).unwrap();
        // Flip a character in the signature segment.
        let flipped = if token.ends_with('a') { 'b' } else { 'a' };
        token.pop();
        token.push(flipped);
        assert_eq!(service.decode_access_token(&token), None);
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let token = service().issue_access_token(42).unwrap();
        let other = TokenService::new(&AuthConfig::new(
            SecretString::from("different-secret".to_string()),
            "http://localhost:5173".to_string(),
        ));
        assert_eq!(other.decode_access_token(&token), None);
    }

    #[test]
    fn decode_rejects_non_access_type() {
        let claims = AccessClaims {
            sub: "42".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 900,
            token_type: "refresh".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-signing-secret"),
        )
        .unwrap();
        assert_eq!(service().decode_access_token(&token), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(service().decode_access_token("not-a-jwt"), None);
        assert_eq!(service().decode_access_token(""), None);
    }

    #[test]
    fn refresh_token_values_are_opaque_and_distinct() {
        let first = generate_refresh_token_value().unwrap();
        let second = generate_refresh_token_value().unwrap();
        assert_ne!(first, second);
        assert_eq!(
            URL_SAFE_NO_PAD.decode(first.as_bytes()).unwrap().len(),
            REFRESH_TOKEN_BYTES
        );
    }
}
