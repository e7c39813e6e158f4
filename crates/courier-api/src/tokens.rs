use anyhow::anyhow;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use courier_types::api::Claims;

use crate::error::ApiError;

const TOKEN_LIFETIME_DAYS: i64 = 30;

/// Issues and verifies HS256 identity tokens. Keys are derived once from
/// the process-wide secret at startup.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token bound to `username`.
    pub fn issue(&self, username: &str) -> Result<String, ApiError> {
        let claims = Claims {
            sub: username.to_owned(),
            exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp()
                as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| anyhow!("token signing failed: {e}").into())
    }

    /// Check signature and expiry, returning the identity claim.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_returns_the_identity() {
        let issuer = TokenIssuer::new("test-secret");
        let token = issuer.issue("alice").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = TokenIssuer::new("secret-a").issue("alice").unwrap();
        let err = TokenIssuer::new("secret-b").verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));
    }

    #[test]
    fn garbage_is_rejected() {
        let issuer = TokenIssuer::new("test-secret");
        assert!(matches!(
            issuer.verify("not.a.jwt").unwrap_err(),
            ApiError::InvalidToken
        ));
        assert!(matches!(
            issuer.verify("").unwrap_err(),
            ApiError::InvalidToken
        ));
    }
}
