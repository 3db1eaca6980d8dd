//! HS256 token codec.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use datalink_core::UserId;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// Verifies a bearer token and returns its validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Mints access tokens at login.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: UserId, name: &str, now: DateTime<Utc>, ttl: Duration) -> Result<String, TokenError>;
}

/// Shared-secret HS256 implementation of both sides.
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256Jwt {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry lives in our own claim names and is checked by `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl TokenIssuer for Hs256Jwt {
    fn issue(&self, user_id: UserId, name: &str, now: DateTime<Utc>, ttl: Duration) -> Result<String, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding(format!("token lifetime {ttl} is out of range")))?;
        let claims = JwtClaims {
            sub: user_id,
            name: name.to_string(),
            issued_at: now,
            expires_at,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let jwt = Hs256Jwt::new("secret");
        let now = Utc::now();
        let token = jwt.issue(UserId::new(5), "bob", now, Duration::minutes(120)).unwrap();
        let claims = jwt.validate(&token, now + Duration::minutes(1)).unwrap();
        assert_eq!(claims.sub, UserId::new(5));
        assert_eq!(claims.name, "bob");
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256Jwt::new("a").issue(UserId::new(1), "x", now, Duration::minutes(1)).unwrap();
        assert!(matches!(Hs256Jwt::new("b").validate(&token, now), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = Hs256Jwt::new("secret");
        let now = Utc::now();
        let token = jwt.issue(UserId::new(1), "x", now, Duration::minutes(1)).unwrap();
        assert_eq!(
            jwt.validate(&token, now + Duration::minutes(2)),
            Err(TokenError::Claims(TokenValidationError::Expired))
        );
    }

    #[test]
    fn overflowing_lifetime_is_an_error() {
        let jwt = Hs256Jwt::new("secret");
        let ttl = Duration::MAX;
        assert!(matches!(
            jwt.issue(UserId::new(1), "x", Utc::now(), ttl),
            Err(TokenError::Encoding(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let jwt = Hs256Jwt::new("secret");
        assert!(matches!(jwt.validate("not-a-jwt", Utc::now()), Err(TokenError::Malformed(_))));
    }
}
