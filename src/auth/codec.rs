// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT issuing and verification.
//!
//! Two independent HS256 channels: access tokens and refresh tokens each have
//! their own secret, so leaking one channel does not compromise the other.
//! The access-grant cookie is a third use of the access secret; grant cookies
//! carry no expiry and verification of them is lenient (a bad cookie reads as
//! an empty grant, never an error).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::claims::TokenClaims;
use super::error::AuthError;
use crate::config::TokenConfig;
use crate::models::{AccessGrant, Identity, TokenPair};

/// Grant-cookie claims. No `exp`; the cookie lives as long as the browser
/// keeps it, exactly like the original session cookie it replaces.
#[derive(Debug, Serialize, Deserialize)]
struct GrantClaims {
    iat: i64,
    #[serde(flatten)]
    grant: AccessGrant,
}

#[derive(Debug, Clone)]
pub struct TokenCodec {
    config: TokenConfig,
}

impl TokenCodec {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn access_lifetime(&self) -> Duration {
        self.config.access_lifetime
    }

    /// Sign a claims value on one of the two channels, stamping `iat`/`exp`.
    fn issue(&self, secret: &str, mut claims: TokenClaims, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        claims.iat = now;
        claims.exp = now + ttl.as_secs() as i64;
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn verify(&self, secret: &str, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; a token is invalid the second it expires.
        validation.leeway = 0;
        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken,
        })
    }

    pub fn issue_access(&self, claims: TokenClaims) -> Result<String, AuthError> {
        self.issue(
            &self.config.access_secret,
            claims,
            self.config.access_lifetime,
        )
    }

    pub fn issue_refresh(&self, claims: TokenClaims) -> Result<String, AuthError> {
        let ttl = if claims.registered {
            self.config.refresh_lifetime
        } else {
            self.config.anon_refresh_lifetime
        };
        self.issue(&self.config.refresh_secret, claims, ttl)
    }

    /// Issue the access/refresh pair for an authenticated identity.
    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let claims = TokenClaims::for_identity(identity)
            .ok_or_else(|| AuthError::Signing("cannot issue tokens without an identity".into()))?;
        Ok(TokenPair {
            access_token: self.issue_access(claims.clone())?,
            refresh_token: self.issue_refresh(claims)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(&self.config.access_secret, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(&self.config.refresh_secret, token)
    }

    /// Sign an access grant for the `user_cache` cookie.
    pub fn sign_grant(&self, grant: &AccessGrant) -> Result<String, AuthError> {
        let claims = GrantClaims {
            iat: Utc::now().timestamp(),
            grant: grant.clone(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.access_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Read an access grant back out of a cookie value. Anything that does
    /// not verify is an empty grant.
    pub fn verify_grant(&self, cookie_value: &str) -> AccessGrant {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<GrantClaims>(
            cookie_value,
            &DecodingKey::from_secret(self.config.access_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims.grant)
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn codec() -> TokenCodec {
        TokenCodec::new(TokenConfig::default())
    }

    #[test]
    fn access_token_roundtrip() {
        let codec = codec();
        let claims = TokenClaims::anonymous(Uuid::new_v4());
        let token = codec.issue_access(claims.clone()).unwrap();
        let verified = codec.verify_access(&token).unwrap();
        assert_eq!(verified.registered, claims.registered);
        assert_eq!(verified.uuid, claims.uuid);
        assert!(verified.exp > verified.iat);
    }

    #[test]
    fn channels_do_not_cross_verify() {
        let codec = codec();
        let claims = TokenClaims::anonymous(Uuid::new_v4());
        let access = codec.issue_access(claims.clone()).unwrap();
        let refresh = codec.issue_refresh(claims).unwrap();

        assert!(matches!(
            codec.verify_refresh(&access),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            codec.verify_access(&refresh),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec();
        let mut claims = TokenClaims::anonymous(Uuid::new_v4());
        claims.iat = Utc::now().timestamp() - 120;
        claims.exp = Utc::now().timestamp() - 60;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("my_secret".as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            codec.verify_access(&token),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let codec = codec();
        let token = codec
            .issue_access(TokenClaims::anonymous(Uuid::new_v4()))
            .unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(matches!(
            codec.verify_access(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn grant_cookie_roundtrip_and_lenient_failure() {
        let codec = codec();
        let grant = AccessGrant::default().with_survey("s1").with_survey("s2");
        let cookie = codec.sign_grant(&grant).unwrap();
        assert_eq!(codec.verify_grant(&cookie), grant);

        // Garbage and wrong-secret cookies both read as empty grants.
        assert!(codec.verify_grant("not-a-jwt").is_empty());
        let other = TokenCodec::new(TokenConfig {
            access_secret: "different".into(),
            ..TokenConfig::default()
        });
        assert!(other.verify_grant(&cookie).is_empty());
    }

    #[test]
    fn refresh_lifetime_depends_on_registration() {
        let codec = codec();
        let anon = codec
            .issue_refresh(TokenClaims::anonymous(Uuid::new_v4()))
            .unwrap();
        let claims = codec.verify_refresh(&anon).unwrap();
        let ttl = claims.exp - claims.iat;
        assert_eq!(ttl, 86400 * 30);
    }
}
