//! JWT issue/verification and password hashing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::database::models::Role;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(#[source] jsonwebtoken::errors::Error),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies access and refresh tokens. Access and refresh tokens
/// use separate secrets, so one can never stand in for the other.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    refreshed_access_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refreshed_access_ttl", &self.refreshed_access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            access_secret: security.jwt_secret.clone(),
            refresh_secret: security.jwt_refresh_secret.clone(),
            access_ttl: Duration::seconds(security.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(security.refresh_token_ttl_secs),
            refreshed_access_ttl: Duration::seconds(security.refreshed_access_token_ttl_secs),
        }
    }

    fn secret(&self, kind: TokenKind) -> Result<&[u8], AuthError> {
        let secret = match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        };
        if secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        Ok(secret.as_bytes())
    }

    pub fn issue(&self, kind: TokenKind, sub: &str, email: &str, role: Role, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let key = EncodingKey::from_secret(self.secret(kind)?);
        encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(AuthError::TokenGeneration)
    }

    /// Login pair: (access token, refresh token)
    pub fn issue_pair(&self, sub: &str, email: &str, role: Role) -> Result<(String, String), AuthError> {
        Ok((
            self.issue(TokenKind::Access, sub, email, role, self.access_ttl)?,
            self.issue(TokenKind::Refresh, sub, email, role, self.refresh_ttl)?,
        ))
    }

    /// Short-lived access token handed out by the refresh endpoint
    pub fn issue_refreshed_access(&self, claims: &Claims) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, &claims.sub, &claims.email, claims.role, self.refreshed_access_ttl)
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, AuthError> {
        let key = DecodingKey::from_secret(self.secret(kind)?);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &key, &validation).map(|data| data.claims).map_err(AuthError::InvalidToken)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

const SYMBOLS: &str = r#"!@#$%^&*(),.?":{}|<>"#;

pub const PASSWORD_MIN_LENGTH: usize = 6;

/// First rule the password breaks, if any
pub fn password_rule_violation(password: &str) -> Option<&'static str> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        Some("Password must be at least 6 characters long")
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        Some("Password must contain at least one uppercase letter")
    } else if !password.chars().any(|c| SYMBOLS.contains(c)) {
        Some("Password must contain at least one special character")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn issuer() -> TokenIssuer {
        TokenIssuer::from_config(&AppConfig::development().security)
    }

    #[test]
    fn access_token_round_trips_claims() {
        let issuer = issuer();
        let (access, refresh) = issuer.issue_pair("u1", "ada@example.com", Role::Superadmin).unwrap();

        let claims = issuer.verify(TokenKind::Access, &access).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Superadmin);
        assert_eq!(claims.exp - claims.iat, 86_400);

        let refresh_claims = issuer.verify(TokenKind::Refresh, &refresh).unwrap();
        assert_eq!(refresh_claims.exp - refresh_claims.iat, 604_800);
    }

    #[test]
    fn tokens_do_not_cross_secrets() {
        let issuer = issuer();
        let (access, refresh) = issuer.issue_pair("u1", "ada@example.com", Role::User).unwrap();
        assert!(matches!(issuer.verify(TokenKind::Refresh, &access), Err(AuthError::InvalidToken(_))));
        assert!(matches!(issuer.verify(TokenKind::Access, &refresh), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer();
        let token = issuer.issue(TokenKind::Access, "u1", "a@b.c", Role::User, Duration::seconds(-10)).unwrap();
        assert!(matches!(issuer.verify(TokenKind::Access, &token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn refreshed_access_is_short_lived() {
        let issuer = issuer();
        let claims = Claims { sub: "u1".into(), email: "a@b.c".into(), role: Role::User, iat: 0, exp: 0 };
        let token = issuer.issue_refreshed_access(&claims).unwrap();
        let decoded = issuer.verify(TokenKind::Access, &token).unwrap();
        assert_eq!(decoded.exp - decoded.iat, 900);
    }

    #[test]
    fn missing_secret_is_reported() {
        let issuer = TokenIssuer::from_config(&AppConfig::production().security);
        assert!(matches!(issuer.issue_pair("u1", "a@b.c", Role::User), Err(AuthError::MissingSecret)));
    }

    #[test]
    fn hashes_and_verifies_passwords() {
        let hash = hash_password("Secret!1").unwrap();
        assert_ne!(hash, "Secret!1");
        assert!(verify_password("Secret!1", &hash).unwrap());
        assert!(!verify_password("secret!1", &hash).unwrap());
    }

    #[test]
    fn password_rules() {
        assert!(password_rule_violation("Ab!").is_some());
        assert!(password_rule_violation("abcdef!").unwrap().contains("uppercase"));
        assert!(password_rule_violation("Abcdefg").unwrap().contains("special"));
        assert_eq!(password_rule_violation("Abcdef!"), None);
    }
}
