use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::cloud::CloudAccessGrant;
use crate::authz::{Principal, Role};
use crate::errors::AppError;

/// Session lifetime. Business requirement, not configurable per token.
pub const SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token malformed")]
    Malformed,
    #[error("token could not be signed")]
    Signing,
}

impl From<TokenError> for AppError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Signing => AppError::internal(value.to_string()),
            other => AppError::token(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    secret: Arc<Vec<u8>>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig").field("secret", &"<redacted>").finish()
    }
}

impl JwtConfig {
    /// Reads `JWT_SECRET`. A missing or empty secret is fatal: there is no
    /// fallback key.
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        Self::new(secret)
    }

    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, AppError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }
        Ok(Self {
            secret: Arc::new(secret),
        })
    }

    pub fn issue(&self, session: &SessionClaims) -> Result<String, TokenError> {
        self.issue_at(session, Utc::now())
    }

    fn issue_at(&self, session: &SessionClaims, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let exp = issued_at + Duration::days(SESSION_TTL_DAYS);

        let claims = Claims {
            sub: session.user_id,
            email: session.email.clone(),
            role: session.role,
            name: session.name.clone(),
            cloud_access: session.cloud_access.clone(),
            iat: issued_at.timestamp(),
            exp: exp.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| {
                tracing::error!(error = %err, "failed to sign session token");
                TokenError::Signing
            })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

/// What the login handler asks to be signed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub cloud_access: Option<CloudAccessGrant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_access: Option<CloudAccessGrant>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn session(&self) -> SessionClaims {
        SessionClaims {
            user_id: self.sub,
            email: self.email.clone(),
            role: self.role,
            name: self.name.clone(),
            cloud_access: self.cloud_access.clone(),
        }
    }
}

/// Authenticated caller, as resolved by the security gate.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::cloud::grant_for;

    fn session() -> SessionClaims {
        SessionClaims {
            user_id: Uuid::new_v4(),
            email: "manager@phtrading.com".to_string(),
            role: Role::Manager,
            name: "Sales Manager".to_string(),
            cloud_access: Some(grant_for(Role::Manager)),
        }
    }

    #[test]
    fn issued_token_verifies_to_same_claims() {
        let config = JwtConfig::new("test-secret").unwrap();
        let session = session();
        let token = config.issue(&session).unwrap();

        let claims = config.verify(&token).unwrap();
        assert_eq!(claims.session(), session);
        assert_eq!(claims.exp - claims.iat, SESSION_TTL_DAYS * 24 * 60 * 60);
    }

    #[test]
    fn extension_is_optional() {
        let config = JwtConfig::new("test-secret").unwrap();
        let session = SessionClaims { cloud_access: None, ..session() };
        let claims = config.verify(&config.issue(&session).unwrap()).unwrap();
        assert_eq!(claims.cloud_access, None);
    }

    #[test]
    fn other_secret_is_invalid_signature() {
        let s1 = JwtConfig::new("secret-one").unwrap();
        let s2 = JwtConfig::new("secret-two").unwrap();
        let token = s1.issue(&session()).unwrap();
        assert_eq!(s2.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn past_expiry_is_expired() {
        let config = JwtConfig::new("test-secret").unwrap();
        let issued = Utc::now() - Duration::days(SESSION_TTL_DAYS + 1);
        let token = config.issue_at(&session(), issued).unwrap();
        assert_eq!(config.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let config = JwtConfig::new("test-secret").unwrap();
        assert_eq!(config.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(config.verify(""), Err(TokenError::Malformed));
        assert_eq!(config.verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(JwtConfig::new(""), Err(AppError::Configuration(_))));
    }
}
