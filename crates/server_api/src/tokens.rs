//! HS256 access/refresh tokens for the sandbox.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::Role,
    error::{ApiError, ErrorCode},
    protocol::{TokenPair, TokenRefreshResponse},
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(access_ttl_seconds),
            refresh_ttl: Duration::seconds(refresh_ttl_seconds),
        }
    }

    pub fn issue_pair(&self, username: &str, role: Role) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access: self.issue(username, role, TokenKind::Access)?,
            refresh: self.issue(username, role, TokenKind::Refresh)?,
        })
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            ApiError::new(ErrorCode::Unauthorized, format!("invalid token: {err}"))
        })?;
        if data.claims.kind != expected {
            return Err(ApiError::new(
                ErrorCode::Unauthorized,
                "token type is not valid for this operation",
            ));
        }
        Ok(data.claims)
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, ApiError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        Ok(TokenRefreshResponse {
            access: self.issue(&claims.sub, claims.role, TokenKind::Access)?,
            refresh: None,
        })
    }

    fn issue(&self, username: &str, role: Role, kind: TokenKind) -> Result<String, ApiError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: username.to_string(),
            role,
            kind,
            exp: (Utc::now() + ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ApiError::new(ErrorCode::Internal, format!("token signing failed: {err}")))
    }
}
