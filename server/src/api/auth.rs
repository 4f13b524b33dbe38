//! Bearer JWT authentication
//!
//! Tokens are HS256 with `{sub, admin, exp}` claims. Issuance happens
//! elsewhere; this module only validates and exposes the caller identity.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Deserializer, Serialize};

use super::types::ApiError;

/// JWT validation error
#[derive(Debug)]
pub enum JwtError {
    Missing,
    Expired,
    InvalidSignature,
    Invalid(String),
}

impl fmt::Display for JwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "Missing bearer token"),
            Self::Expired => write!(f, "Token has expired"),
            Self::InvalidSignature => write!(f, "Invalid token signature"),
            Self::Invalid(msg) => write!(f, "Invalid token: {}", msg),
        }
    }
}

impl std::error::Error for JwtError {}

impl IntoResponse for JwtError {
    fn into_response(self) -> Response {
        let code = match self {
            Self::Missing => "AUTH_REQUIRED",
            Self::Expired => "TOKEN_EXPIRED",
            Self::InvalidSignature | Self::Invalid(_) => "TOKEN_INVALID",
        };
        ApiError::unauthorized(code, self.to_string()).into_response()
    }
}

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Accepts `true`, `"true"`, `"1"` or `1`
    #[serde(default, deserialize_with = "deserialize_admin")]
    pub admin: bool,
    pub exp: i64,
}

fn deserialize_admin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s == "true" || s == "1",
        serde_json::Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub is_admin: bool,
}

/// Sign a token for `username`, valid for `ttl`
pub fn create_token(
    secret: &[u8],
    username: &str,
    is_admin: bool,
    ttl: Duration,
) -> Result<String, JwtError> {
    let claims = Claims {
        sub: username.to_string(),
        admin: is_admin,
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Invalid(e.to_string()))
}

/// Validate and decode a token
pub fn validate_token(token: &str, key: &DecodingKey) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::Invalid(e.to_string()),
    })?;

    if data.claims.sub.is_empty() {
        return Err(JwtError::Invalid("empty subject".to_string()));
    }
    Ok(data.claims)
}

/// Shared state for [`require_auth`]
#[derive(Clone)]
pub struct AuthState {
    key: Arc<DecodingKey>,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    fn authenticate(&self, request: &Request) -> Result<AuthUser, JwtError> {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(JwtError::Missing)?;
        let claims = validate_token(token, &self.key)?;
        Ok(AuthUser {
            username: claims.sub,
            is_admin: claims.admin,
        })
    }
}

/// Reject requests without a valid bearer token
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.authenticate(&request) {
        Ok(user) => {
            tracing::trace!(user = %user.username, admin = user.is_admin, "Authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "Authentication failed");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn key() -> DecodingKey {
        DecodingKey::from_secret(SECRET)
    }

    #[test]
    fn test_create_and_validate() {
        let token = create_token(SECRET, "alice", true, Duration::minutes(5)).unwrap();
        let claims = validate_token(&token, &key()).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.admin);
    }

    #[test]
    fn test_invalid_signature() {
        let token = create_token(b"other", "alice", false, Duration::minutes(5)).unwrap();
        assert!(matches!(
            validate_token(&token, &key()),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired() {
        let token = create_token(SECRET, "alice", false, Duration::hours(-2)).unwrap();
        assert!(matches!(
            validate_token(&token, &key()),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_admin_claim_forms() {
        for (raw, expected) in [
            (r#"true"#, true),
            (r#""true""#, true),
            (r#""1""#, true),
            (r#"1"#, true),
            (r#"0"#, false),
            (r#""yes""#, false),
        ] {
            let json = format!(r#"{{"sub":"bob","admin":{},"exp":0}}"#, raw);
            let claims: Claims = serde_json::from_str(&json).unwrap();
            assert_eq!(claims.admin, expected, "admin = {}", raw);
        }

        let claims: Claims = serde_json::from_str(r#"{"sub":"bob","exp":0}"#).unwrap();
        assert!(!claims.admin);
    }
}
