/*!
 * # Authentication Module
 *
 * Bearer-token identity for the storefront API. Tokens are HS256 JWTs issued
 * by the hosted auth provider (or by [`AuthService::issue_token`] in tests
 * and local development); this module only validates them and exposes the
 * caller's identity to handlers.
 *
 * Checkout permits anonymous callers: a missing or invalid token resolves to
 * the [`ANONYMOUS_USER`] sentinel, which downstream reconciliation treats as
 * "client-side recording only".
 */
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Reserved identity for checkouts made without a bearer token. Pending
/// purchases staged under this id are never reconciled server-side.
pub const ANONYMOUS_USER: Uuid = Uuid::nil();

/// Claim structure for JWT tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: Option<String>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Authenticated caller extracted from a validated token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication token has expired")]
    ExpiredToken,
    #[error("Failed to create token: {0}")]
    TokenCreation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "AUTH_MISSING"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_TOKEN"),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "AUTH_TOKEN_EXPIRED"),
            AuthError::TokenCreation(_) | AuthError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_INTERNAL_ERROR")
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Validates (and, for tests and local development, issues) bearer tokens.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime_secs: i64,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_lifetime_secs: usize) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_lifetime_secs: token_lifetime_secs as i64,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })
    }

    pub fn issue_token(&self, user_id: Uuid, email: Option<&str>) -> Result<String, AuthError> {
        self.issue_token_with_lifetime(user_id, email, self.token_lifetime_secs)
    }

    fn issue_token_with_lifetime(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        lifetime_secs: i64,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            iat: now,
            exp: now + lifetime_secs,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::TokenCreation(err.to_string()))
    }

    /// Resolves the caller for endpoints that permit anonymous access.
    /// A missing or invalid bearer token falls back to [`ANONYMOUS_USER`].
    pub fn resolve_user(&self, headers: &HeaderMap) -> Uuid {
        match bearer_token(headers) {
            Some(token) => match self.validate_token(token) {
                Ok(claims) => Uuid::parse_str(&claims.sub).unwrap_or(ANONYMOUS_USER),
                Err(err) => {
                    debug!(error = %err, "invalid bearer token, proceeding anonymously");
                    ANONYMOUS_USER
                }
            },
            None => ANONYMOUS_USER,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| AuthError::Internal("authentication service not available".into()))?;

        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingAuth)?;
        let claims = auth_service.validate_token(token)?;
        // A structurally valid v1-v5 UUID; the nil sentinel never
        // authenticates.
        if !crate::security::is_valid_uuid(&claims.sub) {
            return Err(AuthError::InvalidToken);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthenticatedUser {
            user_id,
            email: claims.email,
        })
    }
}

/// Injects the shared [`AuthService`] into request extensions so extractors
/// can validate tokens without reaching into application state.
pub async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}
