//! Agent authentication: HS256 bearer tokens

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::unix_millis;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by an agent token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClaims {
    /// Agent id
    pub sub: Uuid,
    /// Expiration time (Unix seconds)
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
    /// Display name suggested by the issuer
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Verify an HS256 token and extract its claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<AgentClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let header: TokenHeader = decode_segment(header_b64)?;
    if header.alg != "HS256" {
        return Err(AuthError::UnsupportedAlgorithm);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());

    let provided = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: AgentClaims = decode_segment(payload_b64)?;
    if claims.exp < unix_millis() / 1000 {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let json = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&json).map_err(|_| AuthError::InvalidToken)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Token expired")]
    TokenExpired,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken | Self::UnsupportedAlgorithm => "invalid_token",
            Self::TokenExpired => "token_expired",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Authenticated agent, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent {
    pub agent_id: Uuid,
    pub claims: AgentClaims,
}

/// Middleware to require a valid agent token
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::MissingToken)?;

    let claims = verify_jwt(bearer.token(), &state.config.agent_jwt_secret).map_err(|e| {
        debug!(error = %e, "Agent token rejected");
        e
    })?;

    request.extensions_mut().insert(AuthenticatedAgent {
        agent_id: claims.sub,
        claims,
    });

    Ok(next.run(request).await)
}
