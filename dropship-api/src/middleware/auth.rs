use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use dropship_core::identity::{Requester, Role};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Issued by the external auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn requester(&self) -> Option<Requester> {
        let user_id = Uuid::parse_str(&self.sub).ok()?;
        let role: Role = self.role.parse().ok()?;
        Some(Requester { user_id, role })
    }
}

/// Signs a token for `requester`. Used by tooling and tests; production tokens
/// come from the auth service with the same secret.
pub fn encode_token(
    secret: &str,
    requester: &Requester,
    email: &str,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = chrono::Utc::now().timestamp() as u64 + ttl_seconds;
    let claims = Claims {
        sub: requester.user_id.to_string(),
        email: email.to_string(),
        role: requester.role.as_str().to_string(),
        exp: exp as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let requester = token_data.claims.requester().ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(requester);
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Operator Gate (runs after auth_middleware)
// ============================================================================

pub async fn operator_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let requester = req
        .extensions()
        .get::<Requester>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !requester.is_operator() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
