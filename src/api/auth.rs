//! Minimal JWT auth for the dashboard.
//!
//! - Client submits an email (plus the instance access key outside dev
//!   mode) to `/api/auth/login`
//! - Server returns a JWT valid for `JWT_TTL_DAYS`
//! - All other API endpoints require `Authorization: Bearer <jwt>`
//!
//! The authenticated user record is re-read from the store on every
//! request, so role changes and deactivation take effect immediately. The
//! permission core never sees tokens - only the resolved [`AuthUser`].

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Role;

use super::routes::AppState;
use super::types::{LoginRequest, LoginResponse, UserView};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    /// Subject: the user id.
    sub: Uuid,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
}

/// The authenticated actor, injected into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}

fn issue_jwt(secret: &str, ttl_days: i64, user_id: Uuid) -> anyhow::Result<(String, i64)> {
    let now = Utc::now();
    let exp = now + Duration::days(ttl_days.max(1));
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    // Outside dev mode the shared access key is checked first. A single
    // generic message covers every failure to avoid account enumeration.
    if !state.config.dev_mode {
        let presented = req.access_key.as_deref().unwrap_or("");
        let expected = state.config.access_key.as_deref().unwrap_or("");
        if expected.is_empty() || !constant_time_eq(presented, expected) {
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()));
        }
    }

    let email = req.email.trim().to_lowercase();
    let user = state
        .store
        .get_user_by_email(&email)
        .await
        .map_err(super::internal_error)?
        .filter(|u| u.is_active)
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))?;

    let (token, expires_at) = issue_jwt(
        state.config.jwt_secret(),
        state.config.token_ttl_days,
        user.id,
    )
    .map_err(super::internal_error)?;

    tracing::info!(user = %user.email, role = %user.role, "login");

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: UserView::from(&user),
    }))
}

/// Middleware: validate the bearer token and inject [`AuthUser`].
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?;

    let claims = verify_jwt(token, state.config.jwt_secret())
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?;

    let user = state
        .store
        .get_user(claims.sub)
        .await
        .map_err(super::internal_error)?
        .filter(|u| u.is_active)
        .ok_or((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        role: user.role,
        email: user.email,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_round_trip() {
        let id = Uuid::new_v4();
        let (token, exp) = issue_jwt("secret", 7, id).unwrap();
        assert!(exp > Utc::now().timestamp());

        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, id);

        assert!(verify_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
