//! User management endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::domain::User;
use crate::policy;

use super::auth::AuthUser;
use super::internal_error;
use super::routes::AppState;
use super::types::{CreateUserRequest, UpdateUserRequest, UserDetailView, UserView};

/// GET /api/users - admin+ only (used for assignment/delegation pickers),
/// with each user's center memberships attached.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<UserDetailView>>, (StatusCode, String)> {
    if !policy::is_admin(user.role) {
        return Err((StatusCode::FORBIDDEN, "Forbidden".to_string()));
    }
    let users = state.store.list_users().await.map_err(internal_error)?;
    let mut centers = state.store.user_centers_map().await.map_err(internal_error)?;
    Ok(Json(
        users
            .iter()
            .map(|u| UserDetailView {
                user: UserView::from(u),
                centers: centers.remove(&u.id).unwrap_or_default(),
            })
            .collect(),
    ))
}

/// POST /api/users - create a user of an equal or lower role.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), (StatusCode, String)> {
    if !policy::can_create_user(user.role, req.role) {
        return Err((
            StatusCode::FORBIDDEN,
            "You cannot create users with that role".to_string(),
        ));
    }

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "A valid email is required".to_string()));
    }
    if state
        .store
        .get_user_by_email(&email)
        .await
        .map_err(internal_error)?
        .is_some()
    {
        return Err((
            StatusCode::CONFLICT,
            "A user with that email already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let new_user = User {
        id: Uuid::new_v4(),
        email,
        name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        role: req.role,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_user(&new_user).await.map_err(internal_error)?;

    tracing::info!(user = %new_user.email, role = %new_user.role, by = %user.email, "user created");

    Ok((StatusCode::CREATED, Json(UserView::from(&new_user))))
}

/// PATCH /api/users/:id - edit or deactivate a user.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, (StatusCode, String)> {
    let mut target = state
        .store
        .get_user(id)
        .await
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if !policy::can_manage_user(user.role, target.role) {
        return Err((
            StatusCode::FORBIDDEN,
            "You cannot manage this user".to_string(),
        ));
    }

    if let Some(name) = req.name {
        target.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
    }
    if let Some(role) = req.role {
        // Promotions are bounded the same way creations are.
        if !policy::can_create_user(user.role, role) {
            return Err((
                StatusCode::FORBIDDEN,
                "You cannot grant that role".to_string(),
            ));
        }
        target.role = role;
    }
    if let Some(is_active) = req.is_active {
        target.is_active = is_active;
    }

    if let Some(center_ids) = &req.center_ids {
        let known: std::collections::HashSet<Uuid> = state
            .store
            .list_centers()
            .await
            .map_err(internal_error)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if center_ids.iter().any(|id| !known.contains(id)) {
            return Err((StatusCode::BAD_REQUEST, "Invalid center".to_string()));
        }
        state
            .store
            .set_user_centers(target.id, center_ids)
            .await
            .map_err(internal_error)?;
    }

    target.updated_at = Utc::now();
    state.store.update_user(&target).await.map_err(internal_error)?;

    Ok(Json(UserView::from(&target)))
}
