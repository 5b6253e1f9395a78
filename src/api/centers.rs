//! Center endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Center, Role};

use super::auth::AuthUser;
use super::internal_error;
use super::routes::AppState;
use super::types::CreateCenterRequest;

/// GET /api/centers - active centers, for membership pickers.
pub async fn list_centers(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<Vec<Center>>, (StatusCode, String)> {
    let centers = state.store.list_centers().await.map_err(internal_error)?;
    Ok(Json(centers))
}

/// POST /api/centers - super-admin only.
pub async fn create_center(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateCenterRequest>,
) -> Result<(StatusCode, Json<Center>), (StatusCode, String)> {
    if user.role != Role::SuperAdmin {
        return Err((
            StatusCode::FORBIDDEN,
            "Only super admins can create centers".to_string(),
        ));
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Center name is required".to_string()));
    }

    let center = Center {
        id: Uuid::new_v4(),
        name: name.to_string(),
        is_active: true,
        created_at: Utc::now(),
    };
    let inserted = state.store.insert_center(&center).await.map_err(internal_error)?;
    if !inserted {
        return Err((
            StatusCode::CONFLICT,
            "A center with this name already exists".to_string(),
        ));
    }

    tracing::info!(center = %center.name, by = %user.email, "center created");

    Ok((StatusCode::CREATED, Json(center)))
}
