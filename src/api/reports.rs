//! Workload reports.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::domain::{Role, TaskStatus};
use crate::policy;
use crate::store::TaskFilter;

use super::auth::AuthUser;
use super::internal_error;
use super::routes::AppState;
use super::types::{UserReport, UserView};

/// GET /api/reports - per-user task summary, restricted by the viewer's
/// position in the role hierarchy (staff see nothing, admins don't see
/// super-admin workloads).
pub async fn get_reports(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<UserReport>>, (StatusCode, String)> {
    if user.role == Role::Staff {
        return Err((StatusCode::FORBIDDEN, "Forbidden".to_string()));
    }

    let users = state.store.list_users().await.map_err(internal_error)?;
    let tasks = state
        .store
        .list_tasks(&TaskFilter::default())
        .await
        .map_err(internal_error)?;
    let today = Utc::now().date_naive();

    let reports = users
        .iter()
        .filter(|u| policy::can_view_reports_for(user.role, u.role))
        .map(|u| {
            let mut report = UserReport {
                user: UserView::from(u),
                open: 0,
                in_progress: 0,
                completed: 0,
                verified: 0,
                overdue: 0,
                average_rating: None,
            };
            let mut rating_sum = 0u32;
            let mut rated = 0u32;

            for task in tasks.iter().filter(|t| t.assigned_to == Some(u.id)) {
                match task.status {
                    TaskStatus::Open => report.open += 1,
                    TaskStatus::InProgress => report.in_progress += 1,
                    TaskStatus::Completed => report.completed += 1,
                    TaskStatus::Verified => report.verified += 1,
                }
                if matches!(task.status, TaskStatus::Open | TaskStatus::InProgress)
                    && task.due_date.is_some_and(|d| d < today)
                {
                    report.overdue += 1;
                }
                if let Some(rating) = task.verification_rating {
                    rating_sum += u32::from(rating);
                    rated += 1;
                }
            }

            if rated > 0 {
                report.average_rating = Some(f64::from(rating_sum) / f64::from(rated));
            }
            report
        })
        .collect();

    Ok(Json(reports))
}
