//! Task endpoints: listing, creation, lifecycle transitions, delegation,
//! verification, and the creator edit/delete window.
//!
//! Every decision is delegated to [`crate::policy`]; handlers only fetch
//! the snapshot, run the checks, and persist affirmative outcomes. Checks
//! run strictly before any mutation, so a denial never leaves partial
//! state behind.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Datelike, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Role, Task, TaskStatus, User, Verification};
use crate::policy;
use crate::store::{Comment, TaskFilter};

use super::auth::AuthUser;
use super::internal_error;
use super::routes::AppState;
use super::types::*;

// ─────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────

async fn load_task(state: &AppState, id: Uuid) -> Result<Task, (StatusCode, String)> {
    state
        .store
        .get_task(id)
        .await
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
}

/// The worker who performed the task: the delegate when delegated,
/// otherwise the assignee. Workers never see numeric ratings for their own
/// task.
fn is_worker(task: &Task, user_id: Uuid) -> bool {
    match task.delegated_to {
        Some(delegate) => delegate == user_id,
        None => task.assigned_to == Some(user_id),
    }
}

/// Staff may only see tasks assigned or delegated to them.
fn check_visibility(task: &Task, user: &AuthUser) -> Result<(), (StatusCode, String)> {
    if user.role == Role::Staff
        && task.assigned_to != Some(user.id)
        && task.delegated_to != Some(user.id)
    {
        return Err((StatusCode::FORBIDDEN, "Forbidden".to_string()));
    }
    Ok(())
}

/// Roles of the users a task involves (assignee, assigner), for the
/// "admins cannot touch super-admin tasks" rule.
async fn involved_roles(
    state: &AppState,
    task: &Task,
) -> Result<(Option<Role>, Option<Role>), (StatusCode, String)> {
    let assignee = match task.assigned_to {
        Some(id) => state.store.get_user(id).await.map_err(internal_error)?,
        None => None,
    };
    let assigner = match task.assigned_by {
        Some(id) => state.store.get_user(id).await.map_err(internal_error)?,
        None => None,
    };
    Ok((assignee.map(|u| u.role), assigner.map(|u| u.role)))
}

fn check_can_manage(
    user: &AuthUser,
    assignee_role: Option<Role>,
    assigner_role: Option<Role>,
) -> Result<(), (StatusCode, String)> {
    if policy::can_manage_task(user.role, assignee_role)
        && policy::can_manage_task(user.role, assigner_role)
    {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "Admins cannot modify super-admin tasks".to_string(),
        ))
    }
}

async fn user_map(state: &AppState) -> Result<HashMap<Uuid, User>, (StatusCode, String)> {
    let users = state.store.list_users().await.map_err(internal_error)?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

fn task_view(task: &Task, users: &HashMap<Uuid, User>, viewer: &AuthUser) -> TaskView {
    let view_of = |id: Option<Uuid>| id.and_then(|id| users.get(&id)).map(UserView::from);
    TaskView::new(
        task,
        view_of(task.assigned_to),
        view_of(task.assigned_by),
        view_of(task.delegated_to),
        is_worker(task, viewer.id),
    )
}

fn filled_roles(verifications: &[Verification]) -> Vec<crate::domain::VerifierRole> {
    verifications.iter().map(|v| v.verifier_role).collect()
}

// ─────────────────────────────────────────────────────────────────────────
// Listing and detail
// ─────────────────────────────────────────────────────────────────────────

/// GET /api/tasks - role-filtered task list.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskView>>, (StatusCode, String)> {
    let filter = TaskFilter {
        status: query.status,
        priority: query.priority,
        assignee: query.assignee,
        visible_to: (user.role == Role::Staff).then_some(user.id),
    };

    let mut tasks = state.store.list_tasks(&filter).await.map_err(internal_error)?;

    // Dashboard views work on due dates of still-open work.
    if let Some(view) = query.view.as_deref() {
        let today = Utc::now().date_naive();
        let active = |t: &Task| matches!(t.status, TaskStatus::Open | TaskStatus::InProgress);
        match view {
            "overdue" => {
                tasks.retain(|t| active(t) && t.due_date.is_some_and(|d| d < today));
            }
            "due_this_week" => {
                let week_start =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                let week_end = week_start + Duration::days(6);
                tasks.retain(|t| {
                    active(t) && t.due_date.is_some_and(|d| d >= week_start && d <= week_end)
                });
            }
            _ => return Err((StatusCode::BAD_REQUEST, format!("Unknown view: {view}"))),
        }
    }

    let users = user_map(&state).await?;

    // Admins don't see tasks involving super-admins, unless they are a
    // participant themselves (a super-admin may assign work *to* an admin).
    if user.role == Role::Admin {
        tasks.retain(|t| {
            if t.assigned_to == Some(user.id) || t.assigned_by == Some(user.id) {
                return true;
            }
            let role_of = |id: Option<Uuid>| id.and_then(|id| users.get(&id)).map(|u| u.role);
            role_of(t.assigned_to) != Some(Role::SuperAdmin)
                && role_of(t.assigned_by) != Some(Role::SuperAdmin)
        });
    }

    let views = tasks.iter().map(|t| task_view(t, &users, &user)).collect();
    Ok(Json(views))
}

/// GET /api/tasks/:id - task detail with verification state.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, (StatusCode, String)> {
    let task = load_task(&state, id).await?;
    check_visibility(&task, &user)?;

    let users = user_map(&state).await?;
    let verifications = state
        .store
        .list_verifications(task.id)
        .await
        .map_err(internal_error)?;

    let worker = is_worker(&task, user.id);
    let verification_views = verifications
        .iter()
        .map(|v| {
            let name = users.get(&v.verifier_id).and_then(|u| u.name.clone());
            VerificationView::new(v, name, worker)
        })
        .collect();

    // The slot picture only matters once the task reaches completed.
    let requirements = matches!(task.status, TaskStatus::Completed | TaskStatus::Verified).then(
        || {
            policy::verification_requirements(
                user.role,
                user.id,
                task.assigned_by,
                task.assigned_to,
                task.delegated_to,
                &filled_roles(&verifications),
            )
        },
    );

    Ok(Json(TaskDetailResponse {
        task: task_view(&task, &users, &user),
        verifications: verification_views,
        verification_requirements: requirements,
    }))
}

// ─────────────────────────────────────────────────────────────────────────
// Creation and deletion
// ─────────────────────────────────────────────────────────────────────────

/// POST /api/tasks - create a task (admin+ only).
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskView>), (StatusCode, String)> {
    if !policy::is_admin(user.role) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only admins can create tasks".to_string(),
        ));
    }

    let title = req.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title is required".to_string()));
    }

    if let Some(assignee_id) = req.assigned_to {
        let target = state
            .store
            .get_user(assignee_id)
            .await
            .map_err(internal_error)?
            .filter(|u| u.is_active)
            .ok_or((StatusCode::BAD_REQUEST, "Invalid assignee".to_string()))?;

        if !policy::can_assign_to(user.role, target.role) {
            return Err((
                StatusCode::FORBIDDEN,
                "Admins cannot assign tasks to super admins".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: req.description.as_deref().map(str::trim).filter(|d| !d.is_empty()).map(String::from),
        status: TaskStatus::Open,
        priority: req.priority.unwrap_or_default(),
        assigned_to: req.assigned_to,
        assigned_by: Some(user.id),
        delegated_to: None,
        due_date: req.due_date,
        completed_at: None,
        verified_by: None,
        verified_at: None,
        verification_rating: None,
        created_at: now,
        updated_at: now,
    };

    state.store.insert_task(&task).await.map_err(internal_error)?;
    state
        .store
        .log_activity(
            task.id,
            user.id,
            "created",
            json!({ "title": task.title, "assigned_to": task.assigned_to, "priority": task.priority }),
        )
        .await
        .map_err(internal_error)?;

    tracing::info!(task = %task.id, by = %user.email, "task created");

    let users = user_map(&state).await?;
    Ok((StatusCode::CREATED, Json(task_view(&task, &users, &user))))
}

/// DELETE /api/tasks/:id - creator only, inside the edit window, never
/// after verification. Super-admin creators bypass the window.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let task = load_task(&state, id).await?;

    if task.status.is_terminal() {
        return Err((
            StatusCode::FORBIDDEN,
            "Verified tasks cannot be deleted".to_string(),
        ));
    }

    if task.assigned_by != Some(user.id) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the task creator can delete this task".to_string(),
        ));
    }

    if user.role != Role::SuperAdmin
        && !policy::can_creator_delete(user.id, task.assigned_by, task.created_at, Utc::now())
    {
        return Err((
            StatusCode::FORBIDDEN,
            "The edit window for this task has closed".to_string(),
        ));
    }

    state.store.delete_task(task.id).await.map_err(internal_error)?;
    tracing::info!(task = %task.id, by = %user.email, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────
// Update: transitions, verification, delegation, field edits
// ─────────────────────────────────────────────────────────────────────────

/// PATCH /api/tasks/:id
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Response, (StatusCode, String)> {
    let mut task = load_task(&state, id).await?;

    // A verified task is immutable, full stop.
    if task.status.is_terminal() {
        return Err((
            StatusCode::FORBIDDEN,
            "Verified tasks cannot be modified".to_string(),
        ));
    }

    // Staff may only drive status on their own task; other fields are
    // ignored below because field edits are admin-gated.
    if user.role == Role::Staff
        && task.assigned_to != Some(user.id)
        && task.delegated_to != Some(user.id)
    {
        return Err((StatusCode::FORBIDDEN, "Forbidden".to_string()));
    }

    let now = Utc::now();
    let mut activity = serde_json::Map::new();
    let mut changed = false;
    let mut reopened = false;

    // ── Status change ────────────────────────────────────────────────────
    if let Some(to) = req.status.filter(|&to| to != task.status) {
        if to == TaskStatus::Verified {
            // Verification flow: validate payload, then authorize, then
            // write - and only then decide whether the task is complete.
            return verify_task(&state, &user, task, &req).await;
        }

        policy::check_transition(user.role, task.status, to).map_err(|e| {
            let code = match e {
                policy::TransitionDenied::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::FORBIDDEN,
            };
            (code, e.to_string())
        })?;

        activity.insert("from".into(), json!(task.status));
        activity.insert("to".into(), json!(to));

        if to == TaskStatus::Completed {
            task.completed_at = Some(now);
        }
        if to == TaskStatus::InProgress && task.status == TaskStatus::Completed {
            // Reopening discards all verification progress.
            task.completed_at = None;
            reopened = true;
        }
        task.status = to;
        changed = true;
    }

    // ── Delegation ───────────────────────────────────────────────────────
    if let Some(delegate) = req.delegated_to {
        if !policy::can_delegate(user.role, user.id, task.assigned_to) {
            return Err((
                StatusCode::FORBIDDEN,
                "You cannot delegate this task".to_string(),
            ));
        }
        match delegate {
            Some(delegate_id) => {
                let target = state
                    .store
                    .get_user(delegate_id)
                    .await
                    .map_err(internal_error)?
                    .filter(|u| u.is_active)
                    .ok_or((StatusCode::BAD_REQUEST, "Invalid delegate".to_string()))?;

                if !policy::can_delegate_to(target.role) {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "Tasks can only be delegated to staff members".to_string(),
                    ));
                }
                task.delegated_to = Some(delegate_id);
                activity.insert("delegated_to".into(), json!(delegate_id));
                activity.insert("to_name".into(), json!(target.name));
            }
            None => {
                task.delegated_to = None;
                activity.insert("undelegated".into(), json!(true));
            }
        }
        changed = true;
    }

    // ── Field edits (admin+, creator window) ─────────────────────────────
    if policy::is_admin(user.role) {
        let wants_field_edit = req.title.is_some()
            || req.description.is_some()
            || req.assigned_to.is_some()
            || req.due_date.is_some()
            || req.priority.is_some();

        if wants_field_edit {
            // Field edits on a task involving a super-admin are off-limits
            // to ordinary admins, whatever the edit window says.
            let (assignee_role, assigner_role) = involved_roles(&state, &task).await?;
            check_can_manage(&user, assignee_role, assigner_role)?;

            // Super-admins bypass the window; everyone else must be the
            // creator and inside 24 hours.
            if user.role != Role::SuperAdmin
                && !policy::can_creator_edit(user.id, task.assigned_by, task.created_at, now)
            {
                return Err((
                    StatusCode::FORBIDDEN,
                    "Only the creator can edit task details within 24 hours of creation"
                        .to_string(),
                ));
            }

            if let Some(title) = req.title.as_deref().map(str::trim) {
                if title.is_empty() {
                    return Err((StatusCode::BAD_REQUEST, "Title is required".to_string()));
                }
                if title != task.title {
                    activity
                        .insert("title_changed".into(), json!({ "from": task.title, "to": title }));
                    task.title = title.to_string();
                    changed = true;
                }
            }

            if let Some(description) = &req.description {
                let description = description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from);
                if description != task.description {
                    task.description = description;
                    changed = true;
                }
            }

            if let Some(assignee) = req.assigned_to {
                if assignee != task.assigned_to {
                    if let Some(assignee_id) = assignee {
                        let target = state
                            .store
                            .get_user(assignee_id)
                            .await
                            .map_err(internal_error)?
                            .filter(|u| u.is_active)
                            .ok_or((StatusCode::BAD_REQUEST, "Invalid assignee".to_string()))?;
                        if !policy::can_assign_to(user.role, target.role) {
                            return Err((
                                StatusCode::FORBIDDEN,
                                "Admins cannot assign tasks to super admins".to_string(),
                            ));
                        }
                    }
                    activity.insert(
                        "reassigned".into(),
                        json!({ "from": task.assigned_to, "to": assignee }),
                    );
                    task.assigned_to = assignee;
                    changed = true;
                }
            }

            if let Some(due_date) = req.due_date {
                if due_date != task.due_date {
                    activity.insert(
                        "due_date_changed".into(),
                        json!({ "from": task.due_date, "to": due_date }),
                    );
                    task.due_date = due_date;
                    changed = true;
                }
            }

            if let Some(priority) = req.priority {
                if priority != task.priority {
                    activity.insert("priority_changed".into(), json!(priority));
                    task.priority = priority;
                    changed = true;
                }
            }
        }
    }

    if !changed {
        return Err((StatusCode::BAD_REQUEST, "No changes to apply".to_string()));
    }

    task.updated_at = now;
    if reopened {
        state.store.reopen_task(&task).await.map_err(internal_error)?;
    } else {
        state.store.update_task(&task).await.map_err(internal_error)?;
    }

    let action = if activity.contains_key("from") {
        "status_changed"
    } else if activity.contains_key("delegated_to") {
        "delegated"
    } else if activity.contains_key("undelegated") {
        "undelegated"
    } else {
        "updated"
    };
    state
        .store
        .log_activity(task.id, user.id, action, serde_json::Value::Object(activity))
        .await
        .map_err(internal_error)?;

    let users = user_map(&state).await?;
    Ok(Json(task_view(&task, &users, &user)).into_response())
}

/// The `status: verified` arm of PATCH: record one verification slot and
/// promote the task only once every required slot is filled.
async fn verify_task(
    state: &AppState,
    user: &AuthUser,
    mut task: Task,
    req: &UpdateTaskRequest,
) -> Result<Response, (StatusCode, String)> {
    // Input validation precedes authorization.
    let rating = policy::validate_rating(
        req.verification_rating,
        req.verification_comment.as_deref(),
    )
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    policy::check_transition(user.role, task.status, TaskStatus::Verified).map_err(|e| {
        let code = match e {
            policy::TransitionDenied::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::FORBIDDEN,
        };
        (code, e.to_string())
    })?;

    let existing = state
        .store
        .list_verifications(task.id)
        .await
        .map_err(internal_error)?;

    let requirements = policy::verification_requirements(
        user.role,
        user.id,
        task.assigned_by,
        task.assigned_to,
        task.delegated_to,
        &filled_roles(&existing),
    );
    let Some(slot) = requirements.available_slot else {
        return Err((
            StatusCode::FORBIDDEN,
            "No verification slot is available for you".to_string(),
        ));
    };

    let now = Utc::now();

    // A low rating's mandatory justification lands in the task comments.
    let comment_id = match req.verification_comment.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => {
            let comment = Comment {
                id: Uuid::new_v4(),
                task_id: task.id,
                author_id: user.id,
                body: body.to_string(),
                context: Some("verification".to_string()),
                created_at: now,
            };
            state.store.insert_comment(&comment).await.map_err(internal_error)?;
            Some(comment.id)
        }
        _ => None,
    };

    let verification = Verification {
        id: Uuid::new_v4(),
        task_id: task.id,
        verifier_id: user.id,
        verifier_role: slot,
        rating,
        comment_id,
        created_at: now,
    };

    // The unique slot index is the final arbiter: a concurrent fill of the
    // same slot surfaces here as a conflict, not as data corruption.
    let inserted = state
        .store
        .insert_verification(&verification)
        .await
        .map_err(internal_error)?;
    if !inserted {
        return Err((
            StatusCode::CONFLICT,
            "This verification slot has already been filled".to_string(),
        ));
    }

    let verifications = state
        .store
        .list_verifications(task.id)
        .await
        .map_err(internal_error)?;
    let fully_verified = policy::is_fully_verified(
        task.delegated_to,
        task.assigned_by,
        task.assigned_to,
        &filled_roles(&verifications),
    );

    if fully_verified {
        let ratings: Vec<u8> = verifications.iter().map(|v| v.rating).collect();
        task.status = TaskStatus::Verified;
        task.verified_by = Some(user.id);
        task.verified_at = Some(now);
        task.verification_rating = policy::aggregate_rating(&ratings);
    }
    task.updated_at = now;
    state.store.update_task(&task).await.map_err(internal_error)?;

    state
        .store
        .log_activity(
            task.id,
            user.id,
            "verified",
            json!({
                "slot": slot,
                "rating": rating,
                "fully_verified": fully_verified,
            }),
        )
        .await
        .map_err(internal_error)?;

    tracing::info!(
        task = %task.id,
        slot = %slot,
        fully_verified,
        "verification recorded"
    );

    let users = user_map(state).await?;
    let outcome = VerifyOutcome {
        task: task_view(&task, &users, user),
        fully_verified,
    };
    Ok(Json(outcome).into_response())
}

// ─────────────────────────────────────────────────────────────────────────
// Activity and comments
// ─────────────────────────────────────────────────────────────────────────

/// GET /api/tasks/:id/activity
pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<crate::store::ActivityEntry>>, (StatusCode, String)> {
    let task = load_task(&state, id).await?;
    check_visibility(&task, &user)?;
    let entries = state.store.list_activity(task.id).await.map_err(internal_error)?;
    Ok(Json(entries))
}

/// GET /api/tasks/:id/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, (StatusCode, String)> {
    let task = load_task(&state, id).await?;
    check_visibility(&task, &user)?;
    let comments = state.store.list_comments(task.id).await.map_err(internal_error)?;
    Ok(Json(comments))
}

/// POST /api/tasks/:id/comments
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), (StatusCode, String)> {
    let task = load_task(&state, id).await?;
    check_visibility(&task, &user)?;

    if task.status.is_terminal() {
        return Err((
            StatusCode::FORBIDDEN,
            "Verified tasks cannot be modified".to_string(),
        ));
    }

    let body = req.body.trim();
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Comment cannot be empty".to_string()));
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        task_id: task.id,
        author_id: user.id,
        body: body.to_string(),
        context: req.context.clone(),
        created_at: Utc::now(),
    };
    state.store.insert_comment(&comment).await.map_err(internal_error)?;
    state
        .store
        .log_activity(task.id, user.id, "commented", json!({}))
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(comment)))
}
