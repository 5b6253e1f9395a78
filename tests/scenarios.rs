//! End-to-end scenarios through the HTTP handlers, backed by an in-memory
//! store: the single-verifier path, the delegated two-verifier path,
//! reopening, and the creator edit window.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Extension, Json, Path, State};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use uuid::Uuid;

use opsboard::api::auth::AuthUser;
use opsboard::api::routes::AppState;
use opsboard::api::types::{
    CreateCenterRequest, CreateTaskRequest, UpdateTaskRequest, UpdateUserRequest,
};
use opsboard::api::{centers, dashboard, tasks, users};
use opsboard::config::Config;
use opsboard::domain::{Role, TaskStatus, User};
use opsboard::store::Store;

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: PathBuf::from("/tmp"),
        dev_mode: true,
        access_key: None,
        jwt_secret: None,
        token_ttl_days: 1,
    }
}

async fn new_user(state: &AppState, role: Role, name: &str) -> AuthUser {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", Uuid::new_v4()),
        name: Some(name.to_string()),
        role,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_user(&user).await.unwrap();
    AuthUser {
        id: user.id,
        role: user.role,
        email: user.email,
    }
}

async fn setup() -> Arc<AppState> {
    Arc::new(AppState {
        config: test_config(),
        store: Store::open_in_memory().unwrap(),
    })
}

async fn create_task(state: &Arc<AppState>, actor: &AuthUser, assigned_to: Uuid) -> Uuid {
    let (code, body) = tasks::create_task(
        State(Arc::clone(state)),
        Extension(actor.clone()),
        Json(CreateTaskRequest {
            title: "Monthly inventory count".to_string(),
            description: None,
            assigned_to: Some(assigned_to),
            due_date: None,
            priority: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(code, StatusCode::CREATED);
    body.0.id
}

async fn patch(
    state: &Arc<AppState>,
    actor: &AuthUser,
    task_id: Uuid,
    req: UpdateTaskRequest,
) -> Result<(), (StatusCode, String)> {
    tasks::update_task(
        State(Arc::clone(state)),
        Extension(actor.clone()),
        Path(task_id),
        Json(req),
    )
    .await
    .map(|_| ())
}

fn set_status(status: TaskStatus) -> UpdateTaskRequest {
    UpdateTaskRequest {
        status: Some(status),
        ..Default::default()
    }
}

fn verify(rating: f64, comment: Option<&str>) -> UpdateTaskRequest {
    UpdateTaskRequest {
        status: Some(TaskStatus::Verified),
        verification_rating: Some(rating),
        verification_comment: comment.map(String::from),
        ..Default::default()
    }
}

#[tokio::test]
async fn single_verifier_path() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &admin, staff.id).await;

    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();

    // One rating from the creator fully verifies a non-delegated task.
    patch(&state, &admin, task_id, verify(4.0, None)).await.unwrap();

    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Verified);
    assert_eq!(task.verification_rating, Some(4));
    assert!(task.verified_at.is_some());
    assert_eq!(task.verified_by, Some(admin.id));
}

#[tokio::test]
async fn delegated_task_needs_two_verifications() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin B").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &super_admin, admin.id).await;

    // The assignee delegates execution to a staff member.
    patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            delegated_to: Some(Some(staff.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();

    // First verification (the super-admin, as assigner) leaves the task
    // partially verified.
    patch(&state, &super_admin, task_id, verify(4.0, None))
        .await
        .unwrap();
    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.verification_rating, None);

    // Second verification (the delegating admin) completes the set;
    // mean of 4 and 5 rounds half-up to 5.
    patch(&state, &admin, task_id, verify(5.0, None)).await.unwrap();
    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Verified);
    assert_eq!(task.verification_rating, Some(5));

    let verifications = state.store.list_verifications(task_id).await.unwrap();
    assert_eq!(verifications.len(), 2);
}

#[tokio::test]
async fn reopening_discards_verification_progress() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin B").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &super_admin, admin.id).await;
    patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            delegated_to: Some(Some(staff.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();
    patch(&state, &super_admin, task_id, verify(4.0, None))
        .await
        .unwrap();
    assert_eq!(state.store.list_verifications(task_id).await.unwrap().len(), 1);

    // Reopen: the partial verification is gone, not parked.
    patch(&state, &admin, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    assert!(state.store.list_verifications(task_id).await.unwrap().is_empty());
    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.completed_at, None);

    // Complete again; a single verification is again only partial.
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();
    patch(&state, &super_admin, task_id, verify(5.0, None))
        .await
        .unwrap();
    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn staff_cannot_verify() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &admin, staff.id).await;
    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();

    let err = patch(&state, &staff, task_id, verify(5.0, None))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rating_payload_is_validated_before_anything_else() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &admin, staff.id).await;
    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();

    for bad in [verify(0.0, None), verify(6.0, None), verify(2.5, Some("meh"))] {
        let err = patch(&state, &admin, task_id, bad).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    // Low rating without justification is refused; with one it passes.
    let err = patch(&state, &admin, task_id, verify(3.0, None))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
    patch(&state, &admin, task_id, verify(3.0, Some("shelves mislabeled")))
        .await
        .unwrap();

    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Verified);
    assert_eq!(task.verification_rating, Some(3));

    // The justification was recorded as a verification comment.
    let comments = state.store.list_comments(task_id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].context.as_deref(), Some("verification"));
}

#[tokio::test]
async fn verified_tasks_are_immutable() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &admin, staff.id).await;
    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();
    patch(&state, &admin, task_id, verify(5.0, None)).await.unwrap();

    let err = patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            title: Some("New title".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    // Deleting a verified task is also refused, creator or not.
    let err = tasks::delete_task(
        State(Arc::clone(&state)),
        Extension(admin.clone()),
        Path(task_id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn edit_window_closes_after_24_hours() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &admin, staff.id).await;

    // Inside the window the creator may edit.
    patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            title: Some("Recount the back room".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // Age the task past the window.
    let mut task = state.store.get_task(task_id).await.unwrap().unwrap();
    task.created_at = Utc::now() - Duration::hours(25);
    state.store.update_task(&task).await.unwrap();

    let err = patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            title: Some("Too late".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    let err = tasks::delete_task(
        State(Arc::clone(&state)),
        Extension(admin.clone()),
        Path(task_id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn super_admin_bypasses_edit_window() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let task_id = create_task(&state, &super_admin, staff.id).await;
    let mut task = state.store.get_task(task_id).await.unwrap().unwrap();
    task.created_at = Utc::now() - Duration::hours(48);
    state.store.update_task(&task).await.unwrap();

    patch(
        &state,
        &super_admin,
        task_id,
        UpdateTaskRequest {
            title: Some("Still editable".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    tasks::delete_task(
        State(Arc::clone(&state)),
        Extension(super_admin.clone()),
        Path(task_id),
    )
    .await
    .unwrap();
    assert!(state.store.get_task(task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn admin_cannot_edit_super_admin_task_details() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin B").await;

    let task_id = create_task(&state, &super_admin, admin.id).await;

    let err = patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            title: Some("Mine now".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    // Status transitions on their own assignment are still allowed.
    patch(&state, &admin, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
}

#[tokio::test]
async fn delegation_is_restricted_to_staff_targets() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let other_admin = new_user(&state, Role::Admin, "Admin B").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    // Admin delegating a task assigned to someone else: refused.
    let task_id = create_task(&state, &admin, staff.id).await;
    let err = patch(
        &state,
        &other_admin,
        task_id,
        UpdateTaskRequest {
            delegated_to: Some(Some(staff.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    // Delegating to a non-staff target: refused.
    let own_task = create_task(&state, &admin, admin.id).await;
    let err = patch(
        &state,
        &admin,
        own_task,
        UpdateTaskRequest {
            delegated_to: Some(Some(other_admin.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    // Delegating their own task to staff: allowed.
    patch(
        &state,
        &admin,
        own_task,
        UpdateTaskRequest {
            delegated_to: Some(Some(staff.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn only_super_admins_create_centers() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;

    let err = centers::create_center(
        State(Arc::clone(&state)),
        Extension(admin.clone()),
        Json(CreateCenterRequest {
            name: "North".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    let (code, _) = centers::create_center(
        State(Arc::clone(&state)),
        Extension(super_admin.clone()),
        Json(CreateCenterRequest {
            name: "North".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(code, StatusCode::CREATED);

    // Duplicate names are refused.
    let err = centers::create_center(
        State(Arc::clone(&state)),
        Extension(super_admin.clone()),
        Json(CreateCenterRequest {
            name: "North".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn dashboard_scopes_admin_to_center_mates() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;
    let outsider = new_user(&state, Role::Staff, "Staff T").await;

    // One center holding the admin and one staff member.
    let (_, center) = centers::create_center(
        State(Arc::clone(&state)),
        Extension(super_admin.clone()),
        Json(CreateCenterRequest {
            name: "North".to_string(),
        }),
    )
    .await
    .unwrap();
    for member in [admin.id, staff.id] {
        users::update_user(
            State(Arc::clone(&state)),
            Extension(super_admin.clone()),
            Path(member),
            Json(UpdateUserRequest {
                center_ids: Some(vec![center.0.id]),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    }

    let in_center = create_task(&state, &super_admin, staff.id).await;
    let _outside = create_task(&state, &super_admin, outsider.id).await;

    // The admin's dashboard counts only the center-mate's task.
    let dash = dashboard::get_dashboard(State(Arc::clone(&state)), Extension(admin.clone()))
        .await
        .unwrap();
    assert_eq!(dash.0.open, 1);
    assert_eq!(dash.0.pending_verification, Some(0));
    assert_eq!(dash.0.timeline.len(), 1);
    assert_eq!(dash.0.timeline[0].task_id, in_center);

    // The super-admin sees both.
    let dash = dashboard::get_dashboard(State(Arc::clone(&state)), Extension(super_admin.clone()))
        .await
        .unwrap();
    assert_eq!(dash.0.open, 2);
    assert_eq!(dash.0.timeline.len(), 2);

    // Staff see their own work and no verification counter.
    let dash = dashboard::get_dashboard(State(Arc::clone(&state)), Extension(staff.clone()))
        .await
        .unwrap();
    assert_eq!(dash.0.open, 1);
    assert_eq!(dash.0.pending_verification, None);
    assert_eq!(dash.0.my_tasks.len(), 1);
    assert_eq!(dash.0.my_tasks[0].id, in_center);
    assert!(dash.0.assigned_by_me.is_empty());
}

#[tokio::test]
async fn dashboard_admin_without_centers_sees_only_own_tasks() {
    let state = setup().await;
    let super_admin = new_user(&state, Role::SuperAdmin, "SA").await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    let own = create_task(&state, &admin, staff.id).await;
    let _other = create_task(&state, &super_admin, staff.id).await;

    let dash = dashboard::get_dashboard(State(Arc::clone(&state)), Extension(admin.clone()))
        .await
        .unwrap();
    assert_eq!(dash.0.open, 1);
    assert_eq!(dash.0.assigned_by_me.len(), 1);
    assert_eq!(dash.0.assigned_by_me[0].id, own);
    assert_eq!(dash.0.timeline.len(), 1);
    assert_eq!(dash.0.timeline[0].task_id, own);
}

#[tokio::test]
async fn self_assigned_delegated_task_needs_one_verification() {
    let state = setup().await;
    let admin = new_user(&state, Role::Admin, "Admin A").await;
    let staff = new_user(&state, Role::Staff, "Staff S").await;

    // Admin assigns the task to themselves, then delegates it.
    let task_id = create_task(&state, &admin, admin.id).await;
    patch(
        &state,
        &admin,
        task_id,
        UpdateTaskRequest {
            delegated_to: Some(Some(staff.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::InProgress))
        .await
        .unwrap();
    patch(&state, &staff, task_id, set_status(TaskStatus::Completed))
        .await
        .unwrap();

    // Only the collapsed assigner slot exists; one rating verifies.
    patch(&state, &admin, task_id, verify(4.0, None)).await.unwrap();
    let task = state.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Verified);
    assert_eq!(task.verification_rating, Some(4));
}
