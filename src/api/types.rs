//! Request and response bodies.
//!
//! View types own the one piece of presentation policy the API enforces:
//! the worker who performed a task never sees its numeric ratings, only
//! the verified/not-verified outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::domain::{Center, Role, Task, TaskPriority, TaskStatus, User, Verification, VerifierRole};
use crate::policy::VerificationRequirements;

/// Deserialize a PATCH field that distinguishes "absent" (don't touch)
/// from "null" (clear it). Pair with `#[serde(default)]`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

// ─────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub access_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: UserView,
}

// ─────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// When present, replaces the user's center memberships.
    pub center_ids: Option<Vec<Uuid>>,
}

/// GET /api/users row: the user plus their center memberships.
#[derive(Debug, Serialize)]
pub struct UserDetailView {
    #[serde(flatten)]
    pub user: UserView,
    pub centers: Vec<Center>,
}

// ─────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
}

/// PATCH /api/tasks/:id body. Every field is optional; the nullable ones
/// use [`double_option`] so "set to null" and "leave alone" stay distinct.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub status: Option<TaskStatus>,
    /// Kept as a raw number so non-integer payloads reach validation
    /// instead of failing deserialization with an opaque error.
    pub verification_rating: Option<f64>,
    pub verification_comment: Option<String>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub delegated_to: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<Uuid>,
    /// Dashboard views: `overdue` or `due_this_week`.
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<UserView>,
    pub assigned_by: Option<UserView>,
    pub delegated_to: Option<UserView>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    /// Hidden from the task's worker.
    pub verification_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskView {
    pub fn new(
        task: &Task,
        assigned_to: Option<UserView>,
        assigned_by: Option<UserView>,
        delegated_to: Option<UserView>,
        redact_rating: bool,
    ) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            priority: task.priority,
            assigned_to,
            assigned_by,
            delegated_to,
            due_date: task.due_date,
            completed_at: task.completed_at,
            verified_at: task.verified_at,
            verification_rating: if redact_rating {
                None
            } else {
                task.verification_rating
            },
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Verification
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct VerificationView {
    pub id: Uuid,
    pub verifier_id: Uuid,
    pub verifier_name: Option<String>,
    pub verifier_role: VerifierRole,
    /// Hidden from the task's worker.
    pub rating: Option<u8>,
    pub comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl VerificationView {
    pub fn new(v: &Verification, verifier_name: Option<String>, redact_rating: bool) -> Self {
        Self {
            id: v.id,
            verifier_id: v.verifier_id,
            verifier_name,
            verifier_role: v.verifier_role,
            rating: (!redact_rating).then_some(v.rating),
            comment_id: v.comment_id,
            created_at: v.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: TaskView,
    pub verifications: Vec<VerificationView>,
    /// Present once the task has reached `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_requirements: Option<VerificationRequirements>,
}

/// Response to a `status: verified` PATCH: the task plus whether this
/// verification was the one that completed the set.
#[derive(Debug, Serialize)]
pub struct VerifyOutcome {
    #[serde(flatten)]
    pub task: TaskView,
    pub fully_verified: bool,
}

// ─────────────────────────────────────────────────────────────────────────
// Centers and dashboard
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCenterRequest {
    pub name: String,
}

/// One dashboard timeline entry: a recent create/transition/delegation
/// event with enough context to render a sentence.
#[derive(Debug, Serialize)]
pub struct TimelineItem {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_title: String,
    pub actor_name: String,
    pub action: String,
    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
    pub assigned_to_name: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub delegated_to_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Compact task row for the dashboard lists.
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to_name: Option<String>,
}

/// A recent comment on a task the viewer can see.
#[derive(Debug, Serialize)]
pub struct DashboardComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_title: String,
    pub author_name: String,
    pub body: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    /// Active (open or in-progress) tasks visible to the viewer.
    pub open: u32,
    pub due_this_week: u32,
    pub overdue: u32,
    /// Completed tasks awaiting verification. Admin+ only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_verification: Option<u32>,
    pub timeline: Vec<TimelineItem>,
    pub my_tasks: Vec<TaskSummary>,
    pub assigned_by_me: Vec<TaskSummary>,
    pub recent_comments: Vec<DashboardComment>,
}

// ─────────────────────────────────────────────────────────────────────────
// Comments, reports, health
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
    pub context: Option<String>,
}

/// One row of GET /api/reports.
#[derive(Debug, Serialize)]
pub struct UserReport {
    pub user: UserView,
    pub open: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub verified: u32,
    pub overdue: u32,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
}
