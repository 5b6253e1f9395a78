//! Dashboard feed: week stats, a recent-activity timeline, the pending
//! verification count, the viewer's task lists, and recent comments, all
//! scoped to what the viewer may see.
//!
//! Admin scoping here is stricter than on the task list: an admin's
//! dashboard covers users sharing a center with them (plus themselves),
//! never super-admins, and an admin with no centers sees only their own
//! tasks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use crate::domain::{Role, Task, TaskStatus, User};
use crate::policy;
use crate::store::TaskFilter;

use super::auth::AuthUser;
use super::internal_error;
use super::routes::AppState;
use super::types::{DashboardComment, DashboardResponse, TaskSummary, TimelineItem};

/// Actions worth surfacing on the timeline. Comment and verification
/// traffic has its own feeds.
const TIMELINE_ACTIONS: [&str; 4] = ["created", "status_changed", "delegated", "undelegated"];

const FEED_LIMIT: usize = 10;

/// Over-fetch factor for feeds that are post-filtered by visibility.
const FETCH_LIMIT: u32 = 100;

fn display_name(user: &User) -> String {
    user.name
        .clone()
        .unwrap_or_else(|| user.email.split('@').next().unwrap_or_default().to_string())
}

fn summary(task: &Task, users: &HashMap<Uuid, User>) -> TaskSummary {
    TaskSummary {
        id: task.id,
        title: task.title.clone(),
        status: task.status,
        priority: task.priority,
        due_date: task.due_date,
        assigned_to_name: task
            .assigned_to
            .and_then(|id| users.get(&id))
            .map(display_name),
    }
}

/// GET /api/dashboard
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DashboardResponse>, (StatusCode, String)> {
    let users: HashMap<Uuid, User> = state
        .store
        .list_users()
        .await
        .map_err(internal_error)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    // Admin visibility: center-mates plus the admin, minus super-admins.
    let admin_visible: Option<HashSet<Uuid>> = if user.role == Role::Admin {
        let mut ids: HashSet<Uuid> = state
            .store
            .center_member_ids(user.id)
            .await
            .map_err(internal_error)?
            .into_iter()
            .collect();
        ids.insert(user.id);
        ids.retain(|id| users.get(id).map_or(true, |u| u.role != Role::SuperAdmin));
        Some(ids)
    } else {
        None
    };

    let filter = TaskFilter {
        visible_to: (user.role == Role::Staff).then_some(user.id),
        ..Default::default()
    };
    let mut tasks = state.store.list_tasks(&filter).await.map_err(internal_error)?;
    if let Some(visible) = &admin_visible {
        tasks.retain(|t| {
            t.assigned_to.is_some_and(|id| visible.contains(&id))
                || t.assigned_by == Some(user.id)
        });
    }

    // Week stats over active tasks, Monday-start week.
    let today = Utc::now().date_naive();
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let week_end = week_start + Duration::days(6);
    let mut open = 0u32;
    let mut due_this_week = 0u32;
    let mut overdue = 0u32;
    for task in tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Open | TaskStatus::InProgress))
    {
        open += 1;
        if let Some(due) = task.due_date {
            if due < today {
                overdue += 1;
            }
            if due >= week_start && due <= week_end {
                due_this_week += 1;
            }
        }
    }

    let pending_verification = policy::is_admin(user.role).then(|| {
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as u32
    });

    let visible_ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
    let task_by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let name_of = |id: Option<Uuid>| id.and_then(|id| users.get(&id)).map(display_name);

    // Timeline: recent creates, transitions, and delegations on visible
    // tasks. Entries for deleted tasks fall out with the visibility filter.
    let logs = state
        .store
        .recent_activity(&TIMELINE_ACTIONS, FETCH_LIMIT)
        .await
        .map_err(internal_error)?;
    let timeline: Vec<TimelineItem> = logs
        .into_iter()
        .filter(|entry| visible_ids.contains(&entry.task_id))
        .take(FEED_LIMIT)
        .map(|entry| {
            let task = task_by_id.get(&entry.task_id);
            let status_field = |key: &str| {
                entry
                    .details
                    .get(key)
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
            };
            let from_status = status_field("from");
            let to_status = status_field("to");
            let delegated_to_name = entry
                .details
                .get("to_name")
                .and_then(|v| v.as_str())
                .map(String::from);
            TimelineItem {
                id: entry.id,
                task_id: entry.task_id,
                task_title: task
                    .map(|t| t.title.clone())
                    .unwrap_or_else(|| "Unknown task".to_string()),
                actor_name: users
                    .get(&entry.user_id)
                    .map(display_name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                action: entry.action,
                from_status,
                to_status,
                assigned_to_name: task.and_then(|t| name_of(t.assigned_to)),
                due_date: task.and_then(|t| t.due_date),
                delegated_to_name,
                created_at: entry.created_at,
            }
        })
        .collect();

    // "Your tasks": assigned to the viewer, not yet verified, soonest due
    // first with undated tasks last.
    let mut mine: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.assigned_to == Some(user.id) && !t.status.is_terminal())
        .collect();
    mine.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
    let my_tasks: Vec<TaskSummary> = mine
        .into_iter()
        .take(FEED_LIMIT)
        .map(|t| summary(t, &users))
        .collect();

    // "Assigned by you": tasks the viewer created for others. Admin+ only.
    let assigned_by_me: Vec<TaskSummary> = if policy::is_admin(user.role) {
        let mut created: Vec<&Task> = tasks
            .iter()
            .filter(|t| {
                t.assigned_by == Some(user.id)
                    && t.assigned_to != Some(user.id)
                    && !t.status.is_terminal()
            })
            .collect();
        created.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
        created
            .into_iter()
            .take(FEED_LIMIT)
            .map(|t| summary(t, &users))
            .collect()
    } else {
        Vec::new()
    };

    // Recent comments on visible tasks.
    let comments = state
        .store
        .recent_comments(FETCH_LIMIT)
        .await
        .map_err(internal_error)?;
    let recent_comments: Vec<DashboardComment> = comments
        .into_iter()
        .filter(|c| visible_ids.contains(&c.task_id))
        .take(FEED_LIMIT)
        .map(|c| DashboardComment {
            id: c.id,
            task_id: c.task_id,
            task_title: task_by_id
                .get(&c.task_id)
                .map(|t| t.title.clone())
                .unwrap_or_else(|| "Unknown task".to_string()),
            author_name: users
                .get(&c.author_id)
                .map(display_name)
                .unwrap_or_else(|| "Unknown".to_string()),
            body: c.body,
            context: c.context,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(DashboardResponse {
        open,
        due_this_week,
        overdue,
        pending_verification,
        timeline,
        my_tasks,
        assigned_by_me,
        recent_comments,
    }))
}
