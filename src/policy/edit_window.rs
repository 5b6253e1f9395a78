//! Creator edit/delete window.
//!
//! A task's creator may edit or delete it for 24 hours after creation.
//! Super-admins bypass the window at the call site, and nothing here is
//! consulted once a task is verified - the caller refuses that first.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// How long after creation the creator may still edit or delete.
pub const EDIT_WINDOW_HOURS: i64 = 24;

/// The edit window as a [`Duration`].
pub fn edit_window() -> Duration {
    Duration::hours(EDIT_WINDOW_HOURS)
}

/// Whether `now` is still inside the edit window that opened at
/// `created_at`. The clock is an argument so the check stays pure.
pub fn is_within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < edit_window()
}

/// May `user_id` edit the task? Creator only, inside the window.
pub fn can_creator_edit(
    user_id: Uuid,
    assigned_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    if assigned_by != Some(user_id) {
        return false;
    }
    is_within_edit_window(created_at, now)
}

/// May `user_id` delete the task? Same rule as editing.
pub fn can_creator_delete(
    user_id: Uuid,
    assigned_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    can_creator_edit(user_id, assigned_by, created_at, now)
}
