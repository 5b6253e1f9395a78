//! SQLite persistence.
//!
//! A thin store over `rusqlite`: plain CRUD for users, tasks, comments,
//! verifications, and the activity log. No authorization happens here -
//! handlers consult [`crate::policy`] first and only then persist.
//!
//! The one correctness-critical piece the store *does* own is the unique
//! index on `verifications(task_id, verifier_role)`: the slot resolver
//! works from a snapshot and can be stale between read and write, so the
//! database is the final arbiter when two verifiers race for the same
//! slot. See [`Store::insert_verification`].

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Center, Role, Task, TaskPriority, TaskStatus, User, Verification, VerifierRole};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    name        TEXT,
    role        TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    description         TEXT,
    status              TEXT NOT NULL DEFAULT 'open',
    priority            TEXT NOT NULL DEFAULT 'normal',
    assigned_to         TEXT REFERENCES users(id),
    assigned_by         TEXT REFERENCES users(id),
    delegated_to        TEXT REFERENCES users(id),
    due_date            TEXT,
    completed_at        TEXT,
    verified_by         TEXT,
    verified_at         TEXT,
    verification_rating INTEGER,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id          TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    author_id   TEXT NOT NULL REFERENCES users(id),
    body        TEXT NOT NULL,
    context     TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS verifications (
    id            TEXT PRIMARY KEY,
    task_id       TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    verifier_id   TEXT NOT NULL REFERENCES users(id),
    verifier_role TEXT NOT NULL,
    rating        INTEGER NOT NULL,
    comment_id    TEXT REFERENCES comments(id),
    created_at    TEXT NOT NULL
);

-- At most one verification per (task, slot). This index, not the resolver,
-- wins the duplicate-slot race.
CREATE UNIQUE INDEX IF NOT EXISTS idx_verifications_slot
    ON verifications(task_id, verifier_role);

CREATE TABLE IF NOT EXISTS centers (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_centers (
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    center_id   TEXT NOT NULL REFERENCES centers(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, center_id)
);

CREATE TABLE IF NOT EXISTS activity_log (
    id          TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    user_id     TEXT NOT NULL,
    action      TEXT NOT NULL,
    details     TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_activity_task ON activity_log(task_id);
"#;

/// Filters for task listing. `None` means "no filter".
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<Uuid>,
    /// Staff visibility: restrict to tasks assigned or delegated to this user.
    pub visible_to: Option<Uuid>,
}

/// One activity log entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A task comment. Verification comments carry a `context` of
/// `"verification"`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed store. The connection is guarded by an async mutex; every
/// operation acquires it briefly and performs no I/O while holding locks
/// elsewhere.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::init(conn)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA).context("Failed to apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Users ────────────────────────────────────────────────────────────

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, email, name, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.email,
                user.name,
                user.role.as_str(),
                user.is_active,
                user.created_at,
                user.updated_at,
            ],
        )
        .context("Failed to insert user")?;
        Ok(())
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET email = ?2, name = ?3, role = ?4, is_active = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                user.id,
                user.email,
                user.name,
                user.role.as_str(),
                user.is_active,
                user.updated_at,
            ],
        )
        .context("Failed to update user")?;
        Ok(())
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
            .optional()
            .context("Failed to fetch user")
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
        .optional()
        .context("Failed to fetch user by email")
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at ASC")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ── Tasks ────────────────────────────────────────────────────────────

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (id, title, description, status, priority, assigned_to,
                                assigned_by, delegated_to, due_date, completed_at, verified_by,
                                verified_at, verification_rating, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.assigned_to,
                task.assigned_by,
                task.delegated_to,
                task.due_date,
                task.completed_at,
                task.verified_by,
                task.verified_at,
                task.verification_rating,
                task.created_at,
                task.updated_at,
            ],
        )
        .context("Failed to insert task")?;
        Ok(())
    }

    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE tasks SET title = ?2, description = ?3, status = ?4, priority = ?5,
                              assigned_to = ?6, assigned_by = ?7, delegated_to = ?8,
                              due_date = ?9, completed_at = ?10, verified_by = ?11,
                              verified_at = ?12, verification_rating = ?13, created_at = ?14,
                              updated_at = ?15
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.assigned_to,
                task.assigned_by,
                task.delegated_to,
                task.due_date,
                task.completed_at,
                task.verified_by,
                task.verified_at,
                task.verification_rating,
                task.created_at,
                task.updated_at,
            ],
        )
        .context("Failed to update task")?;
        Ok(())
    }

    /// Persist a reopened task and discard its verification records in one
    /// transaction. Partial verification progress does not survive a reopen.
    pub async fn reopen_task(&self, task: &Task) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM verifications WHERE task_id = ?1",
            params![task.id],
        )?;
        tx.execute(
            "UPDATE tasks SET status = ?2, completed_at = ?3, updated_at = ?4 WHERE id = ?1",
            params![task.id, task.status.as_str(), task.completed_at, task.updated_at],
        )?;
        tx.commit().context("Failed to reopen task")?;
        Ok(())
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], task_from_row)
            .optional()
            .context("Failed to fetch task")
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(())
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

        if let Some(status) = filter.status {
            args.push(Box::new(status.as_str()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(priority) = filter.priority {
            args.push(Box::new(priority.as_str()));
            sql.push_str(&format!(" AND priority = ?{}", args.len()));
        }
        if let Some(assignee) = filter.assignee {
            args.push(Box::new(assignee));
            sql.push_str(&format!(" AND assigned_to = ?{}", args.len()));
        }
        if let Some(user_id) = filter.visible_to {
            args.push(Box::new(user_id));
            let n = args.len();
            sql.push_str(&format!(" AND (assigned_to = ?{n} OR delegated_to = ?{n})"));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(args.iter().map(|a| a.as_ref()));
        let tasks = stmt
            .query_map(params, task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    // ── Centers ──────────────────────────────────────────────────────────

    /// Insert a center. Returns `Ok(false)` when the name is already taken.
    pub async fn insert_center(&self, center: &Center) -> Result<bool> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO centers (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![center.id, center.name, center.is_active, center.created_at],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert center"),
        }
    }

    pub async fn list_centers(&self) -> Result<Vec<Center>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM centers WHERE is_active = 1 ORDER BY name ASC")?;
        let centers = stmt
            .query_map([], center_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(centers)
    }

    /// Replace a user's center memberships with exactly `center_ids`.
    pub async fn set_user_centers(&self, user_id: Uuid, center_ids: &[Uuid]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM user_centers WHERE user_id = ?1", params![user_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO user_centers (user_id, center_id) VALUES (?1, ?2)",
            )?;
            for center_id in center_ids {
                stmt.execute(params![user_id, center_id])?;
            }
        }
        tx.commit().context("Failed to update center memberships")?;
        Ok(())
    }

    /// Ids of every user sharing at least one center with `user_id`,
    /// including `user_id` itself. Empty when the user belongs to no center.
    pub async fn center_member_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id FROM user_centers
             WHERE center_id IN (SELECT center_id FROM user_centers WHERE user_id = ?1)",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<Uuid>>>()?;
        Ok(ids)
    }

    /// Active-center memberships for every user, keyed by user id.
    pub async fn user_centers_map(&self) -> Result<HashMap<Uuid, Vec<Center>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT uc.user_id AS member_id, c.id, c.name, c.is_active, c.created_at
             FROM user_centers uc JOIN centers c ON c.id = uc.center_id
             WHERE c.is_active = 1
             ORDER BY c.name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Uuid>("member_id")?, center_from_row(row)?))
        })?;

        let mut map: HashMap<Uuid, Vec<Center>> = HashMap::new();
        for row in rows {
            let (user_id, center) = row?;
            map.entry(user_id).or_default().push(center);
        }
        Ok(map)
    }

    // ── Verifications ────────────────────────────────────────────────────

    /// Insert a verification record. Returns `Ok(false)` when the slot was
    /// already filled (unique-index violation) - the caller surfaces that
    /// as a conflict rather than an internal error.
    pub async fn insert_verification(&self, v: &Verification) -> Result<bool> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO verifications (id, task_id, verifier_id, verifier_role, rating,
                                        comment_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                v.id,
                v.task_id,
                v.verifier_id,
                v.verifier_role.as_str(),
                v.rating,
                v.comment_id,
                v.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert verification"),
        }
    }

    pub async fn list_verifications(&self, task_id: Uuid) -> Result<Vec<Verification>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM verifications WHERE task_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], verification_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Comments ─────────────────────────────────────────────────────────

    pub async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO comments (id, task_id, author_id, body, context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id,
                comment.task_id,
                comment.author_id,
                comment.body,
                comment.context,
                comment.created_at,
            ],
        )
        .context("Failed to insert comment")?;
        Ok(())
    }

    pub async fn list_comments(&self, task_id: Uuid) -> Result<Vec<Comment>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM comments WHERE task_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map(params![task_id], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The most recent comments across all tasks, newest first. Callers
    /// post-filter by task visibility.
    pub async fn recent_comments(&self, limit: u32) -> Result<Vec<Comment>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM comments ORDER BY created_at DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Activity log ─────────────────────────────────────────────────────

    pub async fn log_activity(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        action: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO activity_log (id, task_id, user_id, action, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4(),
                task_id,
                user_id,
                action,
                details.to_string(),
                Utc::now(),
            ],
        )
        .context("Failed to log activity")?;
        Ok(())
    }

    /// The most recent activity entries across all tasks, restricted to
    /// the given actions. Callers post-filter by task visibility, so the
    /// limit should leave headroom over what they intend to show.
    pub async fn recent_activity(&self, actions: &[&str], limit: u32) -> Result<Vec<ActivityEntry>> {
        let placeholders: Vec<String> = (1..=actions.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT * FROM activity_log WHERE action IN ({}) ORDER BY created_at DESC LIMIT {limit}",
            placeholders.join(", ")
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(actions.iter()), activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn list_activity(&self, task_id: Uuid) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM activity_log WHERE task_id = ?1 ORDER BY created_at DESC")?;
        let rows = stmt
            .query_map(params![task_id], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

fn parse_text<T: FromStr>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T::Err: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    let raw: String = row.get(col)?;
    raw.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        name: row.get("name")?,
        role: parse_text::<Role>(row, "role")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: parse_text::<TaskStatus>(row, "status")?,
        priority: parse_text::<TaskPriority>(row, "priority")?,
        assigned_to: row.get("assigned_to")?,
        assigned_by: row.get("assigned_by")?,
        delegated_to: row.get("delegated_to")?,
        due_date: row.get("due_date")?,
        completed_at: row.get("completed_at")?,
        verified_by: row.get("verified_by")?,
        verified_at: row.get("verified_at")?,
        verification_rating: row.get("verification_rating")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn verification_from_row(row: &Row<'_>) -> rusqlite::Result<Verification> {
    Ok(Verification {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        verifier_id: row.get("verifier_id")?,
        verifier_role: parse_text::<VerifierRole>(row, "verifier_role")?,
        rating: row.get("rating")?,
        comment_id: row.get("comment_id")?,
        created_at: row.get("created_at")?,
    })
}

fn center_from_row(row: &Row<'_>) -> rusqlite::Result<Center> {
    Ok(Center {
        id: row.get("id")?,
        name: row.get("name")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        author_id: row.get("author_id")?,
        body: row.get("body")?,
        context: row.get("context")?,
        created_at: row.get("created_at")?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityEntry> {
    let details: String = row.get("details")?;
    Ok(ActivityEntry {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        user_id: row.get("user_id")?,
        action: row.get("action")?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at")?,
    })
}
