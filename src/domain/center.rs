//! Centers: the locations users belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A center. Users may belong to any number of centers; an admin's
/// dashboard is scoped to users sharing at least one center with them.
///
/// Deactivated centers keep their membership rows but stop contributing
/// to visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Center {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
