//! Verification records and slot roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which verification slot a record fills.
///
/// A task requires sign-off from its creator (`AssignedBy`, shown as
/// "assigner") and, when the work was delegated onward, from its assignee
/// (`AssignedTo`, shown as "delegator").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierRole {
    AssignedBy,
    AssignedTo,
}

impl VerifierRole {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifierRole::AssignedBy => "assigned_by",
            VerifierRole::AssignedTo => "assigned_to",
        }
    }

    /// Human-facing label used in activity messages and the UI.
    pub fn label(self) -> &'static str {
        match self {
            VerifierRole::AssignedBy => "assigner",
            VerifierRole::AssignedTo => "delegator",
        }
    }
}

impl fmt::Display for VerifierRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifierRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned_by" => Ok(VerifierRole::AssignedBy),
            "assigned_to" => Ok(VerifierRole::AssignedTo),
            other => Err(format!("unknown verifier role: {other}")),
        }
    }
}

/// One completed verification slot.
///
/// The store enforces at most one record per `(task_id, verifier_role)`
/// pair with a unique index; see [`crate::store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub id: Uuid,
    pub task_id: Uuid,
    pub verifier_id: Uuid,
    pub verifier_role: VerifierRole,
    pub rating: u8,
    pub comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
