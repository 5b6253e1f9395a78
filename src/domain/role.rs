//! User roles and the role hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user's role. The three roles form a strict total order:
/// `SuperAdmin > Admin > Staff`.
///
/// Every permission check in [`crate::policy`] compares roles through
/// [`Role::level`]; the ordinals are fixed and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Numeric level used for hierarchy comparisons.
    pub fn level(self) -> u8 {
        match self {
            Role::Staff => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }

    /// Stable string form, as persisted and as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A role string that is not one of the three known roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order() {
        assert!(Role::SuperAdmin.level() > Role::Admin.level());
        assert!(Role::Admin.level() > Role::Staff.level());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Staff, Role::Admin, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("manager".parse::<Role>().is_err());
    }
}
