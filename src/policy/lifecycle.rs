//! Task lifecycle state machine.
//!
//! `open → in_progress → completed → verified`, with reopen edges
//! `in_progress → open` and `completed → in_progress`. `verified` is
//! terminal. The caller must run [`check_transition`] before mutating
//! anything; a denial means no partial state change.

use crate::domain::{Role, TaskStatus};

use super::access::can_verify_tasks;

/// Why a requested status change was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionDenied {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Only admins can verify tasks")]
    VerifyRequiresAdmin,

    #[error("Staff can only mark tasks in progress or complete")]
    StaffTargetNotAllowed,
}

/// Statuses reachable from `from` in a single step.
pub fn allowed_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    match from {
        TaskStatus::Open => &[TaskStatus::InProgress],
        TaskStatus::InProgress => &[TaskStatus::Completed, TaskStatus::Open],
        TaskStatus::Completed => &[TaskStatus::Verified, TaskStatus::InProgress],
        TaskStatus::Verified => &[],
    }
}

/// Validate a requested transition for the acting role.
///
/// Checks the transition table first, then role gating: only admin+ may
/// drive a task into `verified` (slot eligibility is checked separately by
/// the verification resolver), and staff may only target `in_progress` or
/// `completed`.
pub fn check_transition(
    role: Role,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<(), TransitionDenied> {
    if !allowed_transitions(from).contains(&to) {
        return Err(TransitionDenied::InvalidTransition { from, to });
    }

    if to == TaskStatus::Verified && !can_verify_tasks(role) {
        return Err(TransitionDenied::VerifyRequiresAdmin);
    }

    if role == Role::Staff && !matches!(to, TaskStatus::InProgress | TaskStatus::Completed) {
        return Err(TransitionDenied::StaffTargetNotAllowed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [TaskStatus; 4] = [
        TaskStatus::Open,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Verified,
    ];

    #[test]
    fn test_forward_path() {
        for role in [Role::Admin, Role::SuperAdmin] {
            assert!(check_transition(role, TaskStatus::Open, TaskStatus::InProgress).is_ok());
            assert!(check_transition(role, TaskStatus::InProgress, TaskStatus::Completed).is_ok());
            assert!(check_transition(role, TaskStatus::Completed, TaskStatus::Verified).is_ok());
        }
    }

    #[test]
    fn test_reopen_edges() {
        assert!(check_transition(Role::Admin, TaskStatus::InProgress, TaskStatus::Open).is_ok());
        assert!(
            check_transition(Role::Admin, TaskStatus::Completed, TaskStatus::InProgress).is_ok()
        );
    }

    #[test]
    fn test_verified_is_terminal() {
        assert!(allowed_transitions(TaskStatus::Verified).is_empty());
        for to in ALL_STATUSES {
            let result = check_transition(Role::SuperAdmin, TaskStatus::Verified, to);
            assert_eq!(
                result,
                Err(TransitionDenied::InvalidTransition {
                    from: TaskStatus::Verified,
                    to
                })
            );
        }
    }

    #[test]
    fn test_skipping_states_is_invalid() {
        assert!(check_transition(Role::SuperAdmin, TaskStatus::Open, TaskStatus::Completed).is_err());
        assert!(check_transition(Role::SuperAdmin, TaskStatus::Open, TaskStatus::Verified).is_err());
        assert!(
            check_transition(Role::SuperAdmin, TaskStatus::Completed, TaskStatus::Open).is_err()
        );
    }

    #[test]
    fn test_staff_cannot_verify_or_reopen() {
        assert_eq!(
            check_transition(Role::Staff, TaskStatus::Completed, TaskStatus::Verified),
            Err(TransitionDenied::VerifyRequiresAdmin)
        );
        assert_eq!(
            check_transition(Role::Staff, TaskStatus::InProgress, TaskStatus::Open),
            Err(TransitionDenied::StaffTargetNotAllowed)
        );
    }

    #[test]
    fn test_staff_can_progress_and_complete() {
        assert!(check_transition(Role::Staff, TaskStatus::Open, TaskStatus::InProgress).is_ok());
        assert!(
            check_transition(Role::Staff, TaskStatus::InProgress, TaskStatus::Completed).is_ok()
        );
        // Reopening to in_progress is an allowed staff target.
        assert!(
            check_transition(Role::Staff, TaskStatus::Completed, TaskStatus::InProgress).is_ok()
        );
    }
}
