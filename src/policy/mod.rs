//! Authorization and verification policy - the decision core.
//!
//! Everything in this module is pure, synchronous computation over values
//! the caller already holds: no I/O, no clock reads, no shared state. HTTP
//! handlers fetch the current task/user/verification snapshot from the
//! store, consult these functions, and persist the decided mutation only on
//! an affirmative answer.
//!
//! All checks fail closed: malformed or unauthorized input yields `false`
//! (or a descriptive denial error), never a panic.

mod access;
mod edit_window;
mod lifecycle;
mod verification;

pub use access::{
    can_assign_to, can_create_user, can_delegate, can_delegate_to, can_manage_task,
    can_manage_user, can_verify_tasks, can_view_reports_for, is_admin,
};
pub use edit_window::{
    can_creator_delete, can_creator_edit, edit_window, is_within_edit_window, EDIT_WINDOW_HOURS,
};
pub use lifecycle::{allowed_transitions, check_transition, TransitionDenied};
pub use verification::{
    aggregate_rating, is_fully_verified, required_slots, validate_rating,
    verification_requirements, RatingError, VerificationRequirements, VerificationSlot,
};
