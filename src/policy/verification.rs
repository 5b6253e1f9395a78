//! Verification slot resolution, completion checking, and rating rules.
//!
//! A task carries one or two verification "slots":
//!
//! - the `assigned_by` slot ("assigner") - required whenever the task has a
//!   creator, which is every well-formed task;
//! - the `assigned_to` slot ("delegator") - required only when the task was
//!   delegated onward *and* the assignee is a different person from the
//!   creator. A task X assigned to Y and delegated by Y to staff member Z
//!   needs sign-off from both X and Y.
//!
//! Slots are derived fresh on every check from the task's current fields;
//! nothing here is cached or stored. Both the resolver and the completion
//! checker derive slots through the single [`required_slots`] function, so
//! the two can never disagree about what a task requires.

use uuid::Uuid;

use crate::domain::{Role, VerifierRole};

/// One required verification slot, with its designated verifier and
/// whether a verification record already fills it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VerificationSlot {
    pub role: VerifierRole,
    pub user_id: Uuid,
    /// "assigner" or "delegator".
    pub label: &'static str,
    pub filled: bool,
}

/// The full verification picture for one task and one acting user.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VerificationRequirements {
    pub slots: Vec<VerificationSlot>,
    /// Whether the acting user may fill a slot right now.
    pub can_verify: bool,
    /// Which slot the acting user would fill, if any.
    pub available_slot: Option<VerifierRole>,
}

/// The slots a task requires, in fill order, with each slot's designated
/// verifier.
///
/// This is the single source of truth for slot derivation - both
/// [`verification_requirements`] and [`is_fully_verified`] go through it.
/// A task with a null `assigned_by` produces no assigner slot at all (the
/// resolver degrades rather than panics on malformed tasks), and
/// self-assignment (`assigned_to == assigned_by`) never produces a second
/// slot even when delegated.
pub fn required_slots(
    assigned_by: Option<Uuid>,
    assigned_to: Option<Uuid>,
    delegated_to: Option<Uuid>,
) -> Vec<(VerifierRole, Uuid)> {
    let mut slots = Vec::with_capacity(2);

    if let Some(assigner) = assigned_by {
        slots.push((VerifierRole::AssignedBy, assigner));
    }

    if delegated_to.is_some() {
        if let Some(assignee) = assigned_to {
            if assigned_by != Some(assignee) {
                slots.push((VerifierRole::AssignedTo, assignee));
            }
        }
    }

    slots
}

/// Resolve the verification slots for a task and whether `user_id` (acting
/// with `user_role`) may fill one.
///
/// - Staff can never verify.
/// - A super-admin may substitute for either designated verifier; the first
///   unfilled slot (assigner before delegator) is selected.
/// - An ordinary admin may only fill a slot whose designated verifier is
///   themselves.
pub fn verification_requirements(
    user_role: Role,
    user_id: Uuid,
    assigned_by: Option<Uuid>,
    assigned_to: Option<Uuid>,
    delegated_to: Option<Uuid>,
    filled_slot_roles: &[VerifierRole],
) -> VerificationRequirements {
    let slots: Vec<VerificationSlot> = required_slots(assigned_by, assigned_to, delegated_to)
        .into_iter()
        .map(|(role, designated)| VerificationSlot {
            role,
            user_id: designated,
            label: role.label(),
            filled: filled_slot_roles.contains(&role),
        })
        .collect();

    let available_slot = match user_role {
        Role::Staff => None,
        Role::SuperAdmin => slots.iter().find(|s| !s.filled).map(|s| s.role),
        Role::Admin => slots
            .iter()
            .find(|s| !s.filled && s.user_id == user_id)
            .map(|s| s.role),
    };

    VerificationRequirements {
        slots,
        can_verify: available_slot.is_some(),
        available_slot,
    }
}

/// Whether every required slot is filled.
pub fn is_fully_verified(
    delegated_to: Option<Uuid>,
    assigned_by: Option<Uuid>,
    assigned_to: Option<Uuid>,
    filled_slot_roles: &[VerifierRole],
) -> bool {
    required_slots(assigned_by, assigned_to, delegated_to)
        .iter()
        .all(|(role, _)| filled_slot_roles.contains(role))
}

/// Why a verification payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    #[error("A star rating between 1 and 5 is required")]
    OutOfRange,

    #[error("A comment is required for ratings of 3 stars or below")]
    CommentRequired,
}

/// Validate a verification payload before any authorization or write.
///
/// The rating must be an integer in `1..=5`; a rating of 3 or below must be
/// justified with a non-empty comment.
pub fn validate_rating(rating: Option<f64>, comment: Option<&str>) -> Result<u8, RatingError> {
    let raw = rating.ok_or(RatingError::OutOfRange)?;
    if raw.fract() != 0.0 || !(1.0..=5.0).contains(&raw) {
        return Err(RatingError::OutOfRange);
    }
    let rating = raw as u8;

    if rating <= 3 && comment.map_or(true, |c| c.trim().is_empty()) {
        return Err(RatingError::CommentRequired);
    }

    Ok(rating)
}

/// Aggregate all recorded ratings into the task's final rating: the
/// arithmetic mean rounded half-up (ties round toward 5, so 4.5 → 5).
pub fn aggregate_rating(ratings: &[u8]) -> Option<u8> {
    if ratings.is_empty() {
        return None;
    }
    let sum: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
    let n = ratings.len() as u32;
    Some(((2 * sum + n) / (2 * n)) as u8)
}
