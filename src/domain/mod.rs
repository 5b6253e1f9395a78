//! Domain model - users, roles, tasks, and verification records.
//!
//! These types mirror the persisted schema. They carry no behavior beyond
//! parsing/formatting; every authorization decision over them lives in
//! [`crate::policy`].

mod center;
mod role;
mod task;
mod user;
mod verification;

pub use center::Center;
pub use role::{Role, UnknownRole};
pub use task::{Task, TaskPriority, TaskStatus};
pub use user::User;
pub use verification::{Verification, VerifierRole};
