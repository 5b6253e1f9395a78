//! # Opsboard
//!
//! A role-based task-management service: administrators assign tasks to
//! staff, staff execute and mark them complete, and designated verifiers
//! confirm completion quality through a star-rating workflow.
//!
//! ## Task flow
//! 1. An admin creates a task (`open`) and assigns it
//! 2. The assignee works it (`in_progress`) and completes it (`completed`)
//! 3. Designated verifiers rate the work; once every required slot is
//!    filled the task becomes `verified` (terminal)
//!
//! Delegated tasks need two independent verifications - one from the
//! original assigner and one from the delegating assignee.
//!
//! ## Modules
//! - `policy`: the decision core - pure permission, lifecycle, and
//!   verification-slot rules. Everything else is glue around it.
//! - `domain`: users, roles, tasks, verification records
//! - `store`: SQLite persistence (owns the slot-uniqueness constraint)
//! - `api`: axum HTTP layer
//! - `config`: environment configuration

pub mod api;
pub mod config;
pub mod domain;
pub mod policy;
pub mod store;

pub use config::Config;
