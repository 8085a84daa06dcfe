//! Session management module.
//!
//! This module provides:
//! - `SessionManager`: the process-wide source of truth for "who is
//!   logged in, with what token, expiring when"
//! - `User`: identity and authorization facts attached to a session
//! - `SessionSnapshot`: the derived state published to subscribers
//!
//! Consumers (route guards, the shell layout, the request pipeline) only
//! ever read derived queries or snapshots; all mutation goes through the
//! manager's lifecycle operations.

pub mod manager;
pub mod user;

pub use manager::{SessionManager, SessionSnapshot};
pub use user::User;
