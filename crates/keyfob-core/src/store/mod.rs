//! Credential storage module.
//!
//! This module provides the `CredentialStore`: tier-aware, expiry-aware
//! key/value persistence for tokens and the serialized user profile.
//!
//! Two tiers exist:
//! - *ephemeral*: in-process memory, gone when the process exits
//! - *durable*: JSON records on disk, opt-in via "remember me"
//!
//! Stored values are base64-obfuscated. That is deliberate: it defends
//! against casual inspection of the storage directory only, not against
//! code running in the same process or user account.

pub mod credentials;
mod tiers;

pub use credentials::{
    CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY,
};
