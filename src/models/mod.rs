//! Core data models for the account provisioner.
//!
//! These entities describe one tenant: the storage names derived from its
//! email, the credentials handed back, and the access policy scoped to its
//! bucket. They serialize as JSON via `serde`.

pub mod account;
pub mod policy;
