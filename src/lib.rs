//! Personal time management backend.
//!
//! HTTP API for a calendar with activity templates, recurring events, an
//! Eisenhower matrix, contacts and per-user settings. Accounts are
//! invite-only; authentication uses short-lived access tokens plus opaque,
//! revocable refresh tokens, and every security-relevant event lands in an
//! append-only audit log.

pub mod api;
pub mod cli;
