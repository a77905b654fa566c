//! Admin-only endpoints: invites, user management and the audit log.

pub(crate) mod audit;
pub(crate) mod invites;
pub(crate) mod users;
