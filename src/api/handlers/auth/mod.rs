//! Authentication and session lifecycle.
//!
//! Login exchanges credentials for a short-lived access token plus an opaque
//! refresh token. Refresh rotates: the presented token is revoked and a new
//! pair is issued in the same transaction. Registration is invite-only and
//! every security-relevant event is appended to the audit log.

pub(crate) mod audit;
mod error;
pub(crate) mod invites;
pub(crate) mod login;
pub(crate) mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
mod tokens;
pub(crate) mod types;
mod utils;

pub(crate) mod refresh_tokens;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
pub use tokens::TokenService;

pub(crate) use utils::{extract_request_meta, valid_email, RequestMeta};
