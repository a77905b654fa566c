//! HTTP handlers grouped by API surface.

pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod contacts;
pub(crate) mod events;
pub(crate) mod health;
pub(crate) mod settings;
pub(crate) mod tasks;
pub(crate) mod templates;
