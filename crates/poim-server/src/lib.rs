//! # poim-server
//!
//! HTTP service for geo-tagged points.
//!
//! - **Point lifecycle** ([`points`]): create, read, list, update,
//!   soft-delete and undelete, each gated by the shared policy
//! - **Presentation** ([`view`]): per-request `can_edit` projection
//! - **Accounts** ([`accounts`]): registration, token login and logout
//! - **Admin API**: moderation roles and instance status, guarded by
//!   `ADMIN_TOKEN`

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod payload;
pub mod points;
pub mod view;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
