//! # poim-store
//!
//! SQLite storage for the point manager.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for points (with
//! soft-delete), user accounts and auth tokens. Every mutation is a single
//! SQL statement, so concurrent writers serialize inside SQLite.

pub mod accounts;
pub mod database;
pub mod migrations;
pub mod models;
pub mod points;
pub mod tokens;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
