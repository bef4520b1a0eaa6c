//! # poim-shared
//!
//! Storage-free core of the point manager: who is asking ([`Principal`]),
//! whether they may do it ([`policy`]), and which points lie inside a
//! geographic query ([`GeoFilter`]).
//!
//! Nothing in this crate touches the database or the network, so every rule
//! here can be tested in isolation.

pub mod constants;
pub mod error;
pub mod geo;
pub mod policy;
pub mod principal;
pub mod types;

pub use error::GeoFilterError;
pub use geo::GeoFilter;
pub use policy::{Action, Decision, Owned};
pub use principal::{Account, Permission, Principal};
pub use types::{PointId, UserId};
