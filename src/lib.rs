//! Semester transitions, project archival and role-based access for a final
//! year project supervision dashboard.

pub mod admin;
pub mod archive;
pub mod config;
pub mod error;
pub mod listing;
pub mod model;
pub mod registry;
pub mod roles;
pub mod selector;
pub mod store;

pub use crate::admin::Admin;
pub use crate::error::{Error, Result};
