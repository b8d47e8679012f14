//! Public API module.
//!
//! Value types, errors and configuration exposed by the `nmsync` crate.

pub mod config;
pub mod models;
