//! Mirroring engine and the mirrored objects.
//!
//! [`mirror`] and [`monitor`] are the generic engine: table-driven property
//! decoding and one task per subscription. [`facet`] adds single-owner
//! lifetime handling on top; the remaining modules are the concrete objects.

pub(crate) mod connection;
pub(crate) mod facet;
pub(crate) mod interface;
pub(crate) mod mirror;
pub(crate) mod monitor;
pub(crate) mod settings;
pub(crate) mod wireless;
