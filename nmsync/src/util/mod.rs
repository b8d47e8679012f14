//! Internal helpers.

pub(crate) mod decode;
