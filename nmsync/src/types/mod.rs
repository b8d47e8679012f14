//! NetworkManager constants.

pub(crate) mod constants;
