//! Command handlers grouped by concern.

pub(crate) mod probe;
pub(crate) mod session;
