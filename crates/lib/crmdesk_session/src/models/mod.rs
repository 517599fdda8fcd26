//! Domain and wire models.

pub mod api;
pub mod identity;
