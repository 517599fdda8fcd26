//! Token decoding and permission normalization.
//!
//! Both are pure functions of their input and are shared by the session
//! store, the timer and the refresh coordinator.

pub mod jwt;
pub mod permissions;
