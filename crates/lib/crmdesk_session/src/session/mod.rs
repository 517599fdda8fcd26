//! Session state: storage, timers, refresh and the lifecycle state machine.

pub mod lifecycle;
pub mod refresh;
pub mod storage;
pub mod store;
pub mod timer;
